//! File-backed providers. Each call re-reads its JSON file, so results are
//! deterministic and edits show up without a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use leadgen_shared::{Criteria, LeadGenError, RawListing, Result};
use serde::Deserialize;
use tracing::debug;

use crate::{ContactQuery, ContactRecord, ContactSource, ListingSource};

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LeadGenError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| LeadGenError::parse(format!("{}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Listings read from a JSON array of records.
#[derive(Debug, Clone)]
pub struct FixtureListingSource {
    name: String,
    path: PathBuf,
}

impl FixtureListingSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl ListingSource for FixtureListingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, criteria: &Criteria) -> Result<Vec<RawListing>> {
        let mut listings: Vec<RawListing> = read_json(&self.path).await?;
        for listing in &mut listings {
            listing.source = self.name.clone();
        }
        debug!(
            source = %self.name,
            location = %criteria.location,
            count = listings.len(),
            "fixture listings loaded"
        );
        Ok(listings)
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// One row of a contact fixture file: the property it belongs to plus
/// whatever details this provider knows.
#[derive(Debug, Deserialize)]
struct FixtureContact {
    address: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    #[serde(flatten)]
    record: ContactRecord,
}

impl FixtureContact {
    fn matches(&self, query: &ContactQuery) -> bool {
        let (address, city, state) = query.key();
        self.address.trim().eq_ignore_ascii_case(&address)
            && self.city.trim().eq_ignore_ascii_case(&city)
            && (self.state.trim().is_empty() || self.state.trim().eq_ignore_ascii_case(&state))
    }
}

/// Contact details read from a JSON array keyed by property address.
#[derive(Debug, Clone)]
pub struct FixtureContactSource {
    name: String,
    path: PathBuf,
}

impl FixtureContactSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl ContactSource for FixtureContactSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, query: &ContactQuery) -> Result<ContactRecord> {
        let rows: Vec<FixtureContact> = read_json(&self.path).await?;
        let record = rows
            .into_iter()
            .find(|row| row.matches(query))
            .map(|row| row.record.normalized())
            .unwrap_or_default();
        debug!(
            source = %self.name,
            address = %query.address,
            found = !record.is_empty(),
            "fixture contact lookup"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).expect("write fixture");
        path
    }

    #[tokio::test]
    async fn listing_fixture_stamps_source_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            &dir,
            "mls.json",
            r#"[{"address": "1 Elm St", "city": "Phoenix", "state": "AZ", "price": 250000, "source": "other"},
                {"address": "2 Elm St", "city": "Phoenix", "state": "AZ"}]"#,
        );
        let source = FixtureListingSource::new("mls", path);
        let listings = source.fetch(&Criteria::new("Phoenix, AZ")).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert!(listings.iter().all(|l| l.source == "mls"));
        assert_eq!(listings[0].price, Some(250_000.0));
    }

    #[tokio::test]
    async fn missing_fixture_is_an_io_error() {
        let source = FixtureListingSource::new("mls", "/nonexistent/leadgen/mls.json");
        let err = source.fetch(&Criteria::new("x")).await.unwrap_err();
        assert!(matches!(err, LeadGenError::Io { .. }));
    }

    #[tokio::test]
    async fn malformed_fixture_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "bad.json", "{not json");
        let source = FixtureListingSource::new("zillow", path);
        let err = source.fetch(&Criteria::new("x")).await.unwrap_err();
        assert!(matches!(err, LeadGenError::Parse { .. }));
    }

    #[tokio::test]
    async fn contact_fixture_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            &dir,
            "skiptracing.json",
            r#"[{"address": "12 Oak St", "city": "Phoenix", "state": "AZ",
                 "owner_phone": "602-555-0101", "owner_email": "", "confidence": 85}]"#,
        );
        let source = FixtureContactSource::new("skiptracing", path);
        let query = ContactQuery {
            address: "12 OAK ST".into(),
            city: "phoenix".into(),
            state: "az".into(),
            ..ContactQuery::default()
        };
        let record = source.lookup(&query).await.unwrap();
        assert_eq!(record.owner_phone.as_deref(), Some("602-555-0101"));
        assert!(record.owner_email.is_none());
        assert_eq!(record.confidence, Some(85));

        let unknown = ContactQuery {
            address: "99 Nowhere Rd".into(),
            ..query
        };
        assert!(source.lookup(&unknown).await.unwrap().is_empty());
    }
}
