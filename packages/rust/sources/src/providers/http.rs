//! JSON-over-HTTP providers.
//!
//! Listings: `GET <base>/listings?location=..&min_price=..&max_price=..&property_type=..&lead_type=..`
//! returning either a bare array or `{"listings": [...]}`.
//! Contacts: `GET <base>/owners?address=..&city=..&state=..&zip=..` returning
//! one contact record; 404 means "nothing known".

use std::time::Duration;

use async_trait::async_trait;
use leadgen_shared::{Criteria, LeadGenError, RawListing, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{ContactQuery, ContactRecord, ContactSource, ListingSource};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("leadgen/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client shared by every HTTP provider.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LeadGenError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join `segment` onto `base`, keeping any path prefix on the base URL.
fn endpoint(base: &Url, segment: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(segment)
        .map_err(|e| LeadGenError::config(format!("invalid provider URL {base}: {e}")))
}

fn parse_base_url(name: &str, base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| {
        LeadGenError::config(format!("provider `{name}` has invalid base_url {base_url}: {e}"))
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingsBody {
    Bare(Vec<RawListing>),
    Wrapped { listings: Vec<RawListing> },
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpListingSource {
    name: String,
    base_url: Url,
    client: Client,
}

impl HttpListingSource {
    pub fn new(name: impl Into<String>, base_url: &str, client: Client) -> Result<Self> {
        let name = name.into();
        let base_url = parse_base_url(&name, base_url)?;
        Ok(Self {
            name,
            base_url,
            client,
        })
    }

    fn request_url(&self, criteria: &Criteria) -> Result<Url> {
        let mut url = endpoint(&self.base_url, "listings")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("location", &criteria.location);
            if let Some(min) = criteria.price_min {
                query.append_pair("min_price", &min.to_string());
            }
            if let Some(max) = criteria.price_max {
                query.append_pair("max_price", &max.to_string());
            }
            if !criteria.property_types.is_empty() {
                query.append_pair("property_type", &criteria.property_types.join(","));
            }
            query.append_pair("lead_type", criteria.lead_type.as_str());
        }
        Ok(url)
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, criteria: &Criteria) -> Result<Vec<RawListing>> {
        let url = self.request_url(criteria)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LeadGenError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadGenError::source_failed(&self.name, format!("HTTP {status}")));
        }

        let body: ListingsBody = response
            .json()
            .await
            .map_err(|e| LeadGenError::parse(format!("{url}: {e}")))?;
        let mut listings = match body {
            ListingsBody::Bare(listings) | ListingsBody::Wrapped { listings } => listings,
        };
        for listing in &mut listings {
            listing.source = self.name.clone();
        }
        debug!(source = %self.name, count = listings.len(), "http listings fetched");
        Ok(listings)
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpContactSource {
    name: String,
    base_url: Url,
    client: Client,
}

impl HttpContactSource {
    pub fn new(name: impl Into<String>, base_url: &str, client: Client) -> Result<Self> {
        let name = name.into();
        let base_url = parse_base_url(&name, base_url)?;
        Ok(Self {
            name,
            base_url,
            client,
        })
    }
}

#[async_trait]
impl ContactSource for HttpContactSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, query: &ContactQuery) -> Result<ContactRecord> {
        let mut url = endpoint(&self.base_url, "owners")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("address", &query.address)
                .append_pair("city", &query.city)
                .append_pair("state", &query.state)
                .append_pair("zip", &query.zip_code);
            if let Some(owner) = &query.owner_name {
                pairs.append_pair("owner_name", owner);
            }
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LeadGenError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ContactRecord::default());
        }
        if !status.is_success() {
            return Err(LeadGenError::source_failed(&self.name, format!("HTTP {status}")));
        }

        let record: ContactRecord = response
            .json()
            .await
            .map_err(|e| LeadGenError::parse(format!("{url}: {e}")))?;
        Ok(record.normalized())
    }
}
