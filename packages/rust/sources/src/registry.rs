//! Registry of configured providers, in declaration order.

use std::path::{Path, PathBuf};

use leadgen_shared::{AppConfig, LeadGenError, ProviderEntry, ProviderKind, Result};
use reqwest::Client;

use crate::providers::{
    FixtureContactSource, FixtureListingSource, HttpContactSource, HttpListingSource, build_client,
};
use crate::{ContactSource, ListingSource};

/// Holds the listing sources (queried together) and the contact sources
/// (consulted in order).
pub struct SourceRegistry {
    listing: Vec<Box<dyn ListingSource>>,
    contact: Vec<Box<dyn ContactSource>>,
}

impl SourceRegistry {
    pub fn new(listing: Vec<Box<dyn ListingSource>>, contact: Vec<Box<dyn ContactSource>>) -> Self {
        Self { listing, contact }
    }

    /// Build every provider named in `[search]` and `[enrichment]`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = build_client(config.openrouter.timeout_secs)?;
        let fixtures_dir = PathBuf::from(&config.defaults.fixtures_dir);

        let listing = config
            .search
            .providers
            .iter()
            .map(|entry| listing_source(entry, &fixtures_dir, &client))
            .collect::<Result<Vec<_>>>()?;
        let contact = config
            .enrichment
            .providers
            .iter()
            .map(|entry| contact_source(entry, &fixtures_dir, &client))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            listing = listing.len(),
            contact = contact.len(),
            "source registry built"
        );
        Ok(Self { listing, contact })
    }

    pub fn listing_sources(&self) -> &[Box<dyn ListingSource>] {
        &self.listing
    }

    pub fn contact_sources(&self) -> &[Box<dyn ContactSource>] {
        &self.contact
    }

    /// Names of the listing and contact sources, for display.
    pub fn names(&self) -> (Vec<String>, Vec<String>) {
        (
            self.listing.iter().map(|s| s.name().to_string()).collect(),
            self.contact.iter().map(|s| s.name().to_string()).collect(),
        )
    }

    pub fn into_parts(self) -> (Vec<Box<dyn ListingSource>>, Vec<Box<dyn ContactSource>>) {
        (self.listing, self.contact)
    }
}

fn fixture_path(entry: &ProviderEntry, fixtures_dir: &Path) -> Result<PathBuf> {
    let path = entry.path.as_deref().ok_or_else(|| {
        LeadGenError::config(format!("fixture provider `{}` needs a `path`", entry.name))
    })?;
    let path = Path::new(path);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        fixtures_dir.join(path)
    })
}

fn base_url(entry: &ProviderEntry) -> Result<&str> {
    entry.base_url.as_deref().ok_or_else(|| {
        LeadGenError::config(format!("http provider `{}` needs a `base_url`", entry.name))
    })
}

fn listing_source(
    entry: &ProviderEntry,
    fixtures_dir: &Path,
    client: &Client,
) -> Result<Box<dyn ListingSource>> {
    Ok(match entry.kind {
        ProviderKind::Fixture => Box::new(FixtureListingSource::new(
            &entry.name,
            fixture_path(entry, fixtures_dir)?,
        )),
        ProviderKind::Http => Box::new(HttpListingSource::new(
            &entry.name,
            base_url(entry)?,
            client.clone(),
        )?),
    })
}

fn contact_source(
    entry: &ProviderEntry,
    fixtures_dir: &Path,
    client: &Client,
) -> Result<Box<dyn ContactSource>> {
    Ok(match entry.kind {
        ProviderKind::Fixture => Box::new(FixtureContactSource::new(
            &entry.name,
            fixture_path(entry, fixtures_dir)?,
        )),
        ProviderKind::Http => Box::new(HttpContactSource::new(
            &entry.name,
            base_url(entry)?,
            client.clone(),
        )?),
    })
}
