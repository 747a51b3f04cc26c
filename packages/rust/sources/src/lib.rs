//! Listing and contact providers for the lead pipeline.
//!
//! Two capability traits describe what a provider can do:
//! - [`ListingSource`] returns property listings for a set of criteria
//! - [`ContactSource`] returns owner contact details for one property
//!
//! Concrete providers live in [`providers`]; [`SourceRegistry`] builds the
//! configured set in declaration order.

pub mod providers;
mod registry;

use async_trait::async_trait;
use leadgen_shared::{Criteria, Lead, RawListing, Result};
use serde::{Deserialize, Serialize};

pub use providers::{
    FixtureContactSource, FixtureListingSource, HttpContactSource, HttpListingSource, build_client,
};
pub use registry::SourceRegistry;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A provider of property listings (MLS feed, portal API, FSBO board, ...).
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Source tag stamped on every produced record.
    fn name(&self) -> &str;

    /// Fetch listings matching `criteria`. Providers may over-return; the
    /// filter chain narrows the result.
    async fn fetch(&self, criteria: &Criteria) -> Result<Vec<RawListing>>;
}

/// A provider of owner contact details (skip tracing, public records, ...).
#[async_trait]
pub trait ContactSource: Send + Sync {
    fn name(&self) -> &str;

    /// Look up one property. "Nothing known" is an empty record, not an error.
    async fn lookup(&self, query: &ContactQuery) -> Result<ContactRecord>;
}

// ---------------------------------------------------------------------------
// Contact lookup types
// ---------------------------------------------------------------------------

/// The property a contact lookup is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactQuery {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

impl ContactQuery {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            address: lead.property.address.clone(),
            city: lead.property.city.clone(),
            state: lead.property.state.clone(),
            zip_code: lead.property.zip_code.clone(),
            owner_name: lead.owner_name.clone(),
        }
    }

    /// Same normalization as [`RawListing::dedup_key`].
    pub fn key(&self) -> (String, String, String) {
        (
            self.address.trim().to_lowercase(),
            self.city.trim().to_lowercase(),
            self.state.trim().to_lowercase(),
        )
    }
}

/// Partial owner details from one contact source. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailing_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_value_estimate: Option<f64>,
    /// Provider's own match confidence, 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl ContactRecord {
    /// No field carries a value.
    pub fn is_empty(&self) -> bool {
        self.owner_name.is_none()
            && self.owner_phone.is_none()
            && self.owner_email.is_none()
            && self.mailing_address.is_none()
            && self.equity_estimate.is_none()
            && self.property_value_estimate.is_none()
    }

    /// Drop blank strings so they never count as "known".
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.owner_name,
            &mut self.owner_phone,
            &mut self.owner_email,
            &mut self.mailing_address,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_contact_fields_are_dropped() {
        let record = ContactRecord {
            owner_phone: Some("  ".into()),
            owner_email: Some("a@b.com".into()),
            ..ContactRecord::default()
        }
        .normalized();
        assert!(record.owner_phone.is_none());
        assert_eq!(record.owner_email.as_deref(), Some("a@b.com"));
        assert!(!record.is_empty());
        assert!(ContactRecord::default().is_empty());
    }

    #[test]
    fn contact_query_copies_lead_address() {
        let listing = RawListing {
            address: "12 Oak St".into(),
            city: "Phoenix".into(),
            state: "AZ".into(),
            zip_code: "85001".into(),
            ..RawListing::default()
        };
        let query = ContactQuery::from_lead(&Lead::from_listing(listing));
        assert_eq!(query.key(), ("12 oak st".into(), "phoenix".into(), "az".into()));
        assert_eq!(query.zip_code, "85001");
    }
}
