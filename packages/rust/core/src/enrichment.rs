//! Contact enrichment: freeze filtered listings into leads and fill in owner
//! details from the contact sources.
//!
//! Each lead walks the sources in declared order (first success wins) until
//! it has a phone or an email. Leads are processed in batches of
//! `concurrency`, with a pause between batches to pace the providers.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use leadgen_shared::{Lead, LeadGenError, RawListing, Result};
use leadgen_sources::{ContactQuery, ContactRecord, ContactSource};

use crate::aggregator::{MergeMissing, MergeOutcome, first_success};

// ---------------------------------------------------------------------------
// Merge rules
// ---------------------------------------------------------------------------

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> usize {
    if slot.is_none() && value.is_some() {
        *slot = value;
        1
    } else {
        0
    }
}

impl MergeMissing<ContactRecord> for Lead {
    fn merge_missing(&mut self, part: ContactRecord) -> usize {
        let part = part.normalized();
        let mut filled = 0;
        filled += fill(&mut self.owner_name, part.owner_name);
        if !self.has_phone() {
            self.owner_phone = None;
        }
        let mut contact_filled = fill(&mut self.owner_phone, part.owner_phone);
        if !self.has_email() {
            self.owner_email = None;
        }
        contact_filled += fill(&mut self.owner_email, part.owner_email);
        filled += contact_filled;
        filled += fill(&mut self.mailing_address, part.mailing_address);
        filled += fill(&mut self.equity_estimate, part.equity_estimate);

        if let Some(value) = part.property_value_estimate {
            if !self.metadata.contains_key("property_value_estimate") {
                self.metadata
                    .insert("property_value_estimate".into(), Value::from(value));
                filled += 1;
            }
        }
        // confidence of whichever record supplied the first contact channel
        if let Some(confidence) = part.confidence.filter(|_| contact_filled > 0) {
            self.metadata
                .entry("contact_confidence")
                .or_insert(Value::from(confidence));
        }
        filled
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Batch-level enrichment counters, stored in workflow metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentSummary {
    pub total: usize,
    pub with_phone: usize,
    pub with_email: usize,
    /// Leads with neither phone nor email after every source was tried.
    pub without_contact: usize,
    /// Source calls that failed across all leads.
    pub failed_lookups: usize,
    /// Source calls avoided because a lead was already reachable.
    pub skipped_lookups: usize,
}

#[derive(Debug, Clone)]
pub struct EnrichmentResults {
    /// Leads in input order.
    pub leads: Vec<Lead>,
    pub summary: EnrichmentSummary,
}

/// Knobs for [`enrich_listings`].
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentOptions {
    /// Leads looked up at the same time. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Pause between batches.
    pub pacing: Duration,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            pacing: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Enrich a single lead in place.
///
/// Sources are consulted in order until the lead has a phone or an email; a
/// failing source counts as an empty answer. The walk is recorded under the
/// lead's `enrichment` metadata key.
pub async fn enrich_lead(lead: &mut Lead, sources: &[Box<dyn ContactSource>]) -> Result<MergeOutcome> {
    let query = ContactQuery::from_lead(lead);
    let outcome = first_success(
        sources,
        lead,
        |s| s.name().to_string(),
        |s| s.lookup(&query),
        Lead::has_contact,
    )
    .await?;

    debug!(
        address = %lead.property.address,
        consulted = outcome.consulted.len(),
        filled = outcome.fields_filled,
        reachable = outcome.sufficient,
        "lead enriched"
    );
    lead.metadata.insert(
        "enrichment".into(),
        serde_json::to_value(&outcome).unwrap_or(Value::Null),
    );
    Ok(outcome)
}

/// Freeze `listings` into leads and enrich them in paced batches.
///
/// Fails only on misuse: no listings or no sources.
#[instrument(skip_all, fields(listings = listings.len(), sources = sources.len()))]
pub async fn enrich_listings(
    listings: Vec<RawListing>,
    sources: &[Box<dyn ContactSource>],
    options: EnrichmentOptions,
) -> Result<EnrichmentResults> {
    if listings.is_empty() {
        return Err(LeadGenError::validation("nothing to enrich"));
    }
    if sources.is_empty() {
        return Err(LeadGenError::validation("no contact sources configured"));
    }

    let mut pending: Vec<Lead> = listings.into_iter().map(Lead::from_listing).collect();
    let batch_size = options.concurrency.max(1);
    let batches = pending.len().div_ceil(batch_size);
    let mut summary = EnrichmentSummary {
        total: pending.len(),
        ..EnrichmentSummary::default()
    };

    for (i, batch) in pending.chunks_mut(batch_size).enumerate() {
        if i > 0 && !options.pacing.is_zero() {
            tokio::time::sleep(options.pacing).await;
        }
        let outcomes = join_all(batch.iter_mut().map(|lead| enrich_lead(lead, sources))).await;
        for outcome in outcomes {
            let outcome = outcome?;
            summary.failed_lookups += outcome.failed.len();
            summary.skipped_lookups += outcome.skipped.len();
        }
        debug!(batch = i + 1, batches, "enrichment batch complete");
    }

    for lead in &pending {
        summary.with_phone += usize::from(lead.has_phone());
        summary.with_email += usize::from(lead.has_email());
        summary.without_contact += usize::from(!lead.has_contact());
    }

    info!(
        total = summary.total,
        with_phone = summary.with_phone,
        with_email = summary.with_email,
        without_contact = summary.without_contact,
        failed_lookups = summary.failed_lookups,
        "enrichment complete"
    );

    Ok(EnrichmentResults {
        leads: pending,
        summary,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct CannedContacts {
        name: &'static str,
        record: Option<ContactRecord>,
    }

    impl CannedContacts {
        fn boxed(name: &'static str, record: Option<ContactRecord>) -> Box<dyn ContactSource> {
            Box::new(Self { name, record })
        }
    }

    #[async_trait]
    impl ContactSource for CannedContacts {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, _query: &ContactQuery) -> Result<ContactRecord> {
            self.record
                .clone()
                .ok_or_else(|| LeadGenError::source_failed(self.name, "unavailable"))
        }
    }

    fn listing(address: &str) -> RawListing {
        RawListing {
            address: address.into(),
            city: "Phoenix".into(),
            state: "AZ".into(),
            ..RawListing::default()
        }
    }

    fn record(name: Option<&str>, phone: Option<&str>, email: Option<&str>) -> ContactRecord {
        ContactRecord {
            owner_name: name.map(String::from),
            owner_phone: phone.map(String::from),
            owner_email: email.map(String::from),
            ..ContactRecord::default()
        }
    }

    #[test]
    fn merge_never_overwrites_known_fields() {
        let mut lead = Lead::from_listing(listing("1 Elm St"));
        lead.owner_name = Some("Dana Ortiz".into());

        let filled = lead.merge_missing(ContactRecord {
            owner_name: Some("Someone Else".into()),
            owner_phone: Some("602-555-0100".into()),
            equity_estimate: Some(120_000.0),
            property_value_estimate: Some(410_000.0),
            ..ContactRecord::default()
        });

        assert_eq!(filled, 3);
        assert_eq!(lead.owner_name.as_deref(), Some("Dana Ortiz"));
        assert_eq!(lead.owner_phone.as_deref(), Some("602-555-0100"));
        assert_eq!(lead.equity_estimate, Some(120_000.0));
        assert_eq!(lead.metadata["property_value_estimate"], 410_000.0);
    }

    #[test]
    fn contact_confidence_comes_from_the_supplying_record() {
        let mut lead = Lead::from_listing(listing("2 Elm St"));
        lead.merge_missing(ContactRecord {
            owner_name: Some("Ann Lee".into()),
            confidence: Some(40),
            ..ContactRecord::default()
        });
        assert!(!lead.metadata.contains_key("contact_confidence"));

        lead.merge_missing(ContactRecord {
            owner_phone: Some("602-555-0142".into()),
            confidence: Some(85),
            ..ContactRecord::default()
        });
        lead.merge_missing(ContactRecord {
            owner_email: Some("ann@example.com".into()),
            confidence: Some(20),
            ..ContactRecord::default()
        });
        assert_eq!(lead.metadata["contact_confidence"], 85);
    }

    #[test]
    fn merge_replaces_blank_contact_values() {
        let mut lead = Lead::from_listing(listing("1 Elm St"));
        lead.owner_phone = Some("  ".into());
        lead.merge_missing(record(None, Some("602-555-0111"), Some("")));
        assert_eq!(lead.owner_phone.as_deref(), Some("602-555-0111"));
        assert!(lead.owner_email.is_none());
    }

    #[tokio::test]
    async fn stops_at_first_source_with_contact() {
        let sources = vec![
            CannedContacts::boxed("property_records", Some(record(Some("Ann Lee"), None, None))),
            CannedContacts::boxed("skiptracing", Some(record(None, Some("602-555-0199"), None))),
            CannedContacts::boxed("social_media", Some(record(None, None, Some("ann@example.com")))),
        ];
        let mut lead = Lead::from_listing(listing("9 Palm Ln"));

        let outcome = enrich_lead(&mut lead, &sources).await.unwrap();
        assert_eq!(outcome.consulted, vec!["property_records", "skiptracing"]);
        assert_eq!(outcome.skipped, vec!["social_media"]);
        assert_eq!(lead.owner_name.as_deref(), Some("Ann Lee"));
        assert!(lead.owner_email.is_none());
        assert_eq!(lead.metadata["enrichment"]["sufficient"], true);
    }

    #[tokio::test]
    async fn listing_contact_skips_every_source() {
        let sources = vec![CannedContacts::boxed(
            "skiptracing",
            Some(record(None, Some("000"), None)),
        )];
        let mut raw = listing("4 Sun Ct");
        raw.extra
            .insert("owner_contact".into(), Value::from("480-555-0123"));
        let mut lead = Lead::from_listing(raw);

        let outcome = enrich_lead(&mut lead, &sources).await.unwrap();
        // the first source is still consulted; sufficiency is checked after each merge
        assert_eq!(outcome.consulted, vec!["skiptracing"]);
        assert_eq!(lead.owner_phone.as_deref(), Some("480-555-0123"));
    }

    #[tokio::test]
    async fn batch_survives_failing_sources() {
        let sources = vec![
            CannedContacts::boxed("down", None),
            CannedContacts::boxed("public_records", Some(record(None, None, Some("owner@example.com")))),
        ];
        let listings = (0..5).map(|i| listing(&format!("{i} Main St"))).collect();
        let options = EnrichmentOptions {
            concurrency: 2,
            pacing: Duration::ZERO,
        };

        let results = enrich_listings(listings, &sources, options).await.unwrap();
        assert_eq!(results.leads.len(), 5);
        assert_eq!(results.leads[3].property.address, "3 Main St");
        assert_eq!(results.summary.with_email, 5);
        assert_eq!(results.summary.failed_lookups, 5);
        assert_eq!(results.summary.without_contact, 0);
    }

    #[tokio::test]
    async fn unreachable_leads_are_counted() {
        let sources = vec![CannedContacts::boxed("property_records", Some(ContactRecord::default()))];
        let results = enrich_listings(vec![listing("7 Oak Dr")], &sources, EnrichmentOptions::default())
            .await
            .unwrap();
        assert_eq!(results.summary.without_contact, 1);
        assert_eq!(results.leads[0].metadata["enrichment"]["sufficient"], false);
    }

    #[tokio::test]
    async fn empty_input_or_no_sources_is_misuse() {
        let sources = vec![CannedContacts::boxed("x", None)];
        assert!(enrich_listings(Vec::new(), &sources, EnrichmentOptions::default()).await.is_err());

        let none: Vec<Box<dyn ContactSource>> = Vec::new();
        assert!(enrich_listings(vec![listing("1 A St")], &none, EnrichmentOptions::default()).await.is_err());
    }
}
