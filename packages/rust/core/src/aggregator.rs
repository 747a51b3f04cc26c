//! Multi-source fan-out with graceful degradation.
//!
//! Two modes:
//! - **union**: every source runs concurrently, results are concatenated in
//!   declaration order and de-duplicated by key (first occurrence wins)
//! - **first success wins**: sources run one after another, each result only
//!   fills what is still missing, and the walk stops once the target is
//!   sufficient
//!
//! A failing source never fails the aggregate; it contributes nothing and is
//! logged. Only misuse (no sources at all) is an error.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tracing::{debug, warn};

use leadgen_shared::{Criteria, LeadGenError, RawListing, Result};
use leadgen_sources::ListingSource;

// ---------------------------------------------------------------------------
// Union mode
// ---------------------------------------------------------------------------

/// A named, not-yet-polled source call.
pub type SourceCall<'a, T> = (String, BoxFuture<'a, Result<Vec<T>>>);

/// How one source fared during a union fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Merged output of a union fan-out.
#[derive(Debug, Clone)]
pub struct UnionResult<T> {
    /// De-duplicated records, in source-declaration order.
    pub records: Vec<T>,
    pub reports: Vec<SourceReport>,
    /// Records dropped as duplicates of an earlier one.
    pub duplicates: usize,
}

/// Run every call concurrently and merge the results.
///
/// Records are concatenated in the order the calls were given, regardless of
/// completion order, then de-duplicated on `key`.
pub async fn union<'a, T, K, KF>(calls: Vec<SourceCall<'a, T>>, key: KF) -> Result<UnionResult<T>>
where
    K: Eq + Hash,
    KF: Fn(&T) -> K,
{
    if calls.is_empty() {
        return Err(LeadGenError::validation("no sources configured"));
    }

    let (names, futures): (Vec<String>, Vec<_>) = calls.into_iter().unzip();
    let outcomes = join_all(futures).await;

    let mut reports = Vec::with_capacity(names.len());
    let mut merged = Vec::new();
    for (source, outcome) in names.into_iter().zip(outcomes) {
        match outcome {
            Ok(records) => {
                debug!(%source, records = records.len(), "source returned");
                reports.push(SourceReport {
                    source,
                    records: records.len(),
                    error: None,
                });
                merged.extend(records);
            }
            Err(e) => {
                warn!(%source, error = %e, "source failed, continuing without it");
                reports.push(SourceReport {
                    source,
                    records: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let before = merged.len();
    let records = dedupe_by_key(merged, key);
    Ok(UnionResult {
        duplicates: before - records.len(),
        records,
        reports,
    })
}

/// Keep the first record for each key, preserving order.
pub fn dedupe_by_key<T, K, KF>(records: Vec<T>, key: KF) -> Vec<T>
where
    K: Eq + Hash,
    KF: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(key(record)))
        .collect()
}

/// Query every listing source for `criteria` and merge on
/// `(address, city, state)`.
pub async fn search_all(
    sources: &[Box<dyn ListingSource>],
    criteria: &Criteria,
) -> Result<UnionResult<RawListing>> {
    let calls = sources
        .iter()
        .map(|source| (source.name().to_string(), source.fetch(criteria)))
        .collect();
    union(calls, RawListing::dedup_key).await
}

// ---------------------------------------------------------------------------
// First-success-wins mode
// ---------------------------------------------------------------------------

/// A target that absorbs partial results without overwriting known fields.
pub trait MergeMissing<P> {
    /// Fill still-empty fields from `part`. Returns how many were filled.
    fn merge_missing(&mut self, part: P) -> usize;
}

/// Which sources a first-success walk touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeOutcome {
    /// Sources that were called (successfully or not), in order.
    pub consulted: Vec<String>,
    pub failed: Vec<String>,
    /// Sources never called because the target was already sufficient.
    pub skipped: Vec<String>,
    /// Fields filled across all sources.
    pub fields_filled: usize,
    pub sufficient: bool,
}

/// Walk `sources` in order, merging each result into `target` until
/// `sufficient(target)` holds.
pub async fn first_success<'s, S, A, P, N, C, Fut, Suff>(
    sources: &'s [S],
    target: &mut A,
    name_of: N,
    mut call: C,
    sufficient: Suff,
) -> Result<MergeOutcome>
where
    A: MergeMissing<P>,
    N: Fn(&S) -> String,
    C: FnMut(&'s S) -> Fut,
    Fut: Future<Output = Result<P>>,
    Suff: Fn(&A) -> bool,
{
    if sources.is_empty() {
        return Err(LeadGenError::validation("no sources configured"));
    }

    let mut outcome = MergeOutcome::default();
    for (i, source) in sources.iter().enumerate() {
        let name = name_of(source);
        outcome.consulted.push(name.clone());

        match call(source).await {
            Ok(part) => outcome.fields_filled += target.merge_missing(part),
            Err(e) => {
                warn!(source = %name, error = %e, "source failed, trying next");
                outcome.failed.push(name);
            }
        }

        if sufficient(target) {
            outcome.sufficient = true;
            outcome.skipped = sources[i + 1..].iter().map(&name_of).collect();
            break;
        }
    }
    Ok(outcome)
}
