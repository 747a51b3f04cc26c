//! Human gate: decide which scored leads move on to export.
//!
//! Unattended runs approve every lead at or above a score threshold and
//! reject the rest. Attended runs ask a [`Reviewer`] for per-lead decisions;
//! leads it says nothing about stay `new` and do not move on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use leadgen_shared::{Lead, LeadGenError, LeadStatus, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[serde(alias = "approved")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

/// One reviewer decision. `lead` is the lead id, `"address, city[, state]"`,
/// or a bare street address (case-insensitive). A bare address only applies
/// when exactly one lead has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    #[serde(alias = "lead_id", alias = "address")]
    pub lead: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub notes: String,
}

impl ReviewDecision {
    pub fn new(lead: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            lead: lead.into(),
            verdict,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Named by id or by address with city (and state, if given).
    fn names_exactly(&self, lead: &Lead) -> bool {
        let key = self.lead.trim();
        if key == lead.id.to_string() {
            return true;
        }
        let parts: Vec<String> = key.split(',').map(|p| p.trim().to_lowercase()).collect();
        let [address, city, rest @ ..] = parts.as_slice() else {
            return false;
        };
        let (own_address, own_city, own_state) = lead.property.dedup_key();
        // "AZ 85281" still names state AZ
        let state_ok = rest
            .first()
            .and_then(|s| s.split_whitespace().next())
            .is_none_or(|state| state == own_state);
        *address == own_address && *city == own_city && state_ok
    }

    /// Named by street address alone.
    fn names_address(&self, lead: &Lead) -> bool {
        let key = self.lead.trim();
        !key.contains(',') && key.eq_ignore_ascii_case(lead.property.address.trim())
    }
}

/// An external approval source.
#[async_trait]
pub trait Reviewer: Send + Sync {
    fn name(&self) -> &str;

    /// Decide on any subset of `leads` (best first).
    async fn review(&self, leads: &[Lead]) -> Result<Vec<ReviewDecision>>;
}

/// Reads decisions prepared ahead of time from a JSON array.
pub struct DecisionFileReviewer {
    path: PathBuf,
}

impl DecisionFileReviewer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Reviewer for DecisionFileReviewer {
    fn name(&self) -> &str {
        "decisions-file"
    }

    async fn review(&self, _leads: &[Lead]) -> Result<Vec<ReviewDecision>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LeadGenError::io(&self.path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            LeadGenError::Review(format!("{}: invalid decisions file: {e}", self.path.display()))
        })
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// How the gate decides.
pub enum ReviewPolicy {
    /// Approve `score >= threshold`, reject the rest.
    Threshold(f64),
    /// Defer to an external reviewer.
    Attended(Box<dyn Reviewer>),
}

impl ReviewPolicy {
    fn label(&self) -> String {
        match self {
            Self::Threshold(t) => format!("auto (threshold {t})"),
            Self::Attended(r) => format!("attended ({})", r.name()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub mode: String,
    pub approved: usize,
    pub rejected: usize,
    /// Leads left `new` because no decision named them.
    pub undecided: usize,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// Every input lead, with its review state applied, in input order.
    pub leads: Vec<Lead>,
    /// The approved subset, in input order.
    pub approved: Vec<Lead>,
    pub summary: ReviewSummary,
}

/// Apply one verdict: `new → reviewed → approved | rejected`.
pub fn apply_verdict(lead: &mut Lead, verdict: Verdict, notes: &str, reviewer: &str) -> Result<()> {
    lead.transition(LeadStatus::Reviewed)?;
    let next = match verdict {
        Verdict::Approve => LeadStatus::Approved,
        Verdict::Reject => LeadStatus::Rejected,
    };
    lead.transition(next)?;
    lead.human_reviewed = true;
    lead.human_approved = verdict == Verdict::Approve;
    if !notes.trim().is_empty() {
        if !lead.notes.is_empty() {
            lead.notes.push('\n');
        }
        lead.notes.push_str(notes.trim());
    }
    lead.metadata
        .insert("review".into(), json!({ "verdict": verdict, "reviewer": reviewer }));
    Ok(())
}

/// Run the gate over scored leads.
#[instrument(skip_all, fields(leads = leads.len()))]
pub async fn review_leads(mut leads: Vec<Lead>, policy: &ReviewPolicy) -> Result<ReviewOutcome> {
    let mut summary = ReviewSummary {
        mode: policy.label(),
        ..ReviewSummary::default()
    };

    let verdicts: Vec<Option<(Verdict, String)>> = match policy {
        ReviewPolicy::Threshold(threshold) => leads
            .iter()
            .map(|lead| {
                let verdict = if lead.score_or_zero() >= *threshold {
                    Verdict::Approve
                } else {
                    Verdict::Reject
                };
                Some((verdict, String::new()))
            })
            .collect(),
        ReviewPolicy::Attended(reviewer) => {
            let decisions = reviewer.review(&leads).await?;
            match_decisions(&leads, decisions)
        }
    };

    let reviewer = match policy {
        ReviewPolicy::Threshold(_) => "auto",
        ReviewPolicy::Attended(r) => r.name(),
    };
    for (lead, verdict) in leads.iter_mut().zip(verdicts) {
        let Some((verdict, notes)) = verdict else {
            summary.undecided += 1;
            continue;
        };
        match apply_verdict(lead, verdict, &notes, reviewer) {
            Ok(()) if verdict == Verdict::Approve => summary.approved += 1,
            Ok(()) => summary.rejected += 1,
            Err(e) => {
                warn!(lead = %lead.id, error = %e, "decision not applied");
                summary.undecided += 1;
            }
        }
    }

    let approved = leads.iter().filter(|l| l.status() == LeadStatus::Approved).cloned().collect();
    info!(
        mode = %summary.mode,
        approved = summary.approved,
        rejected = summary.rejected,
        undecided = summary.undecided,
        "review complete"
    );
    Ok(ReviewOutcome {
        leads,
        approved,
        summary,
    })
}

/// Line decisions up with leads. The first decision naming a lead wins;
/// decisions naming no lead, or a bare address shared by several leads, are
/// logged and dropped.
fn match_decisions(leads: &[Lead], decisions: Vec<ReviewDecision>) -> Vec<Option<(Verdict, String)>> {
    let mut matched: HashMap<usize, (Verdict, String)> = HashMap::new();
    for decision in decisions {
        let target = match leads.iter().position(|lead| decision.names_exactly(lead)) {
            Some(i) => Some(i),
            None => {
                let by_address: Vec<usize> = (0..leads.len())
                    .filter(|&i| decision.names_address(&leads[i]))
                    .collect();
                if by_address.len() > 1 {
                    warn!(
                        lead = %decision.lead,
                        candidates = by_address.len(),
                        "decision address is ambiguous, add the city"
                    );
                    continue;
                }
                by_address.first().copied()
            }
        };
        match target {
            Some(i) => {
                matched.entry(i).or_insert((decision.verdict, decision.notes));
            }
            None => warn!(lead = %decision.lead, "decision names no known lead"),
        }
    }
    (0..leads.len()).map(|i| matched.remove(&i)).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use leadgen_shared::RawListing;

    use super::*;

    fn scored(address: &str, score: f64) -> Lead {
        let mut lead = Lead::from_listing(RawListing {
            address: address.into(),
            ..RawListing::default()
        });
        lead.set_score(score);
        lead
    }

    struct FixedReviewer(Vec<ReviewDecision>);

    #[async_trait]
    impl Reviewer for FixedReviewer {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn review(&self, _leads: &[Lead]) -> Result<Vec<ReviewDecision>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn threshold_gate_approves_at_or_above() {
        let leads = vec![scored("a", 80.0), scored("b", 50.0), scored("c", 49.0)];
        let outcome = review_leads(leads, &ReviewPolicy::Threshold(50.0)).await.unwrap();

        assert_eq!(outcome.approved.len(), 2);
        assert_eq!(outcome.approved[0].property.address, "a");
        assert_eq!(outcome.approved[1].property.address, "b");
        assert_eq!(outcome.leads[2].status(), LeadStatus::Rejected);
        assert!(outcome.leads[2].human_reviewed);
        assert!(!outcome.leads[2].human_approved);
        assert_eq!(outcome.summary.approved, 2);
        assert_eq!(outcome.summary.rejected, 1);
    }

    #[tokio::test]
    async fn attended_gate_leaves_undecided_leads_new() {
        let leads = vec![scored("12 Oak St", 90.0), scored("14 Oak St", 30.0), scored("16 Oak St", 70.0)];
        let id = leads[1].id.to_string();
        let reviewer = FixedReviewer(vec![
            ReviewDecision::new("12 oak st", Verdict::Reject).with_notes("tenant occupied"),
            ReviewDecision::new(id, Verdict::Approve),
            ReviewDecision::new("99 Nowhere Rd", Verdict::Approve),
        ]);

        let outcome = review_leads(leads, &ReviewPolicy::Attended(Box::new(reviewer)))
            .await
            .unwrap();

        assert_eq!(outcome.approved.len(), 1);
        assert_eq!(outcome.approved[0].property.address, "14 Oak St");
        assert_eq!(outcome.leads[0].notes, "tenant occupied");
        assert_eq!(outcome.leads[2].status(), LeadStatus::New);
        assert!(!outcome.leads[2].human_reviewed);
        assert_eq!(outcome.summary.undecided, 1);
    }

    #[tokio::test]
    async fn first_decision_for_a_lead_wins() {
        let leads = vec![scored("1 A St", 60.0)];
        let reviewer = FixedReviewer(vec![
            ReviewDecision::new("1 A St", Verdict::Approve),
            ReviewDecision::new("1 A St", Verdict::Reject),
        ]);
        let outcome = review_leads(leads, &ReviewPolicy::Attended(Box::new(reviewer)))
            .await
            .unwrap();
        assert_eq!(outcome.summary.approved, 1);
        assert_eq!(outcome.summary.rejected, 0);
    }

    fn scored_in(address: &str, city: &str, state: &str, score: f64) -> Lead {
        let mut lead = Lead::from_listing(RawListing {
            address: address.into(),
            city: city.into(),
            state: state.into(),
            zip_code: "85000".into(),
            ..RawListing::default()
        });
        lead.set_score(score);
        lead
    }

    #[tokio::test]
    async fn same_street_address_in_two_cities_needs_the_city() {
        let leads = vec![
            scored_in("12 Oak St", "Tempe", "AZ", 70.0),
            scored_in("12 Oak St", "Mesa", "AZ", 60.0),
        ];
        let reviewer = FixedReviewer(vec![
            ReviewDecision::new("12 Oak St", Verdict::Reject),
            ReviewDecision::new("12 oak st, mesa, az 85000", Verdict::Approve),
        ]);
        let outcome = review_leads(leads, &ReviewPolicy::Attended(Box::new(reviewer)))
            .await
            .unwrap();

        assert_eq!(outcome.leads[0].status(), LeadStatus::New);
        assert_eq!(outcome.leads[1].status(), LeadStatus::Approved);
        assert_eq!(outcome.summary.approved, 1);
        assert_eq!(outcome.summary.rejected, 0);
        assert_eq!(outcome.summary.undecided, 1);
    }

    #[test]
    fn already_rejected_lead_cannot_be_approved() {
        let mut lead = scored("x", 10.0);
        apply_verdict(&mut lead, Verdict::Reject, "", "auto").unwrap();
        assert!(apply_verdict(&mut lead, Verdict::Approve, "", "auto").is_err());
        assert_eq!(lead.status(), LeadStatus::Rejected);
    }

    #[tokio::test]
    async fn decisions_file_accepts_aliases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"address": "5 Mesa Dr", "verdict": "approved", "notes": "call Monday"}},
               {{"lead_id": "0190b7d2-0000-7000-8000-000000000000", "verdict": "reject"}}]"#
        )
        .unwrap();

        let decisions = DecisionFileReviewer::new(file.path()).review(&[]).await.unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].lead, "5 Mesa Dr");
        assert_eq!(decisions[0].verdict, Verdict::Approve);
        assert_eq!(decisions[1].verdict, Verdict::Reject);
        assert!(decisions[1].notes.is_empty());
    }

    #[tokio::test]
    async fn missing_decisions_file_is_an_error() {
        let reviewer = DecisionFileReviewer::new("/nonexistent/decisions.json");
        assert!(reviewer.review(&[]).await.is_err());
    }
}
