//! Core domain types for the lead pipeline: criteria, listings, leads, and
//! the workflow state threaded through every stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{LeadGenError, Result};

/// Property types assumed when a query names none.
pub const DEFAULT_PROPERTY_TYPES: [&str; 3] = ["single-family", "duplex", "townhouse"];

/// Motivation tags that count double in both quality and lead scoring.
pub const HIGH_VALUE_SIGNALS: [&str; 6] = [
    "motivated_seller",
    "price_reduction",
    "estate_sale",
    "financial_distress",
    "quick_sale_needed",
    "high_equity",
];

/// Whether `signal` is one of [`HIGH_VALUE_SIGNALS`] (case-insensitive).
pub fn is_high_value_signal(signal: &str) -> bool {
    HIGH_VALUE_SIGNALS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(signal.trim()))
}

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// Who the leads are for. Drives the size and age filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadType {
    Buyer,
    #[default]
    Seller,
    Investor,
}

impl LeadType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Investor => "investor",
        }
    }
}

impl fmt::Display for LeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadType {
    type Err = LeadGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "investor" => Ok(Self::Investor),
            other => Err(LeadGenError::validation(format!(
                "unknown lead type `{other}` (expected buyer, seller, or investor)"
            ))),
        }
    }
}

fn default_property_types() -> Vec<String> {
    DEFAULT_PROPERTY_TYPES.iter().map(|s| s.to_string()).collect()
}

/// The search specification produced by intent extraction.
///
/// Treated as read-only once a stage has produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Free-form location, usually `"City, ST"`.
    #[serde(default)]
    pub location: String,

    /// Desired property types, matched by substring.
    #[serde(default = "default_property_types")]
    pub property_types: Vec<String>,

    #[serde(default, alias = "min_price")]
    pub price_min: Option<f64>,

    #[serde(default, alias = "max_price")]
    pub price_max: Option<f64>,

    #[serde(default)]
    pub lead_type: LeadType,

    /// Desired motivation tags. Empty means "don't filter on motivation".
    #[serde(default)]
    pub motivation_signals: Vec<String>,
}

impl Criteria {
    /// Criteria for a location with every other field at its default.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            property_types: default_property_types(),
            price_min: None,
            price_max: None,
            lead_type: LeadType::default(),
            motivation_signals: Vec::new(),
        }
    }

    /// Set the price bounds, rejecting an inverted range.
    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        self.price_min = min;
        self.price_max = max;
        self.validate()?;
        Ok(self)
    }

    /// Replace the property types. Duplicates (case-insensitive) are dropped.
    pub fn with_property_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_types = dedupe_tags(types);
        self
    }

    pub fn with_lead_type(mut self, lead_type: LeadType) -> Self {
        self.lead_type = lead_type;
        self
    }

    /// Replace the desired motivation tags. Duplicates are dropped.
    pub fn with_motivation_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.motivation_signals = dedupe_tags(signals);
        self
    }

    /// Check the structural invariants: bounds are non-negative and ordered.
    pub fn validate(&self) -> Result<()> {
        for (name, bound) in [("price_min", self.price_min), ("price_max", self.price_max)] {
            if let Some(value) = bound {
                if !value.is_finite() || value < 0.0 {
                    return Err(LeadGenError::validation(format!(
                        "{name} must be a non-negative number, got {value}"
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(LeadGenError::validation(format!(
                    "price_min {min} exceeds price_max {max}"
                )));
            }
        }
        Ok(())
    }

    /// The location when it is a bare five-digit ZIP code.
    pub fn zip_code(&self) -> Option<&str> {
        let location = self.location.trim();
        (location.len() == 5 && location.bytes().all(|b| b.is_ascii_digit())).then_some(location)
    }

    /// Split the location into `(city, state)`, both trimmed and lower-cased.
    pub fn city_state(&self) -> (String, Option<String>) {
        let mut parts = self.location.split(',').map(|p| p.trim().to_lowercase());
        let city = parts.next().unwrap_or_default();
        let state = parts.next().filter(|s| !s.is_empty());
        (city, state)
    }
}

fn dedupe_tags<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.into().trim().to_string();
        if item.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(&item)) {
            continue;
        }
        out.push(item);
    }
    out
}

// ---------------------------------------------------------------------------
// RawListing
// ---------------------------------------------------------------------------

/// Age bucket assigned by the age filter for investor searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeCategory {
    Vintage,
    Mature,
    Modern,
}

/// A property record as returned by a listing source.
///
/// Provider-specific keys that have no typed field land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// Stable id assigned at aggregation; empty until then.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_feet: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_on_market: Option<u32>,
    /// Tag of the provider that produced the record (`mls`, `zillow`, ...).
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub motivation_signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_category: Option<AgeCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawListing {
    /// Composite identity used for de-duplication: trimmed, lower-cased
    /// `(address, city, state)`.
    pub fn dedup_key(&self) -> (String, String, String) {
        (
            self.address.trim().to_lowercase(),
            self.city.trim().to_lowercase(),
            self.state.trim().to_lowercase(),
        )
    }

    /// `"address, city, state zip"` for logs and reports.
    pub fn display_address(&self) -> String {
        let mut out = self.address.trim().to_string();
        for part in [self.city.trim(), self.state.trim()] {
            if !part.is_empty() {
                out.push_str(", ");
                out.push_str(part);
            }
        }
        if !self.zip_code.trim().is_empty() {
            out.push(' ');
            out.push_str(self.zip_code.trim());
        }
        out
    }

    fn extra_str(&self, key: &str) -> Option<String> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// Review lifecycle of a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Reviewed,
    Approved,
    Rejected,
    Contacted,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewed => "reviewed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Contacted => "contacted",
        }
    }

    /// Forward-only lifecycle: new → reviewed → {approved, rejected},
    /// approved → contacted.
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Reviewed)
                | (Self::Reviewed, Self::Approved)
                | (Self::Reviewed, Self::Rejected)
                | (Self::Approved, Self::Contacted)
        )
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listing frozen for enrichment, scoring, and review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    /// Property facts carried over from the listing.
    pub property: RawListing,
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
    #[serde(default, deserialize_with = "deserialize_score")]
    score: Option<f64>,
    #[serde(default)]
    status: LeadStatus,
    #[serde(default)]
    pub human_reviewed: bool,
    #[serde(default)]
    pub human_approved: bool,
    #[serde(default)]
    pub notes: String,
    pub found_date: DateTime<Utc>,
    /// Enrichment provenance, scoring card, review decision.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Lead {
    /// Freeze a listing into a new, unscored lead.
    ///
    /// Owner details some providers put on the listing (`owner_name`,
    /// `owner_phone`, `owner_contact`, `owner_email`) are lifted onto the lead.
    pub fn from_listing(listing: RawListing) -> Self {
        let owner_name = listing.extra_str("owner_name");
        let owner_phone = listing
            .extra_str("owner_phone")
            .or_else(|| listing.extra_str("owner_contact"));
        let owner_email = listing.extra_str("owner_email");
        Self {
            id: LeadId::new(),
            property: listing,
            owner_name,
            owner_phone,
            owner_email,
            mailing_address: None,
            equity_estimate: None,
            score: None,
            status: LeadStatus::New,
            human_reviewed: false,
            human_approved: false,
            notes: String::new(),
            found_date: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Score used for ranking; unscored leads sort as 0.
    pub fn score_or_zero(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    /// Set the score, clamped into `[0, 100]`. NaN becomes 0.
    pub fn set_score(&mut self, score: f64) {
        self.score = Some(clamp_score(score));
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    /// Move the lead forward in its lifecycle.
    pub fn transition(&mut self, next: LeadStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(LeadGenError::validation(format!(
                "lead {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn has_phone(&self) -> bool {
        self.owner_phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn has_email(&self) -> bool {
        self.owner_email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// At least one direct contact channel is known.
    pub fn has_contact(&self) -> bool {
        self.has_phone() || self.has_email()
    }
}

fn deserialize_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(clamp_score))
}

/// Clamp into `[0, 100]`, mapping NaN to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

// ---------------------------------------------------------------------------
// Workflow state
// ---------------------------------------------------------------------------

/// The fixed sequence of pipeline steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    Intent,
    Search,
    Filter,
    Enrich,
    Score,
    HumanGate,
    Export,
    Done,
}

impl WorkflowStep {
    /// Every step in execution order.
    pub const ALL: [WorkflowStep; 8] = [
        Self::Intent,
        Self::Search,
        Self::Filter,
        Self::Enrich,
        Self::Score,
        Self::HumanGate,
        Self::Export,
        Self::Done,
    ];

    /// The single outgoing edge of this step. `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Intent => Self::Search,
            Self::Search => Self::Filter,
            Self::Filter => Self::Enrich,
            Self::Enrich => Self::Score,
            Self::Score => Self::HumanGate,
            Self::HumanGate => Self::Export,
            Self::Export | Self::Done => Self::Done,
        }
    }

    /// Human-readable stage name used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Intent => "Intent",
            Self::Search => "Search",
            Self::Filter => "Filter",
            Self::Enrich => "Enrichment",
            Self::Score => "Scoring",
            Self::HumanGate => "Human review",
            Self::Export => "Export",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the pipeline knows about one run. Owned by value and passed
/// from stage to stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub query: String,
    pub criteria: Option<Criteria>,
    pub raw_listings: Vec<RawListing>,
    pub filtered_listings: Vec<RawListing>,
    pub enriched_leads: Vec<Lead>,
    pub scored_leads: Vec<Lead>,
    /// The approved subset; the only collection later stages read.
    pub human_reviewed_leads: Vec<Lead>,
    pub final_leads: Vec<Lead>,
    /// Append-only list of stage-level failures.
    pub errors: Vec<String>,
    pub current_step: WorkflowStep,
    /// Primary export artifact, when one was written.
    pub output_ref: Option<String>,
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Append `"<Stage> stage error: <detail>"` to the error list.
    pub fn record_error(&mut self, step: WorkflowStep, detail: impl fmt::Display) {
        self.errors.push(format!("{} stage error: {detail}", step.label()));
    }

    pub fn is_done(&self) -> bool {
        self.current_step == WorkflowStep::Done
    }
}
