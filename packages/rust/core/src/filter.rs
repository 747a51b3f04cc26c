//! Ordered filter cascade over raw listings, followed by quality ranking.
//!
//! Stages run in a fixed order and each returns a subset of its input; the
//! motivation stage is the only one allowed to re-admit records it just
//! removed. Every stage reports what it did so an empty result can be
//! explained.

use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use leadgen_shared::{AgeCategory, Criteria, LeadType, RawListing, is_high_value_signal};

/// Oldest `year_built` considered plausible.
const MIN_YEAR_BUILT: i32 = 1900;

// ---------------------------------------------------------------------------
// Stages and diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Location,
    Price,
    PropertyType,
    Size,
    Age,
    Motivation,
    Quality,
}

impl FilterStage {
    /// Every stage in execution order.
    pub const ALL: [FilterStage; 7] = [
        Self::Location,
        Self::Price,
        Self::PropertyType,
        Self::Size,
        Self::Age,
        Self::Motivation,
        Self::Quality,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Price => "price",
            Self::PropertyType => "property_type",
            Self::Size => "size",
            Self::Age => "age",
            Self::Motivation => "motivation",
            Self::Quality => "quality",
        }
    }
}

/// What a stage did. `Skipped` is distinct from "applied, removed nothing".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Applied {
        before: usize,
        after: usize,
        removed: usize,
        /// Records brought back by relaxation (motivation only).
        readmitted: usize,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: FilterStage,
    #[serde(flatten)]
    pub status: StageStatus,
}

impl StageReport {
    fn skipped(stage: FilterStage, reason: &str) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped {
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Survivors with `quality_score` set, best first.
    pub listings: Vec<RawListing>,
    pub reports: Vec<StageReport>,
}

impl FilterOutcome {
    pub fn report(&self, stage: FilterStage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
    current_year: i32,
}

impl FilterChain {
    /// All stages, aged against the current calendar year.
    pub fn new() -> Self {
        Self {
            stages: FilterStage::ALL.to_vec(),
            current_year: Utc::now().year(),
        }
    }

    /// Pin the year used by the age stage.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    /// Run only `stages`, in the given order.
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = FilterStage>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    /// Filter, score, and rank `listings`.
    ///
    /// Without criteria the criteria-dependent stages are skipped; age and
    /// quality still apply.
    #[instrument(skip_all, fields(input = listings.len()))]
    pub fn run(&self, listings: Vec<RawListing>, criteria: Option<&Criteria>) -> FilterOutcome {
        let mut current = listings;
        let mut reports = Vec::with_capacity(self.stages.len());

        for &stage in &self.stages {
            let (next, report) = self.apply(stage, current, criteria);
            debug!(stage = stage.name(), remaining = next.len(), "filter stage done");
            reports.push(report);
            current = next;
        }

        for listing in &mut current {
            listing.quality_score = Some(quality_score(listing));
        }
        // stable: equal scores keep their aggregation order
        current.sort_by(|a, b| b.quality_score.cmp(&a.quality_score));

        info!(output = current.len(), "filter chain complete");
        FilterOutcome {
            listings: current,
            reports,
        }
    }

    fn apply(
        &self,
        stage: FilterStage,
        listings: Vec<RawListing>,
        criteria: Option<&Criteria>,
    ) -> (Vec<RawListing>, StageReport) {
        let before = listings.len();
        let applied = |kept: Vec<RawListing>, readmitted: usize| {
            let report = StageReport {
                stage,
                status: StageStatus::Applied {
                    before,
                    after: kept.len(),
                    removed: before.saturating_sub(kept.len()),
                    readmitted,
                },
            };
            (kept, report)
        };

        match (stage, criteria) {
            (FilterStage::Age, criteria) => {
                let kept = age_filter(listings, criteria, self.current_year);
                applied(kept, 0)
            }
            (FilterStage::Quality, _) => {
                let kept = listings.into_iter().filter(passes_quality).collect();
                applied(kept, 0)
            }
            (_, None) => (listings, StageReport::skipped(stage, "no criteria")),
            (FilterStage::Location, Some(criteria)) => {
                if criteria.location.trim().is_empty() {
                    return (listings, StageReport::skipped(stage, "no location"));
                }
                let kept = match criteria.zip_code() {
                    Some(zip) => listings
                        .into_iter()
                        .filter(|l| l.zip_code.trim() == zip)
                        .collect(),
                    None => {
                        let (city, state) = criteria.city_state();
                        listings
                            .into_iter()
                            .filter(|l| matches_location(l, &city, state.as_deref()))
                            .collect()
                    }
                };
                applied(kept, 0)
            }
            (FilterStage::Price, Some(criteria)) => {
                if criteria.price_min.is_none() && criteria.price_max.is_none() {
                    return (listings, StageReport::skipped(stage, "no price bounds"));
                }
                let kept = listings
                    .into_iter()
                    .filter(|l| within_price(l, criteria.price_min, criteria.price_max))
                    .collect();
                applied(kept, 0)
            }
            (FilterStage::PropertyType, Some(criteria)) => {
                if criteria.property_types.is_empty() {
                    return (listings, StageReport::skipped(stage, "no property types"));
                }
                let wanted: Vec<String> = criteria
                    .property_types
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .collect();
                let kept = listings
                    .into_iter()
                    .filter(|l| matches_property_type(l, &wanted))
                    .collect();
                applied(kept, 0)
            }
            (FilterStage::Size, Some(criteria)) => {
                if criteria.lead_type == LeadType::Seller {
                    return (listings, StageReport::skipped(stage, "no size rule for sellers"));
                }
                let kept = listings
                    .into_iter()
                    .filter(|l| fits_size(l, criteria.lead_type))
                    .collect();
                applied(kept, 0)
            }
            (FilterStage::Motivation, Some(criteria)) => {
                if criteria.motivation_signals.is_empty() {
                    return (listings, StageReport::skipped(stage, "no motivation signals requested"));
                }
                let (kept, readmitted) = motivation_filter(listings, &criteria.motivation_signals);
                applied(kept, readmitted)
            }
        }
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stage predicates
// ---------------------------------------------------------------------------

/// Either string contains the other.
fn overlaps(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

fn matches_location(listing: &RawListing, city: &str, state: Option<&str>) -> bool {
    let listing_city = listing.city.trim().to_lowercase();
    if !overlaps(&listing_city, city) {
        return false;
    }
    match state {
        Some(state) => overlaps(&listing.state.trim().to_lowercase(), state),
        None => true,
    }
}

fn within_price(listing: &RawListing, min: Option<f64>, max: Option<f64>) -> bool {
    let price = listing.price.unwrap_or(0.0);
    min.is_none_or(|min| price >= min) && max.is_none_or(|max| price <= max)
}

fn matches_property_type(listing: &RawListing, wanted: &[String]) -> bool {
    let kind = listing.property_type.trim().to_lowercase();
    wanted.iter().any(|w| overlaps(&kind, w))
}

fn fits_size(listing: &RawListing, lead_type: LeadType) -> bool {
    let bedrooms = listing.bedrooms.unwrap_or(0);
    let square_feet = listing.square_feet.unwrap_or(0);
    match lead_type {
        LeadType::Investor => bedrooms >= 2 && square_feet >= 800,
        LeadType::Buyer => bedrooms <= 5 && square_feet <= 4000,
        LeadType::Seller => true,
    }
}

fn age_filter(
    listings: Vec<RawListing>,
    criteria: Option<&Criteria>,
    current_year: i32,
) -> Vec<RawListing> {
    let tag_age = criteria.is_some_and(|c| c.lead_type == LeadType::Investor);
    listings
        .into_iter()
        .filter_map(|mut listing| {
            // an unknown build year counts as new construction
            let year = listing.year_built.unwrap_or(current_year);
            if !(MIN_YEAR_BUILT..=current_year).contains(&year) {
                return None;
            }
            if tag_age {
                listing.age_category = Some(match current_year - year {
                    age if age > 50 => AgeCategory::Vintage,
                    age if age > 20 => AgeCategory::Mature,
                    _ => AgeCategory::Modern,
                });
            }
            Some(listing)
        })
        .collect()
}

/// Lenient motivation pass with one relaxation step.
///
/// Returns the survivors and how many were re-admitted by relaxation.
fn motivation_filter(listings: Vec<RawListing>, wanted: &[String]) -> (Vec<RawListing>, usize) {
    let has_signals = |l: &RawListing| !l.motivation_signals.is_empty();
    let matches_wanted = |l: &RawListing| {
        l.motivation_signals
            .iter()
            .any(|s| wanted.iter().any(|w| w.trim().eq_ignore_ascii_case(s.trim())))
    };

    let kept: Vec<RawListing> = listings
        .iter()
        .filter(|l| matches_wanted(l) || has_signals(l))
        .cloned()
        .collect();
    if !kept.is_empty() || listings.is_empty() {
        return (kept, 0);
    }

    let readmitted: Vec<RawListing> = listings.into_iter().filter(|l| has_signals(l)).collect();
    debug!(readmitted = readmitted.len(), "motivation filter relaxed");
    let count = readmitted.len();
    (readmitted, count)
}

fn passes_quality(listing: &RawListing) -> bool {
    !listing.address.trim().is_empty()
        && !listing.property_type.trim().is_empty()
        && listing.price.is_some_and(|p| p > 0.0)
}

// ---------------------------------------------------------------------------
// Quality score
// ---------------------------------------------------------------------------

/// Completeness + motivation + source + market-time score, capped at 100.
pub fn quality_score(listing: &RawListing) -> u32 {
    let mut score = 0u32;

    if listing.price.is_some_and(|p| p > 0.0) {
        score += 10;
    }
    if listing.bedrooms.is_some_and(|b| b > 0) {
        score += 5;
    }
    if listing.bathrooms.is_some_and(|b| b > 0.0) {
        score += 5;
    }
    if listing.square_feet.is_some_and(|s| s > 0) {
        score += 10;
    }

    for signal in &listing.motivation_signals {
        score += if is_high_value_signal(signal) { 10 } else { 5 };
    }

    score += match listing.source.trim().to_lowercase().as_str() {
        "mls" => 20,
        "fsbo" => 15,
        "zillow" => 10,
        _ => 5,
    };

    score += match listing.days_on_market.unwrap_or(0) {
        d if d > 90 => 10,
        d if d > 30 => 7,
        d if d > 7 => 4,
        _ => 1,
    };

    score.min(100)
}
