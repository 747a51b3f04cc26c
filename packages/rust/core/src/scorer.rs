//! Lead scoring with a generative primary scorer and a deterministic fallback.
//!
//! Every lead gets a score in `[0, 100]`:
//! 1. the primary scorer's JSON score card, when it parses and carries a
//!    numeric `overall_score`
//! 2. otherwise a score salvaged from free text (`score ... 72`)
//! 3. otherwise the completeness/motivation/source heuristic
//!
//! Scoring failures are logged per lead and never abort the batch.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use leadgen_llm::{OpenRouterClient, strip_code_fence};
use leadgen_shared::{Lead, LeadGenError, LeadType, Result, clamp_score, is_high_value_signal};

/// Score at or above which a lead counts as high quality.
pub const HIGH_QUALITY_SCORE: f64 = 70.0;

/// Score at or above which a lead counts as medium quality.
pub const MEDIUM_QUALITY_SCORE: f64 = 50.0;

const SYSTEM_PROMPT: &str =
    "You are a real estate lead scoring expert. Reply with a single JSON object and nothing else.";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Facts handed to the primary scorer for one lead.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest {
    pub address: String,
    pub property_type: String,
    pub price: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<u32>,
    pub year_built: Option<i32>,
    pub source: String,
    pub owner_name: Option<String>,
    pub has_phone: bool,
    pub has_email: bool,
    pub mailing_address: Option<String>,
    pub motivation_signals: Vec<String>,
    pub days_on_market: Option<u32>,
    pub equity_estimate: Option<f64>,
    pub lead_type: LeadType,
}

impl ScoreRequest {
    pub fn new(lead: &Lead, lead_type: LeadType) -> Self {
        let p = &lead.property;
        Self {
            address: p.display_address(),
            property_type: p.property_type.clone(),
            price: p.price,
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            square_feet: p.square_feet,
            year_built: p.year_built,
            source: p.source.clone(),
            owner_name: lead.owner_name.clone(),
            has_phone: lead.has_phone(),
            has_email: lead.has_email(),
            mailing_address: lead.mailing_address.clone(),
            motivation_signals: p.motivation_signals.clone(),
            days_on_market: p.days_on_market,
            equity_estimate: lead.equity_estimate,
            lead_type,
        }
    }

    /// Render the user prompt.
    pub fn prompt(&self) -> String {
        fn or_unknown<T: ToString>(v: Option<T>) -> String {
            v.map_or_else(|| "Unknown".to_string(), |v| v.to_string())
        }
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        let signals = if self.motivation_signals.is_empty() {
            "None identified".to_string()
        } else {
            self.motivation_signals.join(", ")
        };

        format!(
            "Analyze the following property and owner information to determine lead quality.

Property Information:
- Address: {address}
- Price: ${price:.0}
- Property Type: {property_type}
- Bedrooms: {bedrooms}
- Bathrooms: {bathrooms}
- Square Feet: {square_feet}
- Year Built: {year_built}
- Source: {source}

Owner Information:
- Owner Name: {owner_name}
- Phone Available: {has_phone}
- Email Available: {has_email}
- Mailing Address: {mailing_address}

Motivation Indicators:
{signals}

Market Context:
- Days on Market: {days_on_market}
- Estimated Equity: ${equity:.0}

Lead Type Target: {lead_type}

Score this lead from 0-100 based on:
1. Contact Availability (25 points): phone/email accessibility
2. Motivation Level (30 points): signs of seller motivation
3. Deal Potential (25 points): price, equity, property condition indicators
4. Lead Type Match (20 points): how well this matches the target lead type

Return your analysis in this JSON format:
{{
  \"overall_score\": 85,
  \"contact_score\": 20,
  \"motivation_score\": 25,
  \"deal_potential_score\": 22,
  \"lead_type_match_score\": 18,
  \"key_strengths\": [\"...\"],
  \"key_concerns\": [\"...\"],
  \"recommended_approach\": \"...\",
  \"priority_level\": \"high|medium|low\"
}}",
            address = self.address,
            price = self.price.unwrap_or(0.0),
            property_type = self.property_type,
            bedrooms = or_unknown(self.bedrooms),
            bathrooms = or_unknown(self.bathrooms),
            square_feet = or_unknown(self.square_feet),
            year_built = or_unknown(self.year_built),
            source = self.source,
            owner_name = self.owner_name.as_deref().unwrap_or("Unknown"),
            has_phone = yes_no(self.has_phone),
            has_email = yes_no(self.has_email),
            mailing_address = self.mailing_address.as_deref().unwrap_or("Same as property"),
            days_on_market = or_unknown(self.days_on_market),
            equity = self.equity_estimate.unwrap_or(0.0),
            lead_type = self.lead_type,
        )
    }
}

/// Structured verdict from the primary scorer (or synthesized from text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub overall_score: f64,
    #[serde(default)]
    pub contact_score: Option<f64>,
    #[serde(default)]
    pub motivation_score: Option<f64>,
    #[serde(default)]
    pub deal_potential_score: Option<f64>,
    #[serde(default)]
    pub lead_type_match_score: Option<f64>,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub key_concerns: Vec<String>,
    #[serde(default)]
    pub recommended_approach: Option<String>,
    #[serde(default)]
    pub priority_level: Option<String>,
}

/// Which path produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Primary,
    TextExtraction,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Always within `[0, 100]`.
    pub score: f64,
    pub method: ScoringMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<ScoreCard>,
    /// Why the primary path was not used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl ScoreResult {
    fn heuristic(lead: &Lead, reason: impl Into<String>) -> Self {
        Self {
            score: heuristic_score(lead),
            method: ScoringMethod::Heuristic,
            card: None,
            fallback_reason: Some(reason.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Primary scorer
// ---------------------------------------------------------------------------

/// The generative scorer. Returns raw response text; interpretation happens
/// in [`interpret_response`].
#[async_trait]
pub trait PrimaryScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, request: &ScoreRequest) -> Result<String>;
}

/// OpenRouter-backed primary scorer.
pub struct LlmScorer {
    client: OpenRouterClient,
    temperature: f32,
}

impl LlmScorer {
    pub fn new(client: OpenRouterClient, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }
}

#[async_trait]
impl PrimaryScorer for LlmScorer {
    fn name(&self) -> &str {
        self.client.model()
    }

    async fn score(&self, request: &ScoreRequest) -> Result<String> {
        let completion = self
            .client
            .complete(SYSTEM_PROMPT, &request.prompt(), self.temperature)
            .await
            .map_err(|e| LeadGenError::Scoring(e.to_string()))?;
        Ok(completion.text)
    }
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

/// `score`/`rating` followed by the first integer.
static SCORE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:score|rating).*?(\d+)").expect("valid regex"));

/// Turn primary scorer text into a score, falling back as needed.
pub fn interpret_response(text: &str, lead: &Lead) -> ScoreResult {
    let body = strip_code_fence(text);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match parse_card(value) {
            Ok(card) => ScoreResult {
                score: clamp_score(card.overall_score),
                method: ScoringMethod::Primary,
                card: Some(card),
                fallback_reason: None,
            },
            Err(e) => ScoreResult::heuristic(lead, e.to_string()),
        },
        Err(_) => salvage_from_text(text, lead),
    }
}

fn parse_card(value: Value) -> Result<ScoreCard> {
    let overall = value.get("overall_score");
    if !overall.is_some_and(Value::is_number) {
        return Err(LeadGenError::Scoring(
            "overall_score missing or not a number".into(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| LeadGenError::Scoring(format!("malformed score card: {e}")))
}

fn salvage_from_text(text: &str, lead: &Lead) -> ScoreResult {
    let lowered = text.to_lowercase();
    let token = SCORE_TOKEN_RE
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    let Some(raw) = token else {
        return ScoreResult::heuristic(lead, "response had no JSON and no score token");
    };

    let overall = clamp_score(raw);
    let card = ScoreCard {
        overall_score: overall,
        contact_score: Some(if lead.has_contact() { 15.0 } else { 5.0 }),
        motivation_score: Some(lead.property.motivation_signals.len() as f64 * 5.0),
        deal_potential_score: Some(15.0),
        lead_type_match_score: Some(15.0),
        key_strengths: Vec::new(),
        key_concerns: Vec::new(),
        recommended_approach: None,
        priority_level: Some(if overall >= MEDIUM_QUALITY_SCORE { "medium" } else { "low" }.into()),
    };
    ScoreResult {
        score: overall,
        method: ScoringMethod::TextExtraction,
        card: Some(card),
        fallback_reason: Some("response was not JSON".into()),
    }
}

// ---------------------------------------------------------------------------
// Heuristic
// ---------------------------------------------------------------------------

/// Deterministic fallback score from contact, motivation, completeness, and
/// source. Capped at 100.
pub fn heuristic_score(lead: &Lead) -> f64 {
    let p = &lead.property;
    let mut score = 0.0;

    if lead.has_phone() {
        score += 20.0;
    }
    if lead.has_email() {
        score += 10.0;
    }

    for signal in &p.motivation_signals {
        score += if is_high_value_signal(signal) { 8.0 } else { 3.0 };
    }

    if p.price.is_some_and(|v| v > 0.0) {
        score += 5.0;
    }
    if p.bedrooms.is_some_and(|v| v > 0) {
        score += 3.0;
    }
    if p.bathrooms.is_some_and(|v| v > 0.0) {
        score += 3.0;
    }
    if p.square_feet.is_some_and(|v| v > 0) {
        score += 5.0;
    }
    if p.year_built.is_some_and(|v| v > 0) {
        score += 4.0;
    }

    score += match p.source.trim().to_lowercase().as_str() {
        "mls" => 20.0,
        "fsbo" => 15.0,
        "zillow" => 12.0,
        "realtor" => 10.0,
        _ => 5.0,
    };

    f64::min(score, 100.0)
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Count of leads per quality bucket after a scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub primary: usize,
    pub text_extraction: usize,
    pub heuristic: usize,
    pub average: f64,
}

pub struct Scorer {
    primary: Option<Box<dyn PrimaryScorer>>,
    pacing: Duration,
}

impl Scorer {
    /// Heuristic only; no primary scorer is ever called.
    pub fn heuristic_only() -> Self {
        Self {
            primary: None,
            pacing: Duration::ZERO,
        }
    }

    pub fn new(primary: Box<dyn PrimaryScorer>) -> Self {
        Self {
            primary: Some(primary),
            pacing: Duration::ZERO,
        }
    }

    /// Pause between consecutive primary calls.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn uses_llm(&self) -> bool {
        self.primary.is_some()
    }

    /// Score one lead. Never fails.
    pub async fn score_lead(&self, lead: &Lead, lead_type: LeadType) -> ScoreResult {
        let Some(primary) = &self.primary else {
            return ScoreResult::heuristic(lead, "primary scorer disabled");
        };

        let request = ScoreRequest::new(lead, lead_type);
        match primary.score(&request).await {
            Ok(text) => {
                let result = interpret_response(&text, lead);
                if let Some(reason) = &result.fallback_reason {
                    warn!(lead = %lead.id, %reason, method = ?result.method, "primary score unusable");
                }
                result
            }
            Err(e) => {
                warn!(lead = %lead.id, scorer = primary.name(), error = %e, "primary scorer failed, using heuristic");
                ScoreResult::heuristic(lead, e.to_string())
            }
        }
    }

    /// Score every lead, record the verdict in its metadata, and rank best
    /// first (stable for ties).
    #[instrument(skip_all, fields(leads = leads.len()))]
    pub async fn score_all(&self, leads: Vec<Lead>, lead_type: LeadType) -> (Vec<Lead>, ScoringSummary) {
        let total = leads.len();
        let mut scored = Vec::with_capacity(total);

        for (i, mut lead) in leads.into_iter().enumerate() {
            if i > 0 && self.primary.is_some() && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            let result = self.score_lead(&lead, lead_type).await;
            debug!(lead = %lead.id, score = result.score, method = ?result.method, "lead scored");
            lead.set_score(result.score);
            if let Ok(value) = serde_json::to_value(&result) {
                lead.metadata.insert("scoring".into(), value);
            }
            lead.metadata.insert(
                "scored_at".into(),
                Value::from(chrono::Utc::now().to_rfc3339()),
            );
            scored.push((lead, result.method));
        }

        let mut summary = ScoringSummary {
            total,
            ..ScoringSummary::default()
        };
        let mut sum = 0.0;
        for (lead, method) in &scored {
            let score = lead.score_or_zero();
            sum += score;
            match score {
                s if s >= HIGH_QUALITY_SCORE => summary.high += 1,
                s if s >= MEDIUM_QUALITY_SCORE => summary.medium += 1,
                _ => summary.low += 1,
            }
            match method {
                ScoringMethod::Primary => summary.primary += 1,
                ScoringMethod::TextExtraction => summary.text_extraction += 1,
                ScoringMethod::Heuristic => summary.heuristic += 1,
            }
        }
        if total > 0 {
            summary.average = sum / total as f64;
        }

        let mut leads: Vec<Lead> = scored.into_iter().map(|(lead, _)| lead).collect();
        rank_by_score(&mut leads);

        info!(
            total,
            high = summary.high,
            medium = summary.medium,
            low = summary.low,
            heuristic = summary.heuristic,
            "scoring complete"
        );
        (leads, summary)
    }
}

/// Sort best first; ties keep their current order.
pub fn rank_by_score(leads: &mut [Lead]) {
    leads.sort_by(|a, b| b.score_or_zero().total_cmp(&a.score_or_zero()));
}
