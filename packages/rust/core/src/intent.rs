//! Free-form query → [`Criteria`].
//!
//! [`LlmIntentExtractor`] asks the model for a JSON criteria object;
//! [`RuleBasedExtractor`] reads prices, locations, and keywords with regexes
//! and needs no network.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use leadgen_llm::{OpenRouterClient, strip_code_fence};
use leadgen_shared::{Criteria, DEFAULT_PROPERTY_TYPES, LeadGenError, LeadType, Result};

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, query: &str) -> Result<Criteria>;
}

// ---------------------------------------------------------------------------
// LLM extractor
// ---------------------------------------------------------------------------

const INTENT_SYSTEM_PROMPT: &str = "You are a real estate lead generation specialist. \
Extract structured search criteria from the user's request and reply with one JSON object only.";

#[derive(Debug, Deserialize)]
struct ExtractedCriteria {
    #[serde(default)]
    location: String,
    #[serde(default)]
    property_types: Vec<String>,
    #[serde(default)]
    price_min: Option<f64>,
    #[serde(default)]
    price_max: Option<f64>,
    #[serde(default)]
    lead_type: Option<String>,
    #[serde(default)]
    motivation_signals: Vec<String>,
}

pub struct LlmIntentExtractor {
    client: OpenRouterClient,
}

impl LlmIntentExtractor {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }

    fn prompt(query: &str) -> String {
        format!(
            "Key indicators to look for:
- Location: city, state, ZIP codes, neighborhoods
- Property types: single-family, duplex, triplex, townhouse, condo, multi-family, commercial
- Price ranges: under $X, between $X-$Y, over $X
- Lead type: buyer, seller, or investor
- Motivation signals: financial_distress, foreclosure, divorce_sale, estate_sale, vacant_property, high_equity, motivated_seller, price_reduction, quick_sale_needed

User query: {query}

Reply with JSON of this shape (use null for unknown prices, [] for none):
{{\"location\": \"City, ST\", \"property_types\": [\"duplex\"], \"price_min\": null, \"price_max\": 500000, \"lead_type\": \"seller\", \"motivation_signals\": []}}"
        )
    }
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(&self, query: &str) -> Result<Criteria> {
        let completion = self
            .client
            .complete(INTENT_SYSTEM_PROMPT, &Self::prompt(query), 0.1)
            .await
            .map_err(|e| LeadGenError::Intent(e.to_string()))?;
        criteria_from_json(&completion.text)
    }
}

/// Parse a model reply into validated criteria.
pub fn criteria_from_json(text: &str) -> Result<Criteria> {
    let raw: ExtractedCriteria = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| LeadGenError::Intent(format!("unparseable criteria: {e}")))?;

    if raw.location.trim().is_empty() {
        return Err(LeadGenError::Intent("no location in extracted criteria".into()));
    }
    let lead_type = match raw.lead_type.as_deref() {
        Some(s) if !s.trim().is_empty() => s.parse::<LeadType>()?,
        _ => LeadType::default(),
    };

    let mut criteria = Criteria::new(raw.location.trim())
        .with_lead_type(lead_type)
        .with_motivation_signals(raw.motivation_signals)
        .with_price_range(raw.price_min, raw.price_max)?;
    if !raw.property_types.is_empty() {
        criteria = criteria.with_property_types(raw.property_types);
    }
    Ok(criteria)
}

// ---------------------------------------------------------------------------
// Rule-based extractor
// ---------------------------------------------------------------------------

/// A dollar amount: `450000`, `$450,000`, `450k`, `1.2m`. Three groups:
/// currency sign, digits, suffix.
const AMOUNT: &str = r"(\$)?(\d[\d,]*(?:\.\d+)?)\s*([km])?\b";

/// Bare numbers below this are counts or years, not prices.
const MIN_BARE_PRICE: f64 = 10_000.0;

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"between\s+{AMOUNT}\s+and\s+{AMOUNT}")).expect("valid regex")
});
static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{AMOUNT}\s*(?:-|to)\s*{AMOUNT}")).expect("valid regex"));
static UPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:under|below|less than|max(?:imum)?)\s+{AMOUNT}")).expect("valid regex")
});
static LOWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:over|above|more than|min(?:imum)?)\s+{AMOUNT}")).expect("valid regex")
});

static IN_CITY_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:in|near|around)\s+([A-Z][A-Za-z.']*(?:\s+[A-Z][A-Za-z.']*)*,\s*[A-Z]{2})\b")
        .expect("valid regex")
});
static CITY_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z.']*(?:\s+[A-Z][A-Za-z.']*)*,\s*[A-Z]{2})\b").expect("valid regex")
});
static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{5})\b").expect("valid regex"));

/// Keyword → canonical property type.
const PROPERTY_KEYWORDS: &[(&str, &str)] = &[
    ("single-family", "single-family"),
    ("single family", "single-family"),
    (" house", "single-family"),
    ("sfh", "single-family"),
    ("duplex", "duplex"),
    ("triplex", "triplex"),
    ("fourplex", "fourplex"),
    ("townhouse", "townhouse"),
    ("townhome", "townhouse"),
    ("condo", "condo"),
    ("multi-family", "multi-family"),
    ("multifamily", "multi-family"),
    ("apartment", "multi-family"),
    ("commercial", "commercial"),
];

/// Keyword → canonical motivation tag.
const MOTIVATION_KEYWORDS: &[(&str, &str)] = &[
    ("distress", "financial_distress"),
    ("foreclos", "foreclosure"),
    ("divorce", "divorce_sale"),
    ("estate sale", "estate_sale"),
    ("probate", "estate_sale"),
    ("inherit", "estate_sale"),
    ("vacant", "vacant_property"),
    ("equity", "high_equity"),
    ("motivated", "motivated_seller"),
    ("price reduc", "price_reduction"),
    ("price drop", "price_reduction"),
    ("quick sale", "quick_sale_needed"),
    ("must sell", "quick_sale_needed"),
];

const INVESTOR_KEYWORDS: &[&str] = &["investor", "investment", "flip", "rental", "cash flow"];
const BUYER_KEYWORDS: &[&str] = &["buyer", "buying", "first-time", "first time"];

/// Deterministic extractor for offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IntentExtractor for RuleBasedExtractor {
    fn name(&self) -> &str {
        "rules"
    }

    async fn extract(&self, query: &str) -> Result<Criteria> {
        let location = extract_location(query).ok_or_else(|| {
            LeadGenError::Intent(format!("could not find a location in {query:?}"))
        })?;
        let lowered = query.to_lowercase();
        let (min, max) = extract_price_range(&lowered);

        let mut criteria = Criteria::new(location)
            .with_lead_type(extract_lead_type(&lowered))
            .with_motivation_signals(keyword_tags(&lowered, MOTIVATION_KEYWORDS))
            .with_price_range(min, max)?;
        let types = keyword_tags(&lowered, PROPERTY_KEYWORDS);
        if !types.is_empty() {
            criteria = criteria.with_property_types(types);
        }
        debug!(?criteria, "rule-based criteria");
        Ok(criteria)
    }
}

fn parse_amount(digits: &str, suffix: Option<&str>) -> Option<f64> {
    let value: f64 = digits.replace(',', "").parse().ok()?;
    Some(match suffix {
        Some("k") => value * 1_000.0,
        Some("m") => value * 1_000_000.0,
        _ => value,
    })
}

/// One parsed amount and whether it is written like money.
#[derive(Debug, Clone, Copy)]
struct Amount {
    value: f64,
    priced: bool,
}

fn amount_at(caps: &regex::Captures<'_>, first_group: usize) -> Option<Amount> {
    let digits = caps.get(first_group + 1)?.as_str();
    let suffix = caps.get(first_group + 2).map(|m| m.as_str());
    let value = parse_amount(digits, suffix)?;
    let priced = caps.get(first_group).is_some() || suffix.is_some() || value >= MIN_BARE_PRICE;
    Some(Amount { value, priced })
}

/// First match of `re` whose amounts read as a price. `3-4 bedrooms` or
/// `built 1990-2005` are passed over.
fn first_priced<const N: usize>(re: &Regex, lowered: &str) -> Option<[f64; N]> {
    re.captures_iter(lowered).find_map(|caps| {
        let mut values = [0.0; N];
        let mut priced = false;
        for (i, slot) in values.iter_mut().enumerate() {
            let amount = amount_at(&caps, 1 + i * 3)?;
            *slot = amount.value;
            priced |= amount.priced;
        }
        priced.then_some(values)
    })
}

/// `(min, max)` from a lower-cased query. Ranges win over single bounds.
pub fn extract_price_range(lowered: &str) -> (Option<f64>, Option<f64>) {
    for re in [&*BETWEEN_RE, &*RANGE_RE] {
        if let Some([a, b]) = first_priced::<2>(re, lowered) {
            return (Some(a.min(b)), Some(a.max(b)));
        }
    }
    let max = first_priced::<1>(&UPPER_RE, lowered).map(|[v]| v);
    let min = first_priced::<1>(&LOWER_RE, lowered).map(|[v]| v);
    (min, max)
}

/// `"City, ST"` (preferring one introduced by "in"), else a ZIP code.
pub fn extract_location(query: &str) -> Option<String> {
    IN_CITY_STATE_RE
        .captures(query)
        .or_else(|| CITY_STATE_RE.captures(query))
        .and_then(|c| c.get(1))
        .or_else(|| ZIP_RE.captures(query).and_then(|c| c.get(1)))
        .map(|m| m.as_str().trim().to_string())
}

fn extract_lead_type(lowered: &str) -> LeadType {
    if INVESTOR_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        LeadType::Investor
    } else if BUYER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        LeadType::Buyer
    } else {
        LeadType::Seller
    }
}

fn keyword_tags(lowered: &str, table: &[(&str, &str)]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for (keyword, tag) in table {
        if lowered.contains(keyword) && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_patterns() {
        assert_eq!(extract_price_range("duplexes under $500,000"), (None, Some(500_000.0)));
        assert_eq!(extract_price_range("homes below 350k"), (None, Some(350_000.0)));
        assert_eq!(extract_price_range("anything over $1.2m"), (Some(1_200_000.0), None));
        assert_eq!(
            extract_price_range("between 200k and 400k"),
            (Some(200_000.0), Some(400_000.0))
        );
        assert_eq!(
            extract_price_range("$250,000 - $300,000"),
            (Some(250_000.0), Some(300_000.0))
        );
        assert_eq!(extract_price_range("no budget given"), (None, None));
    }

    #[test]
    fn counts_and_years_are_not_prices() {
        assert_eq!(
            extract_price_range("3-4 bedroom duplexes in phoenix, az under $500k"),
            (None, Some(500_000.0))
        );
        assert_eq!(
            extract_price_range("houses built 1990-2005 in mesa, az under 400k"),
            (None, Some(400_000.0))
        );
        assert_eq!(extract_price_range("over 2 baths, 150000 to 250000"), (Some(150_000.0), Some(250_000.0)));
        assert_eq!(extract_price_range("more than 3 bedrooms"), (None, None));
    }

    #[test]
    fn location_patterns() {
        assert_eq!(
            extract_location("Find motivated sellers in Phoenix, AZ").as_deref(),
            Some("Phoenix, AZ")
        );
        assert_eq!(
            extract_location("Investor leads near San Antonio, TX under 300k").as_deref(),
            Some("San Antonio, TX")
        );
        assert_eq!(extract_location("homes around 85018").as_deref(), Some("85018"));
        assert_eq!(extract_location("somewhere sunny"), None);
    }

    #[tokio::test]
    async fn rule_based_extracts_full_criteria() {
        let criteria = RuleBasedExtractor::new()
            .extract("Find investor duplex leads in Phoenix, AZ under $500,000 with high equity")
            .await
            .unwrap();
        assert_eq!(criteria.location, "Phoenix, AZ");
        assert_eq!(criteria.property_types, vec!["duplex"]);
        assert_eq!(criteria.price_max, Some(500_000.0));
        assert_eq!(criteria.lead_type, LeadType::Investor);
        assert_eq!(criteria.motivation_signals, vec!["high_equity"]);
    }

    #[tokio::test]
    async fn rule_based_defaults() {
        let criteria = RuleBasedExtractor::new()
            .extract("leads in Austin, TX")
            .await
            .unwrap();
        assert_eq!(criteria.property_types, DEFAULT_PROPERTY_TYPES);
        assert_eq!(criteria.lead_type, LeadType::Seller);
        assert!(criteria.motivation_signals.is_empty());
    }

    #[tokio::test]
    async fn rule_based_without_location_fails() {
        let err = RuleBasedExtractor::new().extract("cheap houses").await.unwrap_err();
        assert!(matches!(err, LeadGenError::Intent(_)));
    }

    #[test]
    fn json_criteria_with_fence_and_nulls() {
        let text = "```json\n{\"location\": \"Dallas, TX\", \"property_types\": [], \"price_min\": null, \"price_max\": 400000, \"lead_type\": \"buyer\", \"motivation_signals\": [\"vacant_property\"]}\n```";
        let criteria = criteria_from_json(text).unwrap();
        assert_eq!(criteria.location, "Dallas, TX");
        assert_eq!(criteria.property_types, DEFAULT_PROPERTY_TYPES);
        assert_eq!(criteria.price_max, Some(400_000.0));
        assert_eq!(criteria.lead_type, LeadType::Buyer);
    }

    #[tokio::test]
    async fn llm_extractor_reads_model_reply() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"location\": \"Mesa, AZ\", \"lead_type\": \"investor\", \"property_types\": [\"duplex\", \"triplex\"]}"}}]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(server.uri(), "k", "m", 5).unwrap();
        let criteria = LlmIntentExtractor::new(client)
            .extract("duplex or triplex investments in Mesa")
            .await
            .unwrap();
        assert_eq!(criteria.location, "Mesa, AZ");
        assert_eq!(criteria.lead_type, LeadType::Investor);
        assert_eq!(criteria.property_types, vec!["duplex", "triplex"]);
    }

    #[tokio::test]
    async fn llm_transport_failure_is_intent_error() {
        let client = OpenRouterClient::new("http://127.0.0.1:9", "k", "m", 1).unwrap();
        let err = LlmIntentExtractor::new(client).extract("x").await.unwrap_err();
        assert!(matches!(err, LeadGenError::Intent(_)));
    }

    #[test]
    fn json_criteria_rejects_inverted_range_and_missing_location() {
        assert!(criteria_from_json(r#"{"location": "X, TX", "price_min": 9, "price_max": 1}"#).is_err());
        assert!(criteria_from_json(r#"{"property_types": ["duplex"]}"#).is_err());
        assert!(criteria_from_json("not json").is_err());
    }
}
