//! Artifact renderers. Pure functions from leads (and run state) to text.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde_json::json;

use leadgen_shared::{Lead, LeadGenError, Result, WorkflowState};

/// CSV column order.
pub const CSV_HEADERS: [&str; 24] = [
    "Lead ID",
    "Score",
    "Address",
    "City",
    "State",
    "ZIP Code",
    "Property Type",
    "Price",
    "Bedrooms",
    "Bathrooms",
    "Square Feet",
    "Year Built",
    "Owner Name",
    "Owner Phone",
    "Owner Email",
    "Mailing Address",
    "Motivation Indicators",
    "Estimated Equity",
    "Source",
    "Status",
    "Human Reviewed",
    "Human Approved",
    "Found Date",
    "Notes",
];

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_row(lead: &Lead) -> [String; 24] {
    let p = &lead.property;
    [
        lead.id.to_string(),
        format!("{:.1}", lead.score_or_zero()),
        p.address.clone(),
        p.city.clone(),
        p.state.clone(),
        p.zip_code.clone(),
        p.property_type.clone(),
        opt(p.price),
        opt(p.bedrooms),
        opt(p.bathrooms),
        opt(p.square_feet),
        opt(p.year_built),
        opt(lead.owner_name.as_deref()),
        opt(lead.owner_phone.as_deref()),
        opt(lead.owner_email.as_deref()),
        opt(lead.mailing_address.as_deref()),
        p.motivation_signals.join(", "),
        opt(lead.equity_estimate),
        p.source.clone(),
        lead.status().as_str().to_string(),
        lead.human_reviewed.to_string(),
        lead.human_approved.to_string(),
        lead.found_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        lead.notes.clone(),
    ]
}

/// One header row plus one row per lead.
pub fn render_csv(leads: &[Lead]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_HEADERS)
        .map_err(|e| LeadGenError::Export(format!("csv header: {e}")))?;
    for lead in leads {
        writer
            .write_record(csv_row(lead))
            .map_err(|e| LeadGenError::Export(format!("csv row {}: {e}", lead.id)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| LeadGenError::Export(format!("csv flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| LeadGenError::Export(format!("csv encoding: {e}")))
}

/// `{export_timestamp, total_leads, leads}`, pretty-printed.
pub fn render_json(leads: &[Lead], now: DateTime<Utc>) -> Result<String> {
    let doc = json!({
        "export_timestamp": now.to_rfc3339(),
        "total_leads": leads.len(),
        "leads": leads,
    });
    serde_json::to_string_pretty(&doc)
        .map_err(|e| LeadGenError::Export(format!("JSON serialization failed: {e}")))
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// `foreclosure_risk` → `Foreclosure Risk`.
fn title_case(tag: &str) -> String {
    tag.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Motivation tags by frequency (ties alphabetical), at most `limit`.
pub fn top_indicators(leads: &[Lead], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for signal in leads.iter().flat_map(|l| &l.property.motivation_signals) {
        *counts.entry(signal.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Plain-text run report: criteria, result mix, stage counts, top leads,
/// and any recorded stage errors.
pub fn render_report(state: &WorkflowState, leads: &[Lead], now: DateTime<Utc>) -> String {
    let total = leads.len();
    let high = leads.iter().filter(|l| l.score_or_zero() >= 70.0).count();
    let medium = leads
        .iter()
        .filter(|l| (50.0..70.0).contains(&l.score_or_zero()))
        .count();
    let with_phone = leads.iter().filter(|l| l.has_phone()).count();
    let with_email = leads.iter().filter(|l| l.has_email()).count();

    let mut out = String::new();
    // writes to a String cannot fail
    let _ = writeln!(out, "REAL ESTATE LEAD GENERATION REPORT");
    let _ = writeln!(out, "Generated: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out);
    let _ = writeln!(out, "SEARCH QUERY: {}", state.query);
    let _ = writeln!(out);
    let _ = writeln!(out, "SEARCH CRITERIA:");
    match &state.criteria {
        Some(c) => {
            let bound = |v: Option<f64>, none: &str| v.map_or_else(|| none.to_string(), |v| format!("${v:.0}"));
            let _ = writeln!(out, "- Location: {}", c.location);
            let _ = writeln!(out, "- Property Types: {}", c.property_types.join(", "));
            let _ = writeln!(out, "- Lead Type: {}", c.lead_type);
            let _ = writeln!(
                out,
                "- Price Range: {} - {}",
                bound(c.price_min, "No min"),
                bound(c.price_max, "No max")
            );
            if !c.motivation_signals.is_empty() {
                let _ = writeln!(out, "- Motivation: {}", c.motivation_signals.join(", "));
            }
        }
        None => {
            let _ = writeln!(out, "- N/A");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "RESULTS SUMMARY:");
    let _ = writeln!(out, "- Total Leads Found: {total}");
    let _ = writeln!(out, "- High Quality (70+ score): {high} ({:.1}%)", pct(high, total));
    let _ = writeln!(out, "- Medium Quality (50-69 score): {medium} ({:.1}%)", pct(medium, total));
    let _ = writeln!(out, "- Leads with Phone: {with_phone} ({:.1}%)", pct(with_phone, total));
    let _ = writeln!(out, "- Leads with Email: {with_email} ({:.1}%)", pct(with_email, total));

    let _ = writeln!(out);
    let _ = writeln!(out, "TOP MOTIVATION INDICATORS:");
    for (tag, count) in top_indicators(leads, 5) {
        let _ = writeln!(out, "- {}: {count} leads ({:.1}%)", title_case(&tag), pct(count, total));
    }

    let location = state
        .metadata
        .get("intent_analysis")
        .and_then(|v| v.get("extracted_location"))
        .and_then(|v| v.as_str())
        .unwrap_or("Completed");
    let _ = writeln!(out);
    let _ = writeln!(out, "WORKFLOW STEPS:");
    let _ = writeln!(out, "1. Intent Analysis: {location}");
    let _ = writeln!(out, "2. Property Search: {} raw listings found", state.raw_listings.len());
    let _ = writeln!(out, "3. Filtering: {} listings after filtering", state.filtered_listings.len());
    let _ = writeln!(out, "4. Enrichment: {} leads enriched", state.enriched_leads.len());
    let _ = writeln!(out, "5. Scoring: {} leads scored", state.scored_leads.len());
    let _ = writeln!(out, "6. Human Review: {} leads approved", state.human_reviewed_leads.len());
    let _ = writeln!(out, "7. Export: {total} leads exported");

    let _ = writeln!(out);
    let _ = writeln!(out, "TOP 5 LEADS BY SCORE:");
    let mut ranked: Vec<&Lead> = leads.iter().collect();
    ranked.sort_by(|a, b| b.score_or_zero().total_cmp(&a.score_or_zero()));
    for (i, lead) in ranked.into_iter().take(5).enumerate() {
        let _ = writeln!(
            out,
            "{}. {}, {} - Score: {:.1}",
            i + 1,
            lead.property.address,
            lead.property.city,
            lead.score_or_zero()
        );
        if let Some(phone) = lead.owner_phone.as_deref().filter(|p| !p.trim().is_empty()) {
            let _ = writeln!(out, "   Phone: {phone}");
        }
        if !lead.property.motivation_signals.is_empty() {
            let _ = writeln!(out, "   Motivation: {}", lead.property.motivation_signals.join(", "));
        }
        let _ = writeln!(out);
    }

    if !state.errors.is_empty() {
        let _ = writeln!(out, "ERRORS ENCOUNTERED:");
        for error in &state.errors {
            let _ = writeln!(out, "- {error}");
        }
    }
    out
}
