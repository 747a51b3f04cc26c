//! End-to-end run: query → intent → search → filter → enrich → score →
//! human gate → export → done.
//!
//! Each stage takes the [`WorkflowState`] by value and hands back the next
//! one. A stage that cannot do its job records `"<Stage> stage error: ..."`,
//! leaves its outputs untouched, and the run moves on regardless.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use leadgen_export::LeadExporter;
use leadgen_shared::{
    Lead, LeadGenError, LeadType, PipelineSettings, Result, WorkflowState, WorkflowStep,
};
use leadgen_sources::{ContactSource, ListingSource, SourceRegistry};

use crate::aggregator::search_all;
use crate::enrichment::{EnrichmentOptions, enrich_listings};
use crate::filter::FilterChain;
use crate::intent::IntentExtractor;
use crate::review::{ReviewPolicy, review_leads};
use crate::scorer::Scorer;

/// Result of a full run, shaped for callers outside the process.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    /// The exported (approved) leads.
    pub leads: Vec<Lead>,
    pub total_leads: usize,
    /// Primary export artifact, if one was written.
    pub output_ref: Option<String>,
    /// Stage errors recorded along the way.
    pub errors: Vec<String>,
    pub metadata: Map<String, Value>,
    /// Why the run was refused, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    fn from_state(state: WorkflowState) -> Self {
        Self {
            success: true,
            total_leads: state.final_leads.len(),
            leads: state.final_leads,
            output_ref: state.output_ref,
            errors: state.errors,
            metadata: state.metadata,
            error: None,
        }
    }

    fn refused(error: String) -> Self {
        Self {
            success: false,
            leads: Vec::new(),
            total_leads: 0,
            output_ref: None,
            errors: Vec::new(),
            metadata: Map::new(),
            error: Some(error),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage runs.
    fn stage_started(&self, step: WorkflowStep);
    /// Called after a stage ran, with the state it produced.
    fn stage_finished(&self, step: WorkflowStep, state: &WorkflowState);
    /// Called once the run reached `done`.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _step: WorkflowStep) {}
    fn stage_finished(&self, _step: WorkflowStep, _state: &WorkflowState) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    intent: Box<dyn IntentExtractor>,
    listing_sources: Vec<Box<dyn ListingSource>>,
    contact_sources: Vec<Box<dyn ContactSource>>,
    filter: FilterChain,
    scorer: Scorer,
    review: ReviewPolicy,
    exporter: Option<Box<dyn LeadExporter>>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// A pipeline with the full filter chain, heuristic scoring, the
    /// threshold gate from `settings`, and no exporter.
    pub fn new(intent: Box<dyn IntentExtractor>, sources: SourceRegistry, settings: PipelineSettings) -> Self {
        let (listing_sources, contact_sources) = sources.into_parts();
        Self {
            intent,
            listing_sources,
            contact_sources,
            filter: FilterChain::new(),
            scorer: Scorer::heuristic_only(),
            review: ReviewPolicy::Threshold(settings.review_threshold),
            exporter: None,
            settings,
        }
    }

    pub fn with_filter(mut self, filter: FilterChain) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_review(mut self, review: ReviewPolicy) -> Self {
        self.review = review;
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn LeadExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute exactly one step and move the marker along its single edge.
    /// `Done` is returned unchanged.
    #[instrument(skip_all, fields(step = %state.current_step))]
    pub async fn advance(&self, state: WorkflowState) -> WorkflowState {
        let step = state.current_step;
        let mut state = match step {
            WorkflowStep::Intent => self.intent_stage(state).await,
            WorkflowStep::Search => self.search_stage(state).await,
            WorkflowStep::Filter => self.filter_stage(state),
            WorkflowStep::Enrich => self.enrich_stage(state).await,
            WorkflowStep::Score => self.score_stage(state).await,
            WorkflowStep::HumanGate => self.review_stage(state).await,
            WorkflowStep::Export => self.export_stage(state),
            WorkflowStep::Done => return state,
        };
        state.current_step = step.next();
        state
    }

    /// Drive a query from `intent` to `done`.
    ///
    /// Only an empty query is refused; everything else completes, with
    /// stage failures listed in [`RunOutcome::errors`].
    pub async fn run(&self, query: &str, progress: &dyn ProgressReporter) -> Result<RunOutcome> {
        if query.trim().is_empty() {
            return Err(LeadGenError::validation("query must not be empty"));
        }

        let start = Instant::now();
        info!(query, "starting lead generation run");

        let mut state = WorkflowState::new(query.trim());
        while !state.is_done() {
            let step = state.current_step;
            progress.stage_started(step);
            state = self.advance(state).await;
            progress.stage_finished(step, &state);
        }

        let outcome = RunOutcome::from_state(state);
        info!(
            leads = outcome.total_leads,
            errors = outcome.errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        progress.done(&outcome);
        Ok(outcome)
    }

    /// [`run`](Self::run), with a refused invocation folded into
    /// `success: false`.
    pub async fn run_workflow(&self, query: &str, progress: &dyn ProgressReporter) -> RunOutcome {
        match self.run(query, progress).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "run refused");
                RunOutcome::refused(e.to_string())
            }
        }
    }

    // --- Stages ---

    async fn intent_stage(&self, mut state: WorkflowState) -> WorkflowState {
        match self.intent.extract(&state.query).await {
            Ok(criteria) => {
                info!(location = %criteria.location, lead_type = %criteria.lead_type, "criteria extracted");
                state.metadata.insert(
                    "intent_analysis".into(),
                    json!({
                        "original_query": state.query,
                        "extracted_location": criteria.location,
                        "lead_type": criteria.lead_type,
                        "property_types": criteria.property_types,
                        "extractor": self.intent.name(),
                    }),
                );
                state.criteria = Some(criteria);
            }
            Err(e) => state.record_error(WorkflowStep::Intent, e),
        }
        state
    }

    async fn search_stage(&self, mut state: WorkflowState) -> WorkflowState {
        let Some(criteria) = state.criteria.clone() else {
            state.record_error(WorkflowStep::Search, "no search criteria provided");
            return state;
        };

        match search_all(&self.listing_sources, &criteria).await {
            Ok(result) => {
                let found = result.records.len();
                let mut listings = result.records;
                if listings.len() > self.settings.max_listings {
                    listings.truncate(self.settings.max_listings);
                }
                for listing in &mut listings {
                    if listing.id.is_empty() {
                        listing.id = Uuid::now_v7().to_string();
                    }
                }
                info!(found, kept = listings.len(), duplicates = result.duplicates, "search complete");
                state.metadata.insert(
                    "search".into(),
                    json!({
                        "sources": result.reports,
                        "duplicates": result.duplicates,
                        "found": found,
                        "kept": listings.len(),
                    }),
                );
                state.raw_listings = listings;
            }
            Err(e) => state.record_error(WorkflowStep::Search, e),
        }
        state
    }

    fn filter_stage(&self, mut state: WorkflowState) -> WorkflowState {
        if state.raw_listings.is_empty() {
            state.record_error(WorkflowStep::Filter, "no raw listings to filter");
            return state;
        }
        let outcome = self.filter.run(state.raw_listings.clone(), state.criteria.as_ref());
        state.metadata.insert(
            "filtering".into(),
            serde_json::to_value(&outcome.reports).unwrap_or(Value::Null),
        );
        state.filtered_listings = outcome.listings;
        state
    }

    async fn enrich_stage(&self, mut state: WorkflowState) -> WorkflowState {
        if state.filtered_listings.is_empty() {
            state.record_error(WorkflowStep::Enrich, "no filtered listings to enrich");
            return state;
        }
        let options = EnrichmentOptions {
            concurrency: self.settings.enrichment_concurrency,
            pacing: Duration::from_millis(self.settings.enrichment_pacing_ms),
        };
        match enrich_listings(state.filtered_listings.clone(), &self.contact_sources, options).await {
            Ok(results) => {
                state.metadata.insert(
                    "enrichment".into(),
                    serde_json::to_value(&results.summary).unwrap_or(Value::Null),
                );
                state.enriched_leads = results.leads;
            }
            Err(e) => state.record_error(WorkflowStep::Enrich, e),
        }
        state
    }

    async fn score_stage(&self, mut state: WorkflowState) -> WorkflowState {
        if state.enriched_leads.is_empty() {
            state.record_error(WorkflowStep::Score, "no enriched leads to score");
            return state;
        }
        let lead_type = state
            .criteria
            .as_ref()
            .map_or(LeadType::default(), |c| c.lead_type);
        let (scored, summary) = self.scorer.score_all(state.enriched_leads.clone(), lead_type).await;
        state.metadata.insert(
            "scoring".into(),
            serde_json::to_value(&summary).unwrap_or(Value::Null),
        );
        state.scored_leads = scored;
        state
    }

    async fn review_stage(&self, mut state: WorkflowState) -> WorkflowState {
        if state.scored_leads.is_empty() {
            info!("no scored leads to review");
            return state;
        }
        match review_leads(state.scored_leads.clone(), &self.review).await {
            Ok(outcome) => {
                state.metadata.insert(
                    "review".into(),
                    serde_json::to_value(&outcome.summary).unwrap_or(Value::Null),
                );
                state.scored_leads = outcome.leads;
                state.human_reviewed_leads = outcome.approved;
            }
            Err(e) => state.record_error(WorkflowStep::HumanGate, e),
        }
        state
    }

    fn export_stage(&self, mut state: WorkflowState) -> WorkflowState {
        if state.human_reviewed_leads.is_empty() {
            state.record_error(WorkflowStep::Export, "no leads to export");
            return state;
        }
        state.final_leads = state.human_reviewed_leads.clone();

        let Some(exporter) = &self.exporter else {
            info!(leads = state.final_leads.len(), "export disabled, keeping leads in memory");
            state
                .metadata
                .insert("export".into(), json!({ "skipped": "export disabled" }));
            return state;
        };

        match exporter.export(&state, &state.final_leads) {
            Ok(report) => {
                state.output_ref = report.primary().map(|a| a.path.display().to_string());
                state.metadata.insert(
                    "export".into(),
                    serde_json::to_value(&report).unwrap_or(Value::Null),
                );
            }
            Err(e) => state.record_error(WorkflowStep::Export, e),
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use leadgen_export::FileExporter;
    use leadgen_shared::{Criteria, ExportFormat, LeadStatus, RawListing};
    use leadgen_sources::{ContactQuery, ContactRecord};

    use super::*;
    use crate::intent::RuleBasedExtractor;
    use crate::review::{ReviewDecision, Reviewer, Verdict};

    struct StaticListings {
        name: &'static str,
        listings: Vec<RawListing>,
    }

    #[async_trait]
    impl ListingSource for StaticListings {
        fn name(&self) -> &str {
            self.name
        }
        async fn fetch(&self, _criteria: &Criteria) -> Result<Vec<RawListing>> {
            Ok(self
                .listings
                .iter()
                .cloned()
                .map(|mut l| {
                    l.source = self.name.to_string();
                    l
                })
                .collect())
        }
    }

    struct DownListings;

    #[async_trait]
    impl ListingSource for DownListings {
        fn name(&self) -> &str {
            "realtor"
        }
        async fn fetch(&self, _criteria: &Criteria) -> Result<Vec<RawListing>> {
            Err(LeadGenError::source_failed("realtor", "503 Service Unavailable"))
        }
    }

    struct PhoneBook;

    #[async_trait]
    impl ContactSource for PhoneBook {
        fn name(&self) -> &str {
            "skiptracing"
        }
        async fn lookup(&self, query: &ContactQuery) -> Result<ContactRecord> {
            if query.address.starts_with("12 ") {
                Ok(ContactRecord {
                    owner_name: Some("Rosa Diaz".into()),
                    owner_phone: Some("602-555-0142".into()),
                    ..ContactRecord::default()
                })
            } else {
                Ok(ContactRecord::default())
            }
        }
    }

    /// Records every step it is told about.
    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<WorkflowStep>>);

    impl ProgressReporter for RecordingProgress {
        fn stage_started(&self, step: WorkflowStep) {
            self.0.lock().unwrap().push(step);
        }
        fn stage_finished(&self, _step: WorkflowStep, _state: &WorkflowState) {}
        fn done(&self, _outcome: &RunOutcome) {}
    }

    fn listing(address: &str, price: f64, signals: &[&str]) -> RawListing {
        RawListing {
            address: address.into(),
            city: "Phoenix".into(),
            state: "AZ".into(),
            zip_code: "85004".into(),
            property_type: "single-family".into(),
            price: Some(price),
            bedrooms: Some(3),
            bathrooms: Some(2.0),
            square_feet: Some(1_500),
            year_built: Some(1985),
            days_on_market: Some(45),
            motivation_signals: signals.iter().map(|s| s.to_string()).collect(),
            ..RawListing::default()
        }
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::new(
            vec![
                Box::new(StaticListings {
                    name: "mls",
                    listings: vec![
                        listing("12 Oak St", 320_000.0, &["estate_sale"]),
                        listing("40 Pine Ave", 900_000.0, &[]),
                    ],
                }),
                Box::new(DownListings),
                Box::new(StaticListings {
                    name: "zillow",
                    listings: vec![
                        listing("12 OAK ST", 330_000.0, &[]),
                        listing("7 Cedar Ct", 280_000.0, &["vacant_property"]),
                    ],
                }),
            ],
            vec![Box::new(PhoneBook)],
        )
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            enrichment_pacing_ms: 0,
            ..PipelineSettings::default()
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(Box::new(RuleBasedExtractor::new()), registry(), settings())
            .with_filter(FilterChain::new().with_current_year(2026))
    }

    #[tokio::test]
    async fn full_run_approves_and_ranks_leads() {
        let outcome = pipeline()
            .run("homes in Phoenix, AZ under $500,000", &SilentProgress)
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        // 12 Oak St: phone 20 + high-value tag 8 + completeness 20 + mls 20
        // 7 Cedar Ct: plain tag 3 + completeness 20 + zillow 12, below the gate
        let scores: Vec<f64> = outcome.leads.iter().map(|l| l.score_or_zero()).collect();
        assert_eq!(scores, vec![68.0]);
        assert_eq!(outcome.leads[0].property.address, "12 Oak St");
        assert_eq!(outcome.leads[0].owner_phone.as_deref(), Some("602-555-0142"));
        assert_eq!(outcome.leads[0].status(), LeadStatus::Approved);
        assert_eq!(outcome.metadata["search"]["duplicates"], 1);
        assert_eq!(outcome.metadata["review"]["rejected"], 1);
        assert_eq!(outcome.metadata["export"]["skipped"], "export disabled");
        assert!(outcome.output_ref.is_none());
    }

    #[tokio::test]
    async fn failing_source_is_reported_not_recorded() {
        let p = pipeline();
        let mut state = WorkflowState::new("q");
        state.criteria = Some(Criteria::new("Phoenix, AZ"));
        state.current_step = WorkflowStep::Search;

        let state = p.advance(state).await;
        assert_eq!(state.current_step, WorkflowStep::Filter);
        assert!(state.errors.is_empty());
        assert_eq!(state.raw_listings.len(), 3);
        assert!(state.raw_listings.iter().all(|l| !l.id.is_empty()));
        assert_eq!(state.raw_listings[0].source, "mls");
        let sources = state.metadata["search"]["sources"].as_array().unwrap();
        assert!(sources[1]["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn missing_location_records_errors_and_still_finishes() {
        let progress = RecordingProgress::default();
        let outcome = pipeline().run("cheap houses somewhere", &progress).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.leads.is_empty());
        assert!(outcome.errors[0].starts_with("Intent stage error:"));
        assert_eq!(outcome.errors[1], "Search stage error: no search criteria provided");
        assert_eq!(outcome.errors[2], "Filter stage error: no raw listings to filter");
        assert_eq!(outcome.errors[3], "Enrichment stage error: no filtered listings to enrich");
        assert_eq!(outcome.errors[4], "Scoring stage error: no enriched leads to score");
        assert_eq!(outcome.errors[5], "Export stage error: no leads to export");
        assert_eq!(outcome.errors.len(), 6);
        assert_eq!(*progress.0.lock().unwrap(), WorkflowStep::ALL[..7].to_vec());
    }

    #[tokio::test]
    async fn advance_on_done_is_a_no_op() {
        let mut state = WorkflowState::new("q");
        state.current_step = WorkflowStep::Done;
        let state = pipeline().advance(state).await;
        assert!(state.is_done());
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_refused() {
        let p = pipeline();
        assert!(p.run("   ", &SilentProgress).await.is_err());

        let outcome = p.run_workflow("", &SilentProgress).await;
        assert!(!outcome.success);
        assert_eq!(outcome.total_leads, 0);
        assert!(outcome.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn max_listings_caps_search() {
        let p = Pipeline::new(
            Box::new(RuleBasedExtractor::new()),
            registry(),
            PipelineSettings {
                max_listings: 2,
                ..settings()
            },
        );
        let mut state = WorkflowState::new("q");
        state.criteria = Some(Criteria::new("Phoenix, AZ"));
        state.current_step = WorkflowStep::Search;
        let state = p.advance(state).await;
        assert_eq!(state.raw_listings.len(), 2);
        assert_eq!(state.metadata["search"]["found"], 3);
    }

    struct RejectAll;

    #[async_trait]
    impl Reviewer for RejectAll {
        fn name(&self) -> &str {
            "reject-all"
        }
        async fn review(&self, leads: &[Lead]) -> Result<Vec<ReviewDecision>> {
            Ok(leads
                .iter()
                .map(|l| ReviewDecision::new(l.id.to_string(), Verdict::Reject))
                .collect())
        }
    }

    #[tokio::test]
    async fn attended_rejection_leaves_nothing_to_export() {
        let outcome = pipeline()
            .with_review(ReviewPolicy::Attended(Box::new(RejectAll)))
            .run("homes in Phoenix, AZ under $500,000", &SilentProgress)
            .await
            .unwrap();
        assert!(outcome.leads.is_empty());
        assert_eq!(outcome.errors, vec!["Export stage error: no leads to export"]);
    }

    #[tokio::test]
    async fn export_writes_artifacts_and_sets_output_ref() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = pipeline()
            .with_exporter(Box::new(FileExporter::new(
                dir.path(),
                vec![ExportFormat::Csv, ExportFormat::Report],
            )))
            .run("homes in Phoenix, AZ under $500,000", &SilentProgress)
            .await
            .unwrap();

        let output = outcome.output_ref.expect("csv written");
        assert!(output.ends_with(".csv"));
        let csv = std::fs::read_to_string(&output).unwrap();
        assert!(csv.contains("12 Oak St"));
        assert!(!csv.contains("7 Cedar Ct"));
        assert_eq!(outcome.metadata["export"]["artifacts"].as_array().unwrap().len(), 2);
    }
}
