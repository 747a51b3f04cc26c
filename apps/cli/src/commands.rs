//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use leadgen_core::intent::{IntentExtractor, LlmIntentExtractor, RuleBasedExtractor};
use leadgen_core::review::{DecisionFileReviewer, ReviewPolicy};
use leadgen_core::scorer::{LlmScorer, Scorer};
use leadgen_core::{Pipeline, ProgressReporter, RunOutcome};
use leadgen_export::FileExporter;
use leadgen_llm::OpenRouterClient;
use leadgen_shared::{
    AppConfig, PipelineSettings, ProviderEntry, ProviderKind, ReviewMode, WorkflowState,
    WorkflowStep, init_config, load_config, load_config_from, validate_api_key,
};
use leadgen_sources::SourceRegistry;

use crate::prompt::TerminalReviewer;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadgen: find, enrich, score, and export real-estate leads.
#[derive(Parser)]
#[command(
    name = "leadgen",
    version,
    about = "Turn a plain-language request into scored, reviewed real-estate leads.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.leadgen/leadgen.toml.
    #[arg(long, global = true, env = "LEADGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for one request.
    Run {
        /// The request, e.g. "motivated sellers in Phoenix, AZ under $400k".
        query: String,

        /// Directory for export artifacts (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Auto-approval threshold for the unattended review gate (0-100).
        #[arg(short, long)]
        threshold: Option<f64>,

        /// JSON file of review decisions; makes the review gate attended.
        #[arg(long, conflicts_with = "interactive")]
        decisions: Option<PathBuf>,

        /// Ask for a decision on each scored lead at the terminal.
        #[arg(short, long)]
        interactive: bool,

        /// Use rule-based intent extraction and heuristic scoring only.
        #[arg(long)]
        no_llm: bool,

        /// Skip writing export artifacts.
        #[arg(long)]
        no_export: bool,

        /// Print the run outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the configured listing and contact providers.
    Sources,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Flags for `leadgen run`, gathered from [`Command::Run`].
pub(crate) struct RunArgs {
    pub query: String,
    pub out: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub decisions: Option<PathBuf>,
    pub interactive: bool,
    pub no_llm: bool,
    pub no_export: bool,
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so `--json`
/// output on stdout stays machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadgen=info",
        1 => "leadgen=debug",
        _ => "leadgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            query,
            out,
            threshold,
            decisions,
            interactive,
            no_llm,
            no_export,
            json,
        } => {
            let args = RunArgs {
                query,
                out,
                threshold,
                decisions,
                interactive,
                no_llm,
                no_export,
                json,
            };
            cmd_run(config_path.as_deref(), args).await
        }
        Command::Sources => cmd_sources(config_path.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut settings = PipelineSettings::from(&config);
    if let Some(out) = &args.out {
        settings.output_dir = out.clone();
    }
    if let Some(threshold) = args.threshold {
        if !(0.0..=100.0).contains(&threshold) {
            return Err(eyre!("--threshold must be within 0..=100, got {threshold}"));
        }
        settings.review_threshold = threshold;
    }

    let registry = SourceRegistry::from_config(&config)?;
    let client = llm_client(&config, args.no_llm);

    let intent: Box<dyn IntentExtractor> = match &client {
        Some(client) => Box::new(LlmIntentExtractor::new(client.clone())),
        None => Box::new(RuleBasedExtractor::new()),
    };
    let scorer = match client {
        Some(client) => Scorer::new(Box::new(LlmScorer::new(client, config.scoring.temperature)))
            .with_pacing(Duration::from_millis(settings.scoring_pacing_ms)),
        None => Scorer::heuristic_only(),
    };

    let interactive_gate = args.interactive
        || (args.decisions.is_none() && config.review.mode == ReviewMode::Attended);
    let review = match &args.decisions {
        Some(path) => ReviewPolicy::Attended(Box::new(DecisionFileReviewer::new(path))),
        None if interactive_gate => ReviewPolicy::Attended(Box::new(TerminalReviewer)),
        None => ReviewPolicy::Threshold(settings.review_threshold),
    };

    let export = settings.export_enabled && !args.no_export;
    let exporter = FileExporter::new(settings.output_dir.clone(), settings.export_formats.clone());

    info!(
        query = %args.query,
        intent = intent.name(),
        llm_scoring = scorer.uses_llm(),
        export,
        "starting lead run"
    );

    let mut pipeline = Pipeline::new(intent, registry, settings)
        .with_scorer(scorer)
        .with_review(review);
    if export {
        pipeline = pipeline.with_exporter(Box::new(exporter));
    }

    let progress = CliProgress::new(interactive_gate);
    let outcome = pipeline.run_workflow(&args.query, &progress).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    match outcome.error {
        Some(error) => Err(eyre!(error)),
        None => Ok(()),
    }
}

/// An OpenRouter client when LLM use is enabled and a key is available.
fn llm_client(config: &AppConfig, no_llm: bool) -> Option<OpenRouterClient> {
    if no_llm || !config.scoring.use_llm {
        return None;
    }
    if let Err(e) = validate_api_key(config) {
        warn!(error = %e, "no API key, using rule-based intent and heuristic scoring");
        return None;
    }
    match OpenRouterClient::from_config(config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "LLM unavailable, using rule-based intent and heuristic scoring");
            None
        }
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    if outcome.leads.is_empty() {
        println!("  No leads approved.");
    } else {
        println!("  {} lead(s) approved", outcome.total_leads);
        println!();
        println!(
            "  {:>5}  {:<32} {:<20} {:>10}  {:<14}",
            "Score", "Address", "City", "Price", "Phone"
        );
        for lead in outcome.leads.iter().take(10) {
            let p = &lead.property;
            let price = p.price.map(|v| format!("${v:.0}")).unwrap_or_else(|| "-".into());
            println!(
                "  {:>5.1}  {:<32} {:<20} {:>10}  {:<14}",
                lead.score_or_zero(),
                truncate(&p.address, 32),
                truncate(&format!("{}, {}", p.city, p.state), 20),
                price,
                lead.owner_phone.as_deref().unwrap_or("-"),
            );
        }
        if outcome.leads.len() > 10 {
            println!("  ... and {} more", outcome.leads.len() - 10);
        }
    }

    if let Some(path) = &outcome.output_ref {
        println!();
        println!("  Exported: {path}");
    }
    if !outcome.errors.is_empty() {
        println!();
        println!("  Stage errors:");
        for error in &outcome.errors {
            println!("    - {error}");
        }
    }
    println!();
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// One indicatif spinner per stage, left behind as a finished line.
struct CliProgress {
    current: Mutex<Option<ProgressBar>>,
    /// The terminal reviewer owns the screen during the human gate.
    quiet_gate: bool,
}

impl CliProgress {
    fn new(quiet_gate: bool) -> Self {
        Self {
            current: Mutex::new(None),
            quiet_gate,
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
        );
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, step: WorkflowStep) {
        if step == WorkflowStep::HumanGate && self.quiet_gate {
            return;
        }
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some(Self::spinner(format!("{}...", step.label())));
        }
    }

    fn stage_finished(&self, step: WorkflowStep, state: &WorkflowState) {
        let Ok(mut slot) = self.current.lock() else {
            return;
        };
        if let Some(spinner) = slot.take() {
            spinner.finish_with_message(format!("{}: {}", step.label(), stage_detail(step, state)));
        }
    }

    fn done(&self, _outcome: &RunOutcome) {
        if let Ok(mut slot) = self.current.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

fn stage_detail(step: WorkflowStep, state: &WorkflowState) -> String {
    match step {
        WorkflowStep::Intent => match &state.criteria {
            Some(c) => format!("{} {} in {}", c.lead_type, c.property_types.join("/"), c.location),
            None => "no criteria".into(),
        },
        WorkflowStep::Search => format!("{} listings", state.raw_listings.len()),
        WorkflowStep::Filter => format!("{} kept", state.filtered_listings.len()),
        WorkflowStep::Enrich => format!("{} leads", state.enriched_leads.len()),
        WorkflowStep::Score => format!("{} scored", state.scored_leads.len()),
        WorkflowStep::HumanGate => format!("{} approved", state.human_reviewed_leads.len()),
        WorkflowStep::Export => match &state.output_ref {
            Some(path) => path.clone(),
            None => "nothing written".into(),
        },
        WorkflowStep::Done => String::new(),
    }
}

// ---------------------------------------------------------------------------
// sources / config
// ---------------------------------------------------------------------------

async fn cmd_sources(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    // fails early on providers that can't be built
    let (listing, contact) = SourceRegistry::from_config(&config)?.names();
    info!(listing = listing.len(), contact = contact.len(), "providers resolved");

    println!("Listing providers ({}, queried concurrently):", listing.len());
    for entry in &config.search.providers {
        println!("  {}", describe_provider(entry, &config.defaults.fixtures_dir));
    }
    println!();
    println!("Contact providers ({}, consulted in order):", contact.len());
    for entry in &config.enrichment.providers {
        println!("  {}", describe_provider(entry, &config.defaults.fixtures_dir));
    }
    Ok(())
}

fn describe_provider(entry: &ProviderEntry, fixtures_dir: &str) -> String {
    match entry.kind {
        ProviderKind::Fixture => {
            let path = entry.path.as_deref().unwrap_or_default();
            let full = Path::new(fixtures_dir).join(path);
            format!("{:<18} fixture  {}", entry.name, full.display())
        }
        ProviderKind::Http => format!(
            "{:<18} http     {}",
            entry.name,
            entry.base_url.as_deref().unwrap_or_default()
        ),
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
