//! Application configuration for the lead pipeline.
//!
//! User config lives at `~/.leadgen/leadgen.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LeadGenError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadgen";

// ---------------------------------------------------------------------------
// Config structs (matching leadgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Listing providers.
    #[serde(default)]
    pub search: SearchConfig,

    /// Contact providers and pacing.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where export artifacts are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Base directory for relative fixture provider paths.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: String,

    /// Cap on de-duplicated listings kept from one search.
    #[serde(default = "default_max_listings")]
    pub max_listings: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            fixtures_dir: default_fixtures_dir(),
            max_listings: default_max_listings(),
        }
    }
}

fn default_output_dir() -> String {
    "./outputs".into()
}
fn default_fixtures_dir() -> String {
    "fixtures".into()
}
fn default_max_listings() -> usize {
    50
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for intent extraction and scoring.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// How a provider obtains its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic records read from a JSON file.
    Fixture,
    /// JSON over HTTP.
    Http,
}

/// `[[search.providers]]` / `[[enrichment.providers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Source tag stamped onto produced records (`mls`, `zillow`, ...).
    pub name: String,
    pub kind: ProviderKind,
    /// Fixture file, relative to `defaults.fixtures_dir` unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Base URL for `http` providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderEntry {
    pub fn fixture(name: &str, path: &str) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Fixture,
            path: Some(path.into()),
            base_url: None,
        }
    }
}

/// `[search]` section. Providers are queried concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_providers")]
    pub providers: Vec<ProviderEntry>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: default_search_providers(),
        }
    }
}

fn default_search_providers() -> Vec<ProviderEntry> {
    ["mls", "zillow", "realtor", "fsbo"]
        .iter()
        .map(|name| ProviderEntry::fixture(name, &format!("listings/{name}.json")))
        .collect()
}

/// `[enrichment]` section. Providers are consulted in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Leads enriched concurrently per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between batches.
    #[serde(default = "default_enrichment_pacing")]
    pub pacing_ms: u64,

    #[serde(default = "default_contact_providers")]
    pub providers: Vec<ProviderEntry>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pacing_ms: default_enrichment_pacing(),
            providers: default_contact_providers(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_enrichment_pacing() -> u64 {
    100
}
fn default_contact_providers() -> Vec<ProviderEntry> {
    ["property_records", "skiptracing", "social_media", "public_records"]
        .iter()
        .map(|name| ProviderEntry::fixture(name, &format!("contacts/{name}.json")))
        .collect()
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Ask the LLM first; `false` goes straight to the heuristic.
    #[serde(default = "default_true")]
    pub use_llm: bool,

    /// Pause between LLM scoring calls.
    #[serde(default = "default_scoring_pacing")]
    pub pacing_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            pacing_ms: default_scoring_pacing(),
            temperature: default_temperature(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_scoring_pacing() -> u64 {
    200
}
fn default_temperature() -> f32 {
    0.3
}

/// Whether the human gate decides on its own or waits for a reviewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// Approve every lead at or above the threshold.
    #[default]
    Auto,
    /// Wait for per-lead decisions.
    Attended,
}

/// `[review]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub mode: ReviewMode,

    #[serde(default = "default_threshold")]
    pub auto_approve_threshold: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            mode: ReviewMode::Auto,
            auto_approve_threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    50.0
}

/// An artifact the export stage can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Report,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = LeadGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "report" | "txt" => Ok(Self::Report),
            other => Err(LeadGenError::config(format!(
                "unknown export format `{other}` (expected csv, json, or report)"
            ))),
        }
    }
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            formats: default_formats(),
        }
    }
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Csv, ExportFormat::Json, ExportFormat::Report]
}

// ---------------------------------------------------------------------------
// Pipeline settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline settings, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Export artifact directory.
    pub output_dir: PathBuf,
    /// Cap on de-duplicated listings kept from one search.
    pub max_listings: usize,
    /// Leads enriched concurrently per batch.
    pub enrichment_concurrency: usize,
    /// Pause between enrichment batches, in ms.
    pub enrichment_pacing_ms: u64,
    /// Pause between LLM scoring calls, in ms.
    pub scoring_pacing_ms: u64,
    /// Auto-approval threshold for the unattended human gate.
    pub review_threshold: f64,
    /// Whether the export stage writes artifacts at all.
    pub export_enabled: bool,
    /// Artifacts the export stage writes.
    pub export_formats: Vec<ExportFormat>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            max_listings: config.defaults.max_listings,
            enrichment_concurrency: config.enrichment.concurrency.max(1),
            enrichment_pacing_ms: config.enrichment.pacing_ms,
            scoring_pacing_ms: config.scoring.pacing_ms,
            review_threshold: config.review.auto_approve_threshold,
            export_enabled: config.export.enabled,
            export_formats: config.export.formats.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadGenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadgen/leadgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadGenError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| LeadGenError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadGenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadGenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadGenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject provider entries that can't be built and out-of-range numbers.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let providers = config
        .search
        .providers
        .iter()
        .chain(config.enrichment.providers.iter());
    for entry in providers {
        match entry.kind {
            ProviderKind::Fixture if entry.path.is_none() => {
                return Err(LeadGenError::config(format!(
                    "fixture provider `{}` needs a `path`",
                    entry.name
                )));
            }
            ProviderKind::Http if entry.base_url.is_none() => {
                return Err(LeadGenError::config(format!(
                    "http provider `{}` needs a `base_url`",
                    entry.name
                )));
            }
            _ => {}
        }
    }

    let threshold = config.review.auto_approve_threshold;
    if !(0.0..=100.0).contains(&threshold) {
        return Err(LeadGenError::config(format!(
            "review.auto_approve_threshold must be within 0..=100, got {threshold}"
        )));
    }
    Ok(())
}

/// Read the OpenRouter API key from the env var named in config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LeadGenError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    api_key(config).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("skiptracing"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_listings, 50);
        assert_eq!(parsed.search.providers.len(), 4);
        assert_eq!(parsed.review.auto_approve_threshold, 50.0);
        assert_eq!(parsed.export.formats.len(), 3);
    }

    #[test]
    fn config_with_http_provider() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/leads"

[[search.providers]]
name = "mls"
kind = "http"
base_url = "https://listings.example.com"

[review]
mode = "attended"
auto_approve_threshold = 70
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.search.providers.len(), 1);
        assert_eq!(config.search.providers[0].kind, ProviderKind::Http);
        assert_eq!(config.review.mode, ReviewMode::Attended);
        // untouched sections fall back to defaults
        assert_eq!(config.enrichment.providers.len(), 4);
        validate_config(&config).expect("valid config");
    }

    #[test]
    fn http_provider_without_base_url_is_rejected() {
        let mut config = AppConfig::default();
        config.search.providers.push(ProviderEntry {
            name: "broken".into(),
            kind: ProviderKind::Http,
            path: None,
            base_url: None,
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = AppConfig::default();
        config.review.auto_approve_threshold = 120.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn pipeline_settings_from_app_config() {
        let mut app = AppConfig::default();
        app.enrichment.concurrency = 0;
        let settings = PipelineSettings::from(&app);
        assert_eq!(settings.enrichment_concurrency, 1);
        assert_eq!(settings.enrichment_pacing_ms, 100);
        assert_eq!(settings.scoring_pacing_ms, 200);
        assert_eq!(settings.output_dir, PathBuf::from("./outputs"));
    }

    #[test]
    fn export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Report);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "LEADGEN_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
