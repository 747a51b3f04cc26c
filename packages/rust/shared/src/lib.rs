//! Shared types, error model, and configuration for the lead pipeline.
//!
//! This crate is the foundation depended on by all other leadgen crates.
//! It provides:
//! - [`LeadGenError`], the unified error type
//! - Domain types ([`Criteria`], [`RawListing`], [`Lead`], [`WorkflowState`])
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnrichmentConfig, ExportConfig, ExportFormat, OpenRouterConfig,
    PipelineSettings, ProviderEntry, ProviderKind, ReviewConfig, ReviewMode, ScoringConfig,
    SearchConfig, api_key, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key, validate_config,
};
pub use error::{LeadGenError, Result};
pub use types::{
    AgeCategory, Criteria, DEFAULT_PROPERTY_TYPES, HIGH_VALUE_SIGNALS, Lead, LeadId, LeadStatus,
    LeadType, RawListing, WorkflowState, WorkflowStep, clamp_score, is_high_value_signal,
};
