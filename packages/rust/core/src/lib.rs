//! Core pipeline orchestration and domain logic for the lead pipeline.
//!
//! This crate ties together intent extraction, multi-source search, the
//! filter chain, contact enrichment, scoring, and the human gate into one
//! end-to-end run (see [`pipeline::Pipeline`]).

pub mod aggregator;
pub mod enrichment;
pub mod filter;
pub mod intent;
pub mod pipeline;
pub mod review;
pub mod scorer;

pub use pipeline::{Pipeline, ProgressReporter, RunOutcome, SilentProgress};
