//! # Triage Core
//!
//! Triage Core is an execution intelligence engine: it converts raw
//! test-automation logs (and optional application-service logs) into
//! structured, classified, evidence-backed failure analyses suitable for
//! CI gating and dashboards.
//!
//! ## Architecture
//!
//! One test's analysis is a sequential pipeline:
//! - **Adapters** parse framework output into a normalized event stream
//! - **Extractors** scan events for failure signals
//! - **Rule engine** maps signals to one of five failure types
//! - **Resolver** locates the user-code failure site
//! - **Correlator** checks service logs for confirmation
//! - **Calibrator** folds rule, signal, history and correlation inputs
//!   into the final confidence
//!
//! A batch fans tests out across a bounded worker pool, then the
//! **grouper** clusters related failures and the analyzer computes the
//! CI-gating verdict.
//!
//! The engine never needs AI to function: the enrichment layer is
//! advisory, bounded, and can only annotate, never reclassify.

/// Framework and application log adapters
pub mod adapters;
/// Orchestration, batching and CI gating
pub mod analyzer;
/// Confidence calibration
pub mod calibrator;
/// Classification assembly over rule verdicts
pub mod classifier;
/// Configuration document and env substitution
pub mod config;
/// System-wide defaults
pub mod constants;
/// Application-log correlation
pub mod correlator;
/// Optional advisory enrichment
pub mod enrichment;
/// Error types and handling
pub mod error;
/// Signal extraction
pub mod extractors;
/// Cross-test failure grouping
pub mod grouping;
/// Core data models
pub mod models;
/// Canonical JSON, text and summary rendering
pub mod output;
/// Pattern normalization, hashing and history
pub mod patterns;
/// Stack-trace walking and snippet capture
pub mod resolver;
/// Log source routing and merging
pub mod router;
/// Declarative rule packs and evaluation
pub mod rules;

#[cfg(test)]
mod tests;

pub use error::{Result, TriageError};
