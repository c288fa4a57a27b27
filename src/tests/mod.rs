//! Crate-level end-to-end tests driving the full pipeline.

mod scenarios;
