//! Signal extractors: stateless scanners that turn a test's event stream
//! into `FailureSignal`s.
//!
//! Extractors run in a fixed declared order and each one is
//! deterministic, so identical inputs always yield the same signal list.

pub mod assertion;
pub mod http;
pub mod infra;
pub mod language;
pub mod locator;
pub mod performance;
pub mod timeout;

use crate::models::{ExecutionEvent, FailureSignal, LogSourceType};

pub use performance::PerformanceThresholds;

/// One stateless failure-mode scanner.
pub trait SignalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Scan one test's events. Never fails; no match means an empty list.
    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal>;
}

/// The declared extractor order. Results are concatenated in this order.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl ExtractorSet {
    pub fn new(thresholds: PerformanceThresholds) -> Self {
        Self {
            extractors: vec![
                Box::new(timeout::TimeoutExtractor::new()),
                Box::new(assertion::AssertionExtractor::new()),
                Box::new(locator::LocatorExtractor::new()),
                Box::new(http::HttpErrorExtractor::new()),
                Box::new(http::ConnectionErrorExtractor::new()),
                Box::new(http::DnsErrorExtractor::new()),
                Box::new(infra::InfraExtractor::new()),
                Box::new(infra::DatabaseExtractor::new()),
                Box::new(language::LanguageDefectExtractor::new()),
                Box::new(performance::PerformanceExtractor::new(thresholds)),
            ],
        }
    }

    /// Run every extractor over the automation events, preserving the
    /// declared order.
    pub fn extract_all(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let automation: Vec<ExecutionEvent> = events
            .iter()
            .filter(|e| e.log_source_type == LogSourceType::Automation)
            .cloned()
            .collect();

        let mut signals = Vec::new();
        for extractor in &self.extractors {
            signals.extend(extractor.extract(&automation));
        }
        signals
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new(PerformanceThresholds::default())
    }
}

/// Carry event context (stack, file, line) onto a freshly built signal.
pub(crate) fn inherit_event_context(
    mut signal: FailureSignal,
    event: &ExecutionEvent,
) -> FailureSignal {
    signal.stacktrace = event.stacktrace.clone();
    signal.file = event.test_file.clone();
    signal.line = event
        .metadata
        .get("failure_line")
        .and_then(|l| l.parse().ok());
    signal
}
