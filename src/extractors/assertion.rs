//! Assertion-failure signal extraction, with expected/actual capture.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};
use regex::Regex;

const CONFIDENCE: f64 = 0.95;

pub struct AssertionExtractor {
    keywords: Vec<&'static str>,
    expected_actual: Vec<Regex>,
}

impl AssertionExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "assertionerror",
                "assert failed",
                "assertion failed",
                "assertequal",
                "should equal",
                "expectation failed",
                "assert ",
            ],
            expected_actual: vec![
                Regex::new(r"(?i)expected[:\s]+<?(?P<expected>[^,<>]+?)>?\s*(?:,\s*|\s+)(?:but\s+)?(?:got|was|received)[:\s]+<?(?P<actual>[^,<>.]+)").unwrap(),
                Regex::new(r"(?i)\bassert\s+(?P<actual>\S+)\s*==\s*(?P<expected>\S+)").unwrap(),
            ],
        }
    }

    fn capture_expected_actual(&self, message: &str) -> Option<(String, String)> {
        for pattern in &self.expected_actual {
            if let Some(caps) = pattern.captures(message) {
                return Some((
                    caps["expected"].trim().to_string(),
                    caps["actual"].trim().to_string(),
                ));
            }
        }
        None
    }
}

impl Default for AssertionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for AssertionExtractor {
    fn name(&self) -> &'static str {
        "assertion"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let from_exception = event
                .exception_type
                .as_deref()
                .map_or(false, |e| e.contains("Assertion") || e.contains("ExpectationNotMet"));
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() && !from_exception {
                continue;
            }

            let mut signal =
                FailureSignal::new(SignalType::Assertion, event.message.clone(), CONFIDENCE)
                    .with_pattern("assertion.keyword");
            for keyword in &matched {
                signal = signal.with_keyword(keyword);
            }
            if let Some((expected, actual)) = self.capture_expected_actual(&event.message) {
                signal = signal
                    .with_metadata("expected", expected)
                    .with_metadata("actual", actual);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}
