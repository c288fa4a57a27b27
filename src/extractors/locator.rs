//! Element-locator failure extraction, with selector capture.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};
use regex::Regex;

const CONFIDENCE: f64 = 0.92;

pub struct LocatorExtractor {
    keywords: Vec<&'static str>,
    selectors: Vec<Regex>,
}

impl LocatorExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "nosuchelement",
                "elementnotinteractable",
                "staleelement",
                "elementnotvisible",
                "locator not found",
                "unable to locate element",
                "element not found",
            ],
            selectors: vec![
                // Selenium JSON locator blob: {"method":"css selector","selector":"#login"}
                Regex::new(r#""selector"\s*:\s*"(?P<selector>[^"]+)""#).unwrap(),
                // Quoted selector after a locator phrase
                Regex::new(r"(?i)(?:element|locator|selector)\s*[:=]?\s*['\x22](?P<selector>[^'\x22]+)['\x22]").unwrap(),
                // Robot/Selenium id= / css= / xpath= shorthand
                Regex::new(r"(?P<selector>(?:id|css|xpath|name|link)=[^\s'\x22]+)").unwrap(),
            ],
        }
    }

    fn capture_selector(&self, message: &str) -> Option<String> {
        self.selectors
            .iter()
            .find_map(|p| p.captures(message).map(|c| c["selector"].to_string()))
    }
}

impl Default for LocatorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for LocatorExtractor {
    fn name(&self) -> &'static str {
        "locator"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }

            let mut signal =
                FailureSignal::new(SignalType::Locator, event.message.clone(), CONFIDENCE)
                    .with_pattern("locator.keyword");
            for keyword in &matched {
                signal = signal.with_keyword(keyword);
            }
            if let Some(selector) = self.capture_selector(&event.message) {
                signal = signal.with_metadata("selector", selector);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}
