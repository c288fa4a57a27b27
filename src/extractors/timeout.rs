//! Timeout signal extraction.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};
use regex::Regex;

const CONFIDENCE: f64 = 0.9;

/// Known framework default waits, in seconds. A numeric duration in a
/// message that exceeds the matching default strengthens the timeout
/// reading even without an explicit keyword.
const FRAMEWORK_DEFAULT_WAITS: [(&str, f64); 5] = [
    ("selenium", 10.0),
    ("cypress", 4.0),
    ("playwright", 30.0),
    ("robot", 5.0),
    ("generic", 30.0),
];

pub struct TimeoutExtractor {
    keywords: Vec<&'static str>,
    duration: Regex,
}

impl TimeoutExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "timeout",
                "timed out",
                "timeouterror",
                "webdrivertimeout",
                "deadline exceeded",
            ],
            duration: Regex::new(r"(?:after|waited|exceeded)\s+(?P<secs>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|sec|seconds|m|min)\b").unwrap(),
        }
    }

    fn duration_secs(&self, message: &str) -> Option<f64> {
        let caps = self.duration.captures(message)?;
        let value: f64 = caps["secs"].parse().ok()?;
        Some(match &caps["unit"] {
            "ms" => value / 1000.0,
            "m" | "min" => value * 60.0,
            _ => value,
        })
    }
}

impl Default for TimeoutExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for TimeoutExtractor {
    fn name(&self) -> &'static str {
        "timeout"
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

            let exceeded_default = self.duration_secs(&lowered).map_or(false, |secs| {
                let default = FRAMEWORK_DEFAULT_WAITS
                    .iter()
                    .find(|(fw, _)| event.source.contains(*fw))
                    .or_else(|| FRAMEWORK_DEFAULT_WAITS.last())
                    .map(|(_, d)| *d)
                    .unwrap_or(30.0);
                secs >= default
            });

            if matched.is_empty() && !exceeded_default {
                continue;
            }

            let mut signal =
                FailureSignal::new(SignalType::Timeout, event.message.clone(), CONFIDENCE)
                    .with_pattern("timeout.keyword");
            for keyword in matched {
                signal = signal.with_keyword(keyword);
            }
            if let Some(secs) = self.duration_secs(&lowered) {
                signal = signal.with_metadata("duration_secs", format!("{secs}"));
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    fn event(message: &str) -> ExecutionEvent {
        ExecutionEvent::automation(
            "1970-01-01T00:00:00Z".to_string(),
            LogLevel::Error,
            "selenium",
            message.to_string(),
        )
    }

    #[test]
    fn test_keyword_matches() {
        let extractor = TimeoutExtractor::new();
        let cases = vec![
            "TimeoutError: page did not load",
            "operation timed out waiting for #submit",
            "WebDriverTimeout after implicit wait",
        ];
        for message in cases {
            let signals = extractor.extract(&[event(message)]);
            assert_eq!(signals.len(), 1, "{message}");
            assert_eq!(signals[0].signal_type, SignalType::Timeout);
            assert!(signals[0].is_retryable);
        }
    }

    #[test]
    fn test_duration_exceeding_framework_default() {
        let extractor = TimeoutExtractor::new();
        let signals = extractor.extract(&[event("element not visible after 15 seconds")]);
        assert_eq!(signals.len(), 1);
        assert_eq!(
            signals[0].metadata.get("duration_secs").map(String::as_str),
            Some("15")
        );
    }

    #[test]
    fn test_short_wait_without_keyword_is_silent() {
        let extractor = TimeoutExtractor::new();
        let signals = extractor.extract(&[event("retried after 2 seconds and succeeded")]);
        assert!(signals.is_empty());
    }
}
