//! Performance signal extraction: slow tests, memory growth, CPU burn.
//!
//! Thresholds differ by test type; an e2e test is allowed far more wall
//! clock than a unit test.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};
use regex::Regex;

const CONFIDENCE: f64 = 0.7;

/// Per-test-type duration ceilings, in seconds.
#[derive(Debug, Clone)]
pub struct PerformanceThresholds {
    pub unit_secs: f64,
    pub integration_secs: f64,
    pub e2e_secs: f64,
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            unit_secs: 1.0,
            integration_secs: 10.0,
            e2e_secs: 60.0,
            memory_mb: 1024.0,
            cpu_percent: 90.0,
        }
    }
}

impl PerformanceThresholds {
    fn slow_threshold(&self, test_type: &str) -> f64 {
        match test_type {
            "unit" => self.unit_secs,
            "integration" => self.integration_secs,
            _ => self.e2e_secs,
        }
    }
}

pub struct PerformanceExtractor {
    thresholds: PerformanceThresholds,
    duration: Regex,
    memory: Regex,
    cpu: Regex,
    leak_keywords: Vec<&'static str>,
}

impl PerformanceExtractor {
    pub fn new(thresholds: PerformanceThresholds) -> Self {
        Self {
            thresholds,
            duration: Regex::new(r"(?i)(?:took|duration|elapsed|finished in)\s*:?\s*(?P<value>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|sec|seconds|m|min)\b").unwrap(),
            memory: Regex::new(r"(?i)(?:memory|rss|heap)\D{0,15}(?P<mb>\d+(?:\.\d+)?)\s*(?P<unit>mb|gb)\b").unwrap(),
            cpu: Regex::new(r"(?i)cpu\D{0,15}(?P<pct>\d+(?:\.\d+)?)\s*%").unwrap(),
            leak_keywords: vec!["memory leak", "leak detected", "heap exhausted"],
        }
    }

    fn duration_secs(&self, message: &str) -> Option<f64> {
        let caps = self.duration.captures(message)?;
        let value: f64 = caps["value"].parse().ok()?;
        Some(match caps["unit"].to_lowercase().as_str() {
            "ms" => value / 1000.0,
            "m" | "min" => value * 60.0,
            _ => value,
        })
    }

    fn memory_mb(&self, message: &str) -> Option<f64> {
        let caps = self.memory.captures(message)?;
        let value: f64 = caps["mb"].parse().ok()?;
        Some(match caps["unit"].to_lowercase().as_str() {
            "gb" => value * 1024.0,
            _ => value,
        })
    }
}

impl SignalExtractor for PerformanceExtractor {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let test_type = event
                .metadata
                .get("test_type")
                .map(String::as_str)
                .unwrap_or("e2e");

            if let Some(secs) = self.duration_secs(&event.message) {
                let threshold = self.thresholds.slow_threshold(test_type);
                if secs > threshold {
                    let signal = FailureSignal::new(
                        SignalType::SlowTest,
                        event.message.clone(),
                        CONFIDENCE,
                    )
                    .with_pattern("performance.slow")
                    .with_metadata("duration_secs", format!("{secs}"))
                    .with_metadata("threshold_secs", format!("{threshold}"));
                    signals.push(inherit_event_context(signal, event));
                }
            }

            let leaked = self.leak_keywords.iter().any(|k| lowered.contains(k));
            let over_memory = self
                .memory_mb(&event.message)
                .map_or(false, |mb| mb > self.thresholds.memory_mb);
            if leaked || over_memory {
                let signal = FailureSignal::new(
                    SignalType::MemoryLeak,
                    event.message.clone(),
                    CONFIDENCE,
                )
                .with_pattern("performance.memory");
                signals.push(inherit_event_context(signal, event));
            }

            if let Some(caps) = self.cpu.captures(&event.message) {
                let pct: f64 = caps["pct"].parse().unwrap_or(0.0);
                if pct > self.thresholds.cpu_percent {
                    let signal = FailureSignal::new(
                        SignalType::HighCpu,
                        event.message.clone(),
                        CONFIDENCE,
                    )
                    .with_pattern("performance.cpu")
                    .with_metadata("cpu_percent", format!("{pct}"));
                    signals.push(inherit_event_context(signal, event));
                }
            }
        }
        signals
    }
}
