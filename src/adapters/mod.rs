//! Framework adapters: raw test-framework output in, chronological
//! `ExecutionEvent`s out.
//!
//! Every adapter obeys the same contract: `can_handle` is a cheap
//! signature check that never fails, `parse` is best-effort and never
//! aborts on a malformed line. Zero events is a valid outcome.

pub mod application;
pub mod cucumber;
pub mod cypress;
pub mod generic;
pub mod playwright;
pub mod pytest;
pub mod restassured;
pub mod robot;
pub mod selenium;
pub mod xml_report;

pub use application::{AppLogFormat, ApplicationLogAdapter};

use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

/// Contract every framework adapter implements.
pub trait FrameworkAdapter: Send + Sync {
    /// Stable adapter name used in configuration and output.
    fn name(&self) -> &'static str;

    /// Cheap signature check; must not fail on any input.
    fn can_handle(&self, raw_log: &str) -> bool;

    /// Best-effort extraction. Malformed fragments are skipped with a
    /// parse warning; the adapter never aborts.
    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent>;
}

/// Ordered adapter set used for auto-detection.
///
/// The order is part of the contract: most specific signatures first,
/// Generic last, ties broken by declaration order. Two identical inputs
/// always resolve to the same adapter.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn FrameworkAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(xml_report::JunitXmlAdapter::new()),
                Box::new(xml_report::TestNgXmlAdapter::new()),
                Box::new(xml_report::NunitXmlAdapter::new()),
                Box::new(robot::RobotFrameworkAdapter::new()),
                Box::new(cypress::CypressAdapter::new()),
                Box::new(playwright::PlaywrightAdapter::new()),
                Box::new(selenium::SeleniumAdapter::new()),
                Box::new(restassured::RestAssuredAdapter::new()),
                Box::new(cucumber::SpecFlowAdapter::new()),
                Box::new(cucumber::BehaveAdapter::new()),
                Box::new(cucumber::CucumberAdapter::new()),
                Box::new(pytest::PytestAdapter::new()),
                Box::new(generic::GenericAdapter::new()),
            ],
        }
    }

    /// Resolve an adapter by its configured name.
    pub fn by_name(&self, name: &str) -> Option<&dyn FrameworkAdapter> {
        let wanted = name.trim().to_lowercase();
        self.adapters
            .iter()
            .map(|a| a.as_ref())
            .find(|a| a.name() == wanted)
    }

    /// Auto-detect the framework for a raw log. Falls back to Generic,
    /// which handles everything.
    pub fn detect(&self, raw_log: &str) -> &dyn FrameworkAdapter {
        for adapter in &self.adapters {
            if adapter.can_handle(raw_log) {
                return adapter.as_ref();
            }
        }
        // Generic::can_handle is always true, but keep a hard fallback.
        self.adapters
            .last()
            .map(|a| a.as_ref())
            .expect("registry is never empty")
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared line-level parsing helpers used across the adapter family.
pub(crate) struct LineParser {
    iso_timestamp: Regex,
    spaced_timestamp: Regex,
    clock_timestamp: Regex,
    level_token: Regex,
    exception: Regex,
}

impl LineParser {
    pub(crate) fn new() -> Self {
        Self {
            iso_timestamp: Regex::new(
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
            )
            .unwrap(),
            spaced_timestamp: Regex::new(r"\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}").unwrap(),
            clock_timestamp: Regex::new(r"\b\d{2}:\d{2}:\d{2}(?:[.,]\d+)?\b").unwrap(),
            level_token: Regex::new(
                r"\b(TRACE|DEBUG|INFO|WARNING|WARN|ERROR|ERR|SEVERE|FATAL|CRITICAL|FAIL(?:ED)?|PASS(?:ED)?)\b",
            )
            .unwrap(),
            exception: Regex::new(
                r"\b([A-Z][A-Za-z0-9_]*(?:Exception|Error))\b|^\s*([a-z_][\w.]*\.[A-Z]\w*(?:Exception|Error))\b",
            )
            .unwrap(),
        }
    }

    /// Extract and ISO-normalize a timestamp, or synthesize a monotonic
    /// offset from run start so ordering survives for bare lines.
    pub(crate) fn timestamp_or_synthetic(&self, line: &str, line_index: usize) -> String {
        self.find_timestamp(line)
            .unwrap_or_else(|| synthetic_timestamp(line_index))
    }

    pub(crate) fn find_timestamp(&self, line: &str) -> Option<String> {
        if let Some(m) = self.iso_timestamp.find(line) {
            return normalize_iso(m.as_str());
        }
        if let Some(m) = self.spaced_timestamp.find(line) {
            let canonical = m.as_str().replace('/', "-").replace(' ', "T");
            return Some(format!("{canonical}Z"));
        }
        if let Some(m) = self.clock_timestamp.find(line) {
            let clock = m.as_str().replace(',', ".");
            return Some(format!("1970-01-01T{clock}Z"));
        }
        None
    }

    /// Canonical level for a raw line, defaulting to INFO.
    pub(crate) fn detect_level(&self, line: &str) -> LogLevel {
        self.level_token
            .find(line)
            .map(|m| LogLevel::from_raw(m.as_str()))
            .unwrap_or(LogLevel::Info)
    }

    /// First exception class mentioned on the line, if any.
    pub(crate) fn find_exception(&self, line: &str) -> Option<String> {
        self.exception.captures(line).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
        })
    }
}

/// Deterministic timestamp for lines that carry none: a monotonic offset
/// from a fixed epoch keyed by line position.
pub(crate) fn synthetic_timestamp(line_index: usize) -> String {
    let base = chrono::DateTime::from_timestamp(0, 0).expect("epoch is valid");
    let at = base + chrono::Duration::milliseconds(line_index as i64);
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Stack-trace continuation lines: indented frames, `at ...`, `File ...`,
/// caret markers and cause chains.
pub(crate) fn is_continuation_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    (line.starts_with(' ') || line.starts_with('\t'))
        || trimmed.starts_with("at ")
        || trimmed.starts_with("File \"")
        || trimmed.starts_with("Traceback")
        || trimmed.starts_with("Caused by:")
        || trimmed.starts_with("raise ")
        || trimmed.starts_with("^")
        || trimmed.starts_with("...")
}

fn normalize_iso(raw: &str) -> Option<String> {
    let canonical = raw.replace(',', ".").replace(' ', "T");
    let with_zone = if canonical.ends_with('Z')
        || canonical.contains('+')
        || canonical.rfind('-').map_or(false, |i| i > 10)
    {
        canonical
    } else {
        format!("{canonical}Z")
    };
    Some(with_zone)
}
