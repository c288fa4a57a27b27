//! Playwright test-runner output adapter.

use super::{FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

pub struct PlaywrightAdapter {
    line_parser: LineParser,
    result_line: Regex,
    failure_header: Regex,
    location_line: Regex,
}

impl PlaywrightAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            result_line: Regex::new(
                r"^[✓✘x×-]\s+\d+\s+\[(?P<project>\w+)\]\s+›\s+(?P<file>\S+?):\d+:\d+\s+›\s+(?P<test>.+?)(?:\s+\(\S+\))?$",
            )
            .unwrap(),
            failure_header: Regex::new(
                r"^\d+\)\s+\[(?P<project>\w+)\]\s+›\s+(?P<file>\S+?):(?P<line>\d+):\d+\s+›\s+(?P<test>.+?)\s*─*$",
            )
            .unwrap(),
            location_line: Regex::new(r"^at\s+(?P<file>[\w./\\-]+):(?P<line>\d+):\d+").unwrap(),
        }
    }
}

impl Default for PlaywrightAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for PlaywrightAdapter {
    fn name(&self) -> &'static str {
        "playwright"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        let lowered = raw_log.to_lowercase();
        lowered.contains("playwright")
            || (raw_log.contains("Running ") && raw_log.contains(" tests using "))
            || raw_log.contains("] › ")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut failure: Option<ExecutionEvent> = None;
        let mut failure_lines: Vec<String> = Vec::new();

        let mut flush = |failure: &mut Option<ExecutionEvent>,
                         lines: &mut Vec<String>,
                         events: &mut Vec<ExecutionEvent>| {
            if let Some(mut event) = failure.take() {
                let parser = LineParser::new();
                if let Some(first) = lines.iter().map(|l| l.trim()).find(|l| !l.is_empty()) {
                    event.message = first.to_string();
                }
                event.exception_type = lines.iter().find_map(|l| parser.find_exception(l));
                if !lines.is_empty() {
                    event.stacktrace = Some(lines.join("\n"));
                }
                events.push(event);
                lines.clear();
            }
        };

        for (index, line) in raw_log.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(caps) = self.failure_header.captures(trimmed) {
                flush(&mut failure, &mut failure_lines, &mut events);
                let mut event = ExecutionEvent::automation(
                    super::synthetic_timestamp(index),
                    LogLevel::Error,
                    "playwright",
                    trimmed.to_string(),
                );
                event.test_name = Some(caps["test"].trim().to_string());
                event.test_file = Some(caps["file"].to_string());
                event
                    .metadata
                    .insert("failure_line".to_string(), caps["line"].to_string());
                event
                    .metadata
                    .insert("project".to_string(), caps["project"].to_string());
                failure = Some(event);
                continue;
            }

            if failure.is_some() {
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(caps) = self.location_line.captures(trimmed) {
                    if let Some(event) = failure.as_mut() {
                        event
                            .metadata
                            .insert("failure_line".to_string(), caps["line"].to_string());
                    }
                }
                failure_lines.push(line.to_string());
                continue;
            }

            if let Some(caps) = self.result_line.captures(trimmed) {
                let failed = trimmed.starts_with('✘')
                    || trimmed.starts_with('x')
                    || trimmed.starts_with('×');
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    if failed { LogLevel::Error } else { LogLevel::Info },
                    "playwright",
                    trimmed.to_string(),
                );
                event.test_name = Some(caps["test"].trim().to_string());
                event.test_file = Some(caps["file"].to_string());
                event
                    .metadata
                    .insert("project".to_string(), caps["project"].to_string());
                events.push(event);
            } else if self.line_parser.detect_level(line) >= LogLevel::Warn && !trimmed.is_empty() {
                events.push(ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    self.line_parser.detect_level(line),
                    "playwright",
                    trimmed.to_string(),
                ));
            }
        }

        flush(&mut failure, &mut failure_lines, &mut events);
        events
    }
}
