//! Cypress run output adapter (the reporter text Cypress prints per spec).

use super::{FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

pub struct CypressAdapter {
    line_parser: LineParser,
    running_line: Regex,
    pass_line: Regex,
    fail_ref_line: Regex,
    failure_header: Regex,
}

impl CypressAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            running_line: Regex::new(r"Running:\s+(?P<spec>\S+\.cy\.[jt]sx?)").unwrap(),
            pass_line: Regex::new(r"^[✓√]\s+(?P<test>.+?)(?:\s+\(\d+m?s\))?$").unwrap(),
            fail_ref_line: Regex::new(r"^(?P<num>\d+)\)\s+(?P<test>.+?)$").unwrap(),
            failure_header: Regex::new(r"^(?P<num>\d+)\)\s+(?P<suite>.+)$").unwrap(),
        }
    }
}

impl Default for CypressAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for CypressAdapter {
    fn name(&self) -> &'static str {
        "cypress"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        raw_log.contains("CypressError")
            || raw_log.contains("cy.")
                && (raw_log.contains("Running:") || raw_log.to_lowercase().contains("cypress"))
            || raw_log.contains("(Run Starting)")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut current_spec: Option<String> = None;
        let mut in_failure_details = false;
        let mut failure_test: Option<String> = None;
        let mut failure_lines: Vec<String> = Vec::new();
        let mut failure_start = 0usize;

        let mut flush =
            |events: &mut Vec<ExecutionEvent>,
             test: &mut Option<String>,
             lines: &mut Vec<String>,
             spec: &Option<String>,
             start: usize| {
                if let Some(test_name) = test.take() {
                    if !lines.is_empty() {
                        let message = lines
                            .iter()
                            .map(|l| l.trim())
                            .find(|l| !l.is_empty() && !l.ends_with(':'))
                            .unwrap_or("")
                            .to_string();
                        let mut event = ExecutionEvent::automation(
                            super::synthetic_timestamp(start),
                            LogLevel::Error,
                            "cypress",
                            message,
                        );
                        event.test_name = Some(test_name);
                        event.test_file = spec.clone();
                        event.stacktrace = Some(lines.join("\n"));
                        event.exception_type = lines
                            .iter()
                            .find_map(|l| LineParser::new().find_exception(l));
                        events.push(event);
                    }
                    lines.clear();
                }
            };

        for (index, line) in raw_log.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(caps) = self.running_line.captures(line) {
                current_spec = Some(caps["spec"].to_string());
                continue;
            }

            if trimmed.ends_with("failing") && trimmed.chars().next().map_or(false, char::is_numeric)
            {
                in_failure_details = true;
                continue;
            }

            if in_failure_details {
                if let Some(caps) = self.failure_header.captures(trimmed) {
                    flush(
                        &mut events,
                        &mut failure_test,
                        &mut failure_lines,
                        &current_spec,
                        failure_start,
                    );
                    failure_test = Some(caps["suite"].trim().to_string());
                    failure_start = index;
                } else if failure_test.is_some() {
                    if trimmed.ends_with(':') && failure_lines.is_empty() {
                        // "test title:" line under the suite header refines the name
                        failure_test = failure_test
                            .map(|s| format!("{s} {}", trimmed.trim_end_matches(':').trim()));
                    } else if !trimmed.is_empty() {
                        failure_lines.push(line.to_string());
                    }
                }
                continue;
            }

            if let Some(caps) = self.pass_line.captures(trimmed) {
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    LogLevel::Info,
                    "cypress",
                    trimmed.to_string(),
                );
                event.test_name = Some(caps["test"].trim().to_string());
                event.test_file = current_spec.clone();
                events.push(event);
            } else if let Some(caps) = self.fail_ref_line.captures(trimmed) {
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    LogLevel::Error,
                    "cypress",
                    trimmed.to_string(),
                );
                event.test_name = Some(caps["test"].trim().to_string());
                event.test_file = current_spec.clone();
                events.push(event);
            } else if let Some(exception) = self.line_parser.find_exception(trimmed) {
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    LogLevel::Error,
                    "cypress",
                    trimmed.to_string(),
                );
                event.test_file = current_spec.clone();
                event.exception_type = Some(exception);
                events.push(event);
            } else if self.line_parser.detect_level(line) >= LogLevel::Warn && !trimmed.is_empty() {
                events.push(ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    self.line_parser.detect_level(line),
                    "cypress",
                    trimmed.to_string(),
                ));
            }
        }

        flush(
            &mut events,
            &mut failure_test,
            &mut failure_lines,
            &current_spec,
            failure_start,
        );
        events
    }
}
