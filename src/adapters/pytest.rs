//! pytest console output adapter.

use super::{is_continuation_line, FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;
use tracing::warn;

pub struct PytestAdapter {
    line_parser: LineParser,
    status_line: Regex,
    failure_header: Regex,
    location_line: Regex,
    summary_line: Regex,
}

impl PytestAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            status_line: Regex::new(
                r"^(?P<file>[\w./\\-]+\.py)::(?P<test>[\w\[\]\-.]+)\s+(?P<status>PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)",
            )
            .unwrap(),
            failure_header: Regex::new(r"^_{3,}\s*(?P<test>[\w\[\]\-.]+)\s*_{3,}$").unwrap(),
            location_line: Regex::new(
                r"^(?P<file>[\w./\\-]+\.py):(?P<line>\d+):\s*(?P<exc>\w+(?:Error|Exception))",
            )
            .unwrap(),
            summary_line: Regex::new(
                r"^(?P<status>FAILED|ERROR)\s+(?P<file>[\w./\\-]+\.py)::(?P<test>[\w\[\]\-.]+)(?:\s+-\s+(?P<msg>.*))?$",
            )
            .unwrap(),
        }
    }

    fn push_failure_block(
        &self,
        events: &mut Vec<ExecutionEvent>,
        test_name: &str,
        block: &[String],
        line_index: usize,
    ) {
        if block.is_empty() {
            return;
        }
        let error_lines: Vec<&str> = block
            .iter()
            .filter(|l| l.trim_start().starts_with("E "))
            .map(|l| l.trim_start().trim_start_matches("E ").trim())
            .collect();
        let location = block
            .iter()
            .rev()
            .find_map(|l| self.location_line.captures(l.trim()));

        let message = if let Some(first) = error_lines.first() {
            (*first).to_string()
        } else {
            block.last().map(|l| l.trim().to_string()).unwrap_or_default()
        };

        let mut event = ExecutionEvent::automation(
            super::synthetic_timestamp(line_index),
            LogLevel::Error,
            "pytest",
            message,
        );
        event.test_name = Some(test_name.to_string());
        event.stacktrace = Some(block.join("\n"));
        if let Some(caps) = location {
            event.test_file = Some(caps["file"].to_string());
            event.exception_type = Some(caps["exc"].to_string());
            event
                .metadata
                .insert("failure_line".to_string(), caps["line"].to_string());
        }
        events.push(event);
    }
}

impl Default for PytestAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for PytestAdapter {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        raw_log.contains("test session starts")
            || raw_log.contains("short test summary info")
            || raw_log
                .lines()
                .take(200)
                .any(|l| self.status_line.is_match(l))
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut in_failures = false;
        let mut current_test: Option<String> = None;
        let mut block: Vec<String> = Vec::new();
        let mut block_start = 0usize;

        for (index, line) in raw_log.lines().enumerate() {
            if line.contains("= FAILURES =") || line.contains("= ERRORS =") {
                in_failures = true;
                continue;
            }
            if line.contains("short test summary info") || line.contains("= warnings summary =") {
                if let Some(test) = current_test.take() {
                    self.push_failure_block(&mut events, &test, &block, block_start);
                    block.clear();
                }
                in_failures = false;
                continue;
            }

            if in_failures {
                if let Some(caps) = self.failure_header.captures(line.trim()) {
                    if let Some(test) = current_test.take() {
                        self.push_failure_block(&mut events, &test, &block, block_start);
                        block.clear();
                    }
                    current_test = Some(caps["test"].to_string());
                    block_start = index;
                } else if current_test.is_some() {
                    block.push(line.to_string());
                }
                continue;
            }

            if let Some(caps) = self.status_line.captures(line.trim()) {
                let status = &caps["status"];
                let level = match status {
                    "FAILED" | "ERROR" => LogLevel::Error,
                    "XFAIL" | "SKIPPED" => LogLevel::Warn,
                    _ => LogLevel::Info,
                };
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    level,
                    "pytest",
                    line.trim().to_string(),
                );
                event.test_name = Some(caps["test"].to_string());
                event.test_file = Some(caps["file"].to_string());
                event
                    .metadata
                    .insert("test_status".to_string(), status.to_string());
                events.push(event);
            } else if let Some(caps) = self.summary_line.captures(line.trim()) {
                let message = caps
                    .name("msg")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| line.trim().to_string());
                let mut event = ExecutionEvent::automation(
                    super::synthetic_timestamp(index),
                    LogLevel::Error,
                    "pytest",
                    message,
                );
                event.test_name = Some(caps["test"].to_string());
                event.test_file = Some(caps["file"].to_string());
                event.exception_type = self.line_parser.find_exception(line);
                event
                    .metadata
                    .insert("test_status".to_string(), caps["status"].to_string());
                events.push(event);
            } else if let Some(detail) = line.trim().strip_prefix("E ") {
                // Error-detail line outside a tracked failure block.
                let mut event = ExecutionEvent::automation(
                    super::synthetic_timestamp(index),
                    LogLevel::Error,
                    "pytest",
                    detail.trim().to_string(),
                );
                event.exception_type = self.line_parser.find_exception(detail);
                events.push(event);
            } else if !line.trim().is_empty()
                && !line.starts_with('=')
                && !is_continuation_line(line)
                && self.line_parser.detect_level(line) >= LogLevel::Warn
            {
                // Free-form warning or error emitted between test lines.
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    self.line_parser.detect_level(line),
                    "pytest",
                    line.trim().to_string(),
                );
                event.exception_type = self.line_parser.find_exception(line);
                events.push(event);
            }
        }

        if let Some(test) = current_test.take() {
            self.push_failure_block(&mut events, &test, &block, block_start);
        }

        if events.is_empty() && !raw_log.trim().is_empty() {
            warn!("pytest adapter recovered no events from non-empty log");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"============================= test session starts ==============================
platform linux -- Python 3.11.4, pytest-7.4.0
collected 2 items

tests/test_payment.py::test_charge FAILED                                [ 50%]
tests/test_payment.py::test_refund PASSED                                [100%]

=================================== FAILURES ===================================
_________________________________ test_charge __________________________________

    def test_charge():
>       assert response.status_code == 200
E       assert 500 == 200
E        +  where 500 = <Response [500]>.status_code

tests/test_payment.py:42: AssertionError
=========================== short test summary info ============================
FAILED tests/test_payment.py::test_charge - assert 500 == 200
"#;

    #[test]
    fn test_can_handle_recognizes_session_banner() {
        let adapter = PytestAdapter::new();
        assert!(adapter.can_handle(SAMPLE));
        assert!(!adapter.can_handle("plain log with nothing pytest-like"));
    }

    #[test]
    fn test_parse_extracts_status_and_failure_block() {
        let adapter = PytestAdapter::new();
        let events = adapter.parse(SAMPLE);

        let failed: Vec<_> = events
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .collect();
        assert!(!failed.is_empty());

        let block = events
            .iter()
            .find(|e| e.stacktrace.is_some())
            .expect("failure block event");
        assert_eq!(block.test_name.as_deref(), Some("test_charge"));
        assert_eq!(block.test_file.as_deref(), Some("tests/test_payment.py"));
        assert_eq!(block.exception_type.as_deref(), Some("AssertionError"));
        assert_eq!(block.metadata.get("failure_line").map(String::as_str), Some("42"));
        assert!(block.message.contains("assert 500 == 200"));
    }

    #[test]
    fn test_parse_never_fails_on_garbage() {
        let adapter = PytestAdapter::new();
        let events = adapter.parse("== FAILURES ==\n\u{0}\u{1}broken\n____ ____\n");
        // garbage yields zero or more events, never a panic
        assert!(events.len() < 10);
    }

    #[test]
    fn test_empty_log_yields_no_events() {
        let adapter = PytestAdapter::new();
        assert!(adapter.parse("").is_empty());
    }
}
