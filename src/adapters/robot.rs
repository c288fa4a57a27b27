//! Robot Framework console output adapter.

use super::{FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

pub struct RobotFrameworkAdapter {
    line_parser: LineParser,
    verdict_line: Regex,
    suite_stats: Regex,
}

impl RobotFrameworkAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            verdict_line: Regex::new(r"^(?P<test>.+?)\s+\|\s+(?P<verdict>PASS|FAIL|SKIP)\s+\|")
                .unwrap(),
            suite_stats: Regex::new(r"^\d+ tests?, \d+ passed, \d+ failed").unwrap(),
        }
    }
}

impl Default for RobotFrameworkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for RobotFrameworkAdapter {
    fn name(&self) -> &'static str {
        "robot"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        let has_verdicts = raw_log.contains("| PASS |") || raw_log.contains("| FAIL |");
        has_verdicts
            || raw_log.contains("Robot Framework")
            || (raw_log.contains("====") && raw_log.lines().any(|l| self.suite_stats.is_match(l.trim())))
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut current_suite: Option<String> = None;
        let mut pending_failure: Option<usize> = None;

        let lines: Vec<&str> = raw_log.lines().collect();
        for (index, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.chars().all(|c| c == '=' || c == '-') {
                continue;
            }

            // Suite banner: the line between two ==== rules with no verdict.
            if index > 0
                && lines[index - 1].trim_start().starts_with("====")
                && !trimmed.contains('|')
            {
                current_suite = Some(trimmed.to_string());
                continue;
            }

            if let Some(caps) = self.verdict_line.captures(trimmed) {
                let test = caps["test"].trim().to_string();
                let verdict = &caps["verdict"];
                // Suite-level verdict lines repeat the suite name; skip them.
                if current_suite.as_deref() == Some(test.as_str()) {
                    continue;
                }
                let level = match verdict {
                    "FAIL" => LogLevel::Error,
                    "SKIP" => LogLevel::Warn,
                    _ => LogLevel::Info,
                };
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    level,
                    "robot",
                    trimmed.to_string(),
                );
                event.test_name = Some(test);
                if let Some(suite) = &current_suite {
                    event.metadata.insert("suite".to_string(), suite.clone());
                }
                event
                    .metadata
                    .insert("test_status".to_string(), verdict.to_string());
                if verdict == "FAIL" {
                    pending_failure = Some(events.len());
                }
                events.push(event);
                continue;
            }

            // The line after a FAIL verdict carries the failure message.
            if let Some(failed_index) = pending_failure.take() {
                if !self.suite_stats.is_match(trimmed) {
                    let exception = self.line_parser.find_exception(trimmed);
                    let mut event = ExecutionEvent::automation(
                        super::synthetic_timestamp(index),
                        LogLevel::Error,
                        "robot",
                        trimmed.to_string(),
                    );
                    event.test_name = events[failed_index].test_name.clone();
                    event.exception_type = exception;
                    if let Some(suite) = &current_suite {
                        event.metadata.insert("suite".to_string(), suite.clone());
                    }
                    events.push(event);
                }
                continue;
            }

            if self.line_parser.detect_level(trimmed) >= LogLevel::Warn
                && !self.suite_stats.is_match(trimmed)
            {
                events.push(ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    self.line_parser.detect_level(trimmed),
                    "robot",
                    trimmed.to_string(),
                ));
            }
        }

        events
    }
}
