//! RestAssured request/response log adapter (Java API-test suites).

use super::{is_continuation_line, FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

pub struct RestAssuredAdapter {
    line_parser: LineParser,
    request_line: Regex,
    status_line: Regex,
    expectation_line: Regex,
}

impl RestAssuredAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            request_line: Regex::new(r"^Request (?:method|URI):\s*(?P<value>.+)$").unwrap(),
            status_line: Regex::new(r"^HTTP/[\d.]+\s+(?P<status>\d{3})\s*(?P<reason>.*)$").unwrap(),
            expectation_line: Regex::new(
                r"Expected status code <(?P<expected>\d{3})> but was <(?P<actual>\d{3})>",
            )
            .unwrap(),
        }
    }
}

impl Default for RestAssuredAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for RestAssuredAdapter {
    fn name(&self) -> &'static str {
        "restassured"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        raw_log.contains("io.restassured")
            || (raw_log.contains("Request method:") && raw_log.contains("Request URI:"))
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut method: Option<String> = None;
        let mut uri: Option<String> = None;

        let lines: Vec<&str> = raw_log.lines().collect();
        let mut index = 0usize;
        while index < lines.len() {
            let trimmed = lines[index].trim();

            if let Some(caps) = self.request_line.captures(trimmed) {
                let value = caps["value"].trim().to_string();
                if trimmed.starts_with("Request method:") {
                    method = Some(value);
                } else {
                    uri = Some(value);
                }
                index += 1;
                continue;
            }

            if let Some(caps) = self.status_line.captures(trimmed) {
                let status: u16 = caps["status"].parse().unwrap_or(0);
                let level = if status >= 400 {
                    LogLevel::Error
                } else {
                    LogLevel::Info
                };
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(lines[index], index),
                    level,
                    "restassured",
                    trimmed.to_string(),
                );
                event
                    .metadata
                    .insert("http_status".to_string(), status.to_string());
                if let Some(m) = &method {
                    event.metadata.insert("http_method".to_string(), m.clone());
                }
                if let Some(u) = &uri {
                    event.metadata.insert("http_url".to_string(), u.clone());
                }
                events.push(event);
                index += 1;
                continue;
            }

            if let Some(exception) = self.line_parser.find_exception(trimmed) {
                let mut stack_lines = vec![lines[index].to_string()];
                let mut cursor = index + 1;
                while cursor < lines.len()
                    && (is_continuation_line(lines[cursor])
                        || self.expectation_line.is_match(lines[cursor].trim()))
                {
                    stack_lines.push(lines[cursor].to_string());
                    cursor += 1;
                }
                let message = stack_lines
                    .iter()
                    .map(|l| l.trim())
                    .find(|l| self.expectation_line.is_match(l))
                    .unwrap_or(trimmed)
                    .to_string();
                let mut event = ExecutionEvent::automation(
                    super::synthetic_timestamp(index),
                    LogLevel::Error,
                    "restassured",
                    message,
                );
                event.exception_type = Some(exception);
                event.stacktrace = Some(stack_lines.join("\n"));
                if let Some(caps) = stack_lines
                    .iter()
                    .find_map(|l| self.expectation_line.captures(l))
                {
                    event
                        .metadata
                        .insert("expected_status".to_string(), caps["expected"].to_string());
                    event
                        .metadata
                        .insert("http_status".to_string(), caps["actual"].to_string());
                }
                if let Some(m) = &method {
                    event.metadata.insert("http_method".to_string(), m.clone());
                }
                if let Some(u) = &uri {
                    event.metadata.insert("http_url".to_string(), u.clone());
                }
                events.push(event);
                index = cursor;
                continue;
            }

            index += 1;
        }

        events
    }
}
