//! Application (service) log parsers: log4j/slf4j, .NET, Python logging,
//! structured JSON and generic text.
//!
//! Events come out tagged APPLICATION with `service_name` from
//! configuration. This path is purely additive: malformed lines are
//! skipped, and a missing file upstream yields an empty event list.

use super::LineParser;
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;
use serde_json::Value;

/// Known service-log layouts. `Auto` sniffs per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLogFormat {
    Log4j,
    DotNet,
    PythonLogging,
    Json,
    Generic,
    Auto,
}

pub struct ApplicationLogAdapter {
    line_parser: LineParser,
    log4j_line: Regex,
    dotnet_line: Regex,
    python_line: Regex,
}

impl ApplicationLogAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            log4j_line: Regex::new(
                r"^(?P<ts>\S+[ T]\S+)\s+(?P<level>TRACE|DEBUG|INFO|WARN|ERROR|FATAL)\s+(?:\[(?P<thread>[^\]]*)\]\s+)?(?P<logger>[\w.$]+)\s*(?:-|:)\s*(?P<msg>.*)$",
            )
            .unwrap(),
            dotnet_line: Regex::new(
                r"^(?P<ts>[\d\-./: ,]+)\|(?P<level>TRACE|DEBUG|INFO|WARN|ERROR|FATAL)\|(?P<logger>[^|]+)\|(?P<msg>.*)$",
            )
            .unwrap(),
            python_line: Regex::new(
                r"^(?P<ts>\S+[ T]\S+)\s+-\s+(?P<logger>[\w.]+)\s+-\s+(?P<level>DEBUG|INFO|WARNING|ERROR|CRITICAL)\s+-\s+(?P<msg>.*)$",
            )
            .unwrap(),
        }
    }

    /// Pick the layout that matches the first few parseable lines.
    pub fn sniff_format(&self, raw_log: &str) -> AppLogFormat {
        for line in raw_log.lines().filter(|l| !l.trim().is_empty()).take(10) {
            let trimmed = line.trim();
            if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
                return AppLogFormat::Json;
            }
            if self.dotnet_line.is_match(trimmed) {
                return AppLogFormat::DotNet;
            }
            if self.python_line.is_match(trimmed) {
                return AppLogFormat::PythonLogging;
            }
            if self.log4j_line.is_match(trimmed) {
                return AppLogFormat::Log4j;
            }
        }
        AppLogFormat::Generic
    }

    pub fn parse(
        &self,
        raw_log: &str,
        service_name: &str,
        format: AppLogFormat,
    ) -> Vec<ExecutionEvent> {
        let format = if format == AppLogFormat::Auto {
            self.sniff_format(raw_log)
        } else {
            format
        };

        let mut events = Vec::new();
        for (index, line) in raw_log.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed = match format {
                AppLogFormat::Json => self.parse_json_line(trimmed, service_name),
                AppLogFormat::DotNet => self.parse_structured(
                    &self.dotnet_line,
                    trimmed,
                    service_name,
                    index,
                ),
                AppLogFormat::PythonLogging => {
                    self.parse_structured(&self.python_line, trimmed, service_name, index)
                }
                AppLogFormat::Log4j => {
                    self.parse_structured(&self.log4j_line, trimmed, service_name, index)
                }
                AppLogFormat::Generic | AppLogFormat::Auto => {
                    Some(self.parse_generic_line(trimmed, service_name, index))
                }
            };
            match parsed {
                Some(mut event) => {
                    if event.exception_type.is_none() {
                        event.exception_type = self.line_parser.find_exception(trimmed);
                    }
                    events.push(event);
                }
                // Continuation lines (stack frames) extend the previous event.
                None => {
                    if super::is_continuation_line(line) {
                        if let Some(previous) = events.last_mut() {
                            let stack = previous.stacktrace.get_or_insert_with(String::new);
                            if !stack.is_empty() {
                                stack.push('\n');
                            }
                            stack.push_str(line);
                            if previous.exception_type.is_none() {
                                previous.exception_type = self.line_parser.find_exception(line);
                            }
                        }
                    }
                    // Anything else is a malformed fragment: skipped.
                }
            }
        }
        events
    }

    fn parse_structured(
        &self,
        pattern: &Regex,
        line: &str,
        service_name: &str,
        index: usize,
    ) -> Option<ExecutionEvent> {
        let caps = pattern.captures(line)?;
        let timestamp = self
            .line_parser
            .find_timestamp(line)
            .unwrap_or_else(|| super::synthetic_timestamp(index));
        let mut event = ExecutionEvent::application(
            timestamp,
            LogLevel::from_raw(&caps["level"]),
            service_name,
            caps["msg"].trim().to_string(),
        );
        event
            .metadata
            .insert("logger".to_string(), caps["logger"].trim().to_string());
        Some(event)
    }

    fn parse_json_line(&self, line: &str, service_name: &str) -> Option<ExecutionEvent> {
        let value: Value = serde_json::from_str(line).ok()?;
        let object = value.as_object()?;
        let message = object
            .get("message")
            .or_else(|| object.get("msg"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let level = object
            .get("level")
            .or_else(|| object.get("severity"))
            .and_then(Value::as_str)
            .map(LogLevel::from_raw)
            .unwrap_or(LogLevel::Info);
        let timestamp = object
            .get("timestamp")
            .or_else(|| object.get("time"))
            .or_else(|| object.get("@timestamp"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| super::synthetic_timestamp(0));

        let mut event = ExecutionEvent::application(timestamp, level, service_name, message);
        if let Some(exception) = object
            .get("exception")
            .or_else(|| object.get("error"))
            .and_then(Value::as_str)
        {
            event.exception_type = self
                .line_parser
                .find_exception(exception)
                .or_else(|| Some(exception.to_string()));
        }
        if let Some(stack) = object.get("stack_trace").and_then(Value::as_str) {
            event.stacktrace = Some(stack.to_string());
        }
        Some(event)
    }

    fn parse_generic_line(
        &self,
        line: &str,
        service_name: &str,
        index: usize,
    ) -> ExecutionEvent {
        ExecutionEvent::application(
            self.line_parser.timestamp_or_synthetic(line, index),
            self.line_parser.detect_level(line),
            service_name,
            line.to_string(),
        )
    }
}

impl Default for ApplicationLogAdapter {
    fn default() -> Self {
        Self::new()
    }
}
