//! Generic fallback adapter: any text log nobody else claimed.

use super::{is_continuation_line, FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};

pub struct GenericAdapter {
    line_parser: LineParser,
}

impl GenericAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
        }
    }
}

impl Default for GenericAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for GenericAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn can_handle(&self, _raw_log: &str) -> bool {
        true
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let lines: Vec<&str> = raw_log.lines().collect();
        let mut index = 0usize;

        while index < lines.len() {
            let line = lines[index];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                index += 1;
                continue;
            }

            let exception = self.line_parser.find_exception(line);
            let level = self.line_parser.detect_level(line);

            if exception.is_some() {
                let mut stack_lines = vec![line.to_string()];
                let mut cursor = index + 1;
                while cursor < lines.len() && is_continuation_line(lines[cursor]) {
                    stack_lines.push(lines[cursor].to_string());
                    cursor += 1;
                }
                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    LogLevel::Error,
                    "generic",
                    trimmed.to_string(),
                );
                event.exception_type = exception;
                if stack_lines.len() > 1 {
                    event.stacktrace = Some(stack_lines.join("\n"));
                }
                events.push(event);
                index = cursor;
                continue;
            }

            if level >= LogLevel::Warn {
                events.push(ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    level,
                    "generic",
                    trimmed.to_string(),
                ));
            }
            index += 1;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_anything() {
        let adapter = GenericAdapter::new();
        assert!(adapter.can_handle(""));
        assert!(adapter.can_handle("any text at all"));
    }

    #[test]
    fn test_only_warn_and_above_become_events() {
        let adapter = GenericAdapter::new();
        let log = "2024-01-01 10:00:00 INFO all good\n2024-01-01 10:00:01 ERROR database timeout\n2024-01-01 10:00:02 WARN retrying\n";
        let events = adapter.parse(log);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, LogLevel::Error);
        assert_eq!(events[1].level, LogLevel::Warn);
    }

    #[test]
    fn test_exception_with_stack_is_one_event() {
        let adapter = GenericAdapter::new();
        let log = "OutOfMemoryError: heap space\n    at com.example.Loader.load(Loader.java:10)\n    at com.example.Main.main(Main.java:3)\n";
        let events = adapter.parse(log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].exception_type.as_deref(), Some("OutOfMemoryError"));
        assert!(events[0].stacktrace.as_deref().unwrap().contains("Loader.java"));
    }
}
