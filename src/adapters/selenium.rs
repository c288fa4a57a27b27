//! Selenium WebDriver log adapter (console output of Selenium-driven
//! suites, Python or Java bindings).

use super::{is_continuation_line, FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

pub struct SeleniumAdapter {
    line_parser: LineParser,
    signature: Regex,
    py_frame: Regex,
    test_frame: Regex,
}

impl SeleniumAdapter {
    pub fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            signature: Regex::new(
                r"(?i)selenium|webdriver|chromedriver|geckodriver|NoSuchElement|ElementNotInteractable|StaleElement",
            )
            .unwrap(),
            py_frame: Regex::new(r#"File "(?P<file>[^"]+)", line (?P<line>\d+), in (?P<func>\w+)"#)
                .unwrap(),
            test_frame: Regex::new(r"^test[_A-Z]").unwrap(),
        }
    }

    /// Pull test identity out of the deepest test-looking frame.
    fn annotate_from_stack(&self, event: &mut ExecutionEvent, stack: &str) {
        for caps in self.py_frame.captures_iter(stack) {
            let func = &caps["func"];
            if self.test_frame.is_match(func) {
                event.test_name = Some(func.to_string());
                event.test_file = Some(caps["file"].to_string());
                event
                    .metadata
                    .insert("failure_line".to_string(), caps["line"].to_string());
            }
        }
    }
}

impl Default for SeleniumAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for SeleniumAdapter {
    fn name(&self) -> &'static str {
        "selenium"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        self.signature.is_match(raw_log)
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        let mut events: Vec<ExecutionEvent> = Vec::new();
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
            let starts_traceback = trimmed.starts_with("Traceback (most recent call last):");

            if exception.is_some() || starts_traceback {
                // Accumulate the whole multi-line trace under one event.
                let mut stack_lines = vec![line.to_string()];
                let mut cursor = index + 1;
                while cursor < lines.len() && is_continuation_line(lines[cursor]) {
                    stack_lines.push(lines[cursor].to_string());
                    cursor += 1;
                }
                // Python tracebacks end with the exception line itself.
                let mut final_exception = exception.clone();
                if cursor < lines.len() {
                    if let Some(exc) = self.line_parser.find_exception(lines[cursor]) {
                        if starts_traceback {
                            stack_lines.push(lines[cursor].to_string());
                            final_exception = Some(exc);
                            cursor += 1;
                        }
                    }
                }

                let message = stack_lines
                    .iter()
                    .rev()
                    .find(|l| self.line_parser.find_exception(l).is_some())
                    .unwrap_or(&stack_lines[0])
                    .trim()
                    .to_string();

                let mut event = ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    LogLevel::Error,
                    "selenium",
                    message,
                );
                event.exception_type = final_exception;
                let stack = stack_lines.join("\n");
                self.annotate_from_stack(&mut event, &stack);
                event.stacktrace = Some(stack);
                events.push(event);
                index = cursor;
                continue;
            }

            let level = self.line_parser.detect_level(line);
            if level >= LogLevel::Warn {
                events.push(ExecutionEvent::automation(
                    self.line_parser.timestamp_or_synthetic(line, index),
                    level,
                    "selenium",
                    trimmed.to_string(),
                ));
            }
            index += 1;
        }

        events
    }
}
