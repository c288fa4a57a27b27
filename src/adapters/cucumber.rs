//! Gherkin-family adapters: Cucumber, SpecFlow and Behave console output.
//!
//! The three frameworks share Feature/Scenario/step structure and differ
//! in how step verdicts are rendered; the shared walker handles the
//! structure and each adapter supplies its verdict detection.

use super::{FrameworkAdapter, LineParser};
use crate::models::{ExecutionEvent, LogLevel};
use regex::Regex;

struct GherkinWalker {
    line_parser: LineParser,
    feature_line: Regex,
    scenario_line: Regex,
    location_suffix: Regex,
}

#[derive(Debug, PartialEq)]
enum StepVerdict {
    Passed,
    Failed(String),
    None,
}

impl GherkinWalker {
    fn new() -> Self {
        Self {
            line_parser: LineParser::new(),
            feature_line: Regex::new(r"^Feature:\s*(?P<name>.+?)(?:\s+#.*)?$").unwrap(),
            scenario_line: Regex::new(
                r"^Scenario(?: Outline)?:\s*(?P<name>.+?)(?:\s+#\s*(?P<loc>\S+))?$",
            )
            .unwrap(),
            location_suffix: Regex::new(r"#\s*(?P<file>[\w./\\-]+\.feature):(?P<line>\d+)")
                .unwrap(),
        }
    }

    fn walk(
        &self,
        raw_log: &str,
        source: &'static str,
        verdict_of: impl Fn(&str) -> StepVerdict,
    ) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        let mut feature: Option<String> = None;
        let mut scenario: Option<String> = None;
        let mut scenario_file: Option<String> = None;
        let mut last_step: Option<String> = None;

        for (index, line) in raw_log.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(caps) = self.feature_line.captures(trimmed) {
                feature = Some(caps["name"].trim().to_string());
                continue;
            }
            if let Some(caps) = self.scenario_line.captures(trimmed) {
                scenario = Some(caps["name"].trim().to_string());
                scenario_file = self
                    .location_suffix
                    .captures(trimmed)
                    .map(|c| c["file"].to_string());
                continue;
            }

            match verdict_of(trimmed) {
                StepVerdict::Failed(detail) => {
                    let mut event = ExecutionEvent::automation(
                        self.line_parser.timestamp_or_synthetic(line, index),
                        LogLevel::Error,
                        source,
                        detail,
                    );
                    event.test_name = scenario.clone();
                    event.test_file = scenario_file.clone();
                    event.exception_type = self.line_parser.find_exception(trimmed);
                    if let Some(feature_name) = &feature {
                        event
                            .metadata
                            .insert("feature".to_string(), feature_name.clone());
                    }
                    if let Some(step) = &last_step {
                        event.metadata.insert("step".to_string(), step.clone());
                    }
                    events.push(event);
                }
                StepVerdict::Passed => {}
                StepVerdict::None => {
                    let is_step = trimmed.starts_with("Given ")
                        || trimmed.starts_with("When ")
                        || trimmed.starts_with("Then ")
                        || trimmed.starts_with("And ")
                        || trimmed.starts_with("But ");
                    if is_step {
                        last_step = Some(
                            self.location_suffix
                                .replace(trimmed, "")
                                .trim()
                                .to_string(),
                        );
                    } else if self.line_parser.find_exception(trimmed).is_some() {
                        // Bare exception line after a failing step.
                        let mut event = ExecutionEvent::automation(
                            super::synthetic_timestamp(index),
                            LogLevel::Error,
                            source,
                            trimmed.to_string(),
                        );
                        event.test_name = scenario.clone();
                        event.test_file = scenario_file.clone();
                        event.exception_type = self.line_parser.find_exception(trimmed);
                        if let Some(step) = &last_step {
                            event.metadata.insert("step".to_string(), step.clone());
                        }
                        events.push(event);
                    }
                }
            }
        }
        events
    }
}

/// Cucumber (Ruby/JS) console output.
pub struct CucumberAdapter {
    walker: GherkinWalker,
}

impl CucumberAdapter {
    pub fn new() -> Self {
        Self {
            walker: GherkinWalker::new(),
        }
    }
}

impl Default for CucumberAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for CucumberAdapter {
    fn name(&self) -> &'static str {
        "cucumber"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        (raw_log.contains("Failing Scenarios:") || raw_log.contains("cucumber "))
            && raw_log.contains("Scenario:")
            || (raw_log.contains("Feature:")
                && raw_log.contains("Scenario:")
                && raw_log.contains(".feature:"))
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        self.walker.walk(raw_log, "cucumber", |line| {
            if line.starts_with("expected") || line.starts_with("got:") {
                StepVerdict::Failed(line.to_string())
            } else {
                StepVerdict::None
            }
        })
    }
}

/// SpecFlow (.NET) console output with `-> done:` / `-> error:` markers.
pub struct SpecFlowAdapter {
    walker: GherkinWalker,
}

impl SpecFlowAdapter {
    pub fn new() -> Self {
        Self {
            walker: GherkinWalker::new(),
        }
    }
}

impl Default for SpecFlowAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for SpecFlowAdapter {
    fn name(&self) -> &'static str {
        "specflow"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        raw_log.contains("-> done:") || raw_log.contains("-> error:") || raw_log.contains("TechTalk.SpecFlow")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        self.walker.walk(raw_log, "specflow", |line| {
            if let Some(detail) = line.strip_prefix("-> error:") {
                StepVerdict::Failed(detail.trim().to_string())
            } else if line.starts_with("-> done:") || line.starts_with("-> skipped") {
                StepVerdict::Passed
            } else {
                StepVerdict::None
            }
        })
    }
}

/// Behave (Python) console output with `... passed` / `... failed` markers.
pub struct BehaveAdapter {
    walker: GherkinWalker,
}

impl BehaveAdapter {
    pub fn new() -> Self {
        Self {
            walker: GherkinWalker::new(),
        }
    }
}

impl Default for BehaveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for BehaveAdapter {
    fn name(&self) -> &'static str {
        "behave"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        raw_log.contains("Assertion Failed:")
            || (raw_log.contains("Feature:")
                && (raw_log.contains("... failed") || raw_log.contains("... passed")))
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        self.walker.walk(raw_log, "behave", |line| {
            if let Some(detail) = line.strip_prefix("Assertion Failed:") {
                StepVerdict::Failed(format!("Assertion Failed:{detail}"))
            } else if line.ends_with("... failed") {
                StepVerdict::Failed(line.to_string())
            } else if line.ends_with("... passed") {
                StepVerdict::Passed
            } else {
                StepVerdict::None
            }
        })
    }
}
