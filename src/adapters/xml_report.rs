//! XML suite-report adapters: JUnit, TestNG and NUnit result files.
//!
//! One event per test case, plus a FAILURE event per `<failure>` /
//! `<error>` child carrying the exception details. Structural corruption
//! ends parsing with whatever was recovered.

use super::{synthetic_timestamp, FrameworkAdapter};
use crate::models::{ExecutionEvent, LogLevel};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Default, Clone)]
struct CaseState {
    name: String,
    class_name: Option<String>,
    file: Option<String>,
    time: Option<String>,
    failed: bool,
}

fn attributes_of(start: &BytesStart<'_>) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if let Ok(value) = attr.unescape_value() {
            attrs.insert(key, value.to_string());
        }
    }
    attrs
}

/// Shared walker over JUnit-shaped XML. TestNG and NUnit use different
/// element names for the same structure; the sets below cover all three.
fn parse_suite_xml(raw_log: &str, source: &'static str) -> Vec<ExecutionEvent> {
    const CASE_ELEMENTS: [&str; 3] = ["testcase", "test-case", "test-method"];
    const FAILURE_ELEMENTS: [&str; 3] = ["failure", "error", "exception"];

    let mut events = Vec::new();
    let mut reader = Reader::from_str(raw_log);
    reader.config_mut().trim_text(true);

    let mut case: Option<CaseState> = None;
    let mut failure_attrs: Option<HashMap<String, String>> = None;
    let mut failure_text = String::new();
    let mut case_index = 0usize;

    let mut emit_case = |case: &CaseState, index: usize, events: &mut Vec<ExecutionEvent>| {
        let level = if case.failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let mut event = ExecutionEvent::automation(
            synthetic_timestamp(index),
            level,
            source,
            format!(
                "{} {}",
                case.name,
                if case.failed { "failed" } else { "completed" }
            ),
        );
        event.test_name = Some(case.name.clone());
        event.test_file = case.file.clone().or_else(|| case.class_name.clone());
        if let Some(class_name) = &case.class_name {
            event
                .metadata
                .insert("class_name".to_string(), class_name.clone());
        }
        if let Some(time) = &case.time {
            event.metadata.insert("duration".to_string(), time.clone());
        }
        event.metadata.insert(
            "test_status".to_string(),
            if case.failed { "FAILED" } else { "PASSED" }.to_string(),
        );
        events.push(event);
    };

    let case_state_from = |start: &BytesStart<'_>| {
        let attrs = attributes_of(start);
        let status = attrs
            .get("status")
            .or_else(|| attrs.get("result"))
            .map(|s| s.to_uppercase());
        CaseState {
            name: attrs
                .get("name")
                .cloned()
                .unwrap_or_else(|| "unnamed".to_string()),
            class_name: attrs
                .get("classname")
                .or_else(|| attrs.get("class"))
                .cloned(),
            file: attrs.get("file").cloned(),
            time: attrs.get("time").or_else(|| attrs.get("duration")).cloned(),
            failed: matches!(status.as_deref(), Some("FAIL" | "FAILED" | "ERROR")),
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = String::from_utf8_lossy(start.name().as_ref()).to_string();
                if CASE_ELEMENTS.contains(&element.as_str()) {
                    case = Some(case_state_from(&start));
                } else if FAILURE_ELEMENTS.contains(&element.as_str()) {
                    if let Some(case) = case.as_mut() {
                        case.failed = true;
                    }
                    failure_attrs = Some(attributes_of(&start));
                    failure_text.clear();
                }
            }
            Ok(Event::Empty(start)) => {
                let element = String::from_utf8_lossy(start.name().as_ref()).to_string();
                if CASE_ELEMENTS.contains(&element.as_str()) {
                    emit_case(&case_state_from(&start), case_index, &mut events);
                    case_index += 1;
                } else if FAILURE_ELEMENTS.contains(&element.as_str()) {
                    // Self-closing failure: everything lives in attributes.
                    if let Some(case_state) = case.as_mut() {
                        case_state.failed = true;
                    }
                    let attrs = attributes_of(&start);
                    if let Some(case_state) = case.as_ref() {
                        let mut event = ExecutionEvent::automation(
                            synthetic_timestamp(case_index),
                            LogLevel::Error,
                            source,
                            attrs.get("message").cloned().unwrap_or_default(),
                        );
                        event.test_name = Some(case_state.name.clone());
                        event.test_file = case_state
                            .file
                            .clone()
                            .or_else(|| case_state.class_name.clone());
                        event.exception_type =
                            attrs.get("type").or_else(|| attrs.get("class")).cloned();
                        events.push(event);
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if failure_attrs.is_some() {
                    if let Ok(unescaped) = text.unescape() {
                        if !failure_text.is_empty() {
                            failure_text.push('\n');
                        }
                        failure_text.push_str(unescaped.trim());
                    }
                }
            }
            Ok(Event::End(end)) => {
                let element = String::from_utf8_lossy(end.name().as_ref()).to_string();
                if FAILURE_ELEMENTS.contains(&element.as_str()) {
                    if let (Some(attrs), Some(case_state)) = (failure_attrs.take(), case.as_ref()) {
                        let message = attrs
                            .get("message")
                            .cloned()
                            .unwrap_or_else(|| failure_text.lines().next().unwrap_or("").to_string());
                        let mut event = ExecutionEvent::automation(
                            synthetic_timestamp(case_index),
                            LogLevel::Error,
                            source,
                            message,
                        );
                        event.test_name = Some(case_state.name.clone());
                        event.test_file =
                            case_state.file.clone().or_else(|| case_state.class_name.clone());
                        event.exception_type = attrs
                            .get("type")
                            .or_else(|| attrs.get("class"))
                            .cloned();
                        if !failure_text.is_empty() {
                            event.stacktrace = Some(failure_text.clone());
                        }
                        events.push(event);
                    }
                    failure_text.clear();
                } else if CASE_ELEMENTS.contains(&element.as_str()) {
                    if let Some(case_state) = case.take() {
                        emit_case(&case_state, case_index, &mut events);
                        case_index += 1;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(source, error = %e, "XML report truncated or malformed, keeping recovered events");
                break;
            }
        }
    }

    // Self-closing cases never see an End event with quick-xml's Empty.
    if let Some(case_state) = case.take() {
        emit_case(&case_state, case_index, &mut events);
    }

    events
}

pub struct JunitXmlAdapter;

impl JunitXmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JunitXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for JunitXmlAdapter {
    fn name(&self) -> &'static str {
        "junit"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        let head: String = raw_log.chars().take(512).collect();
        head.contains("<testsuite") || head.contains("<testsuites")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        parse_suite_xml(raw_log, "junit")
    }
}

pub struct TestNgXmlAdapter;

impl TestNgXmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestNgXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for TestNgXmlAdapter {
    fn name(&self) -> &'static str {
        "testng"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        let head: String = raw_log.chars().take(512).collect();
        head.contains("<testng-results")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        parse_suite_xml(raw_log, "testng")
    }
}

pub struct NunitXmlAdapter;

impl NunitXmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NunitXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkAdapter for NunitXmlAdapter {
    fn name(&self) -> &'static str {
        "nunit"
    }

    fn can_handle(&self, raw_log: &str) -> bool {
        let head: String = raw_log.chars().take(512).collect();
        head.contains("<test-run") || head.contains("<test-results")
    }

    fn parse(&self, raw_log: &str) -> Vec<ExecutionEvent> {
        parse_suite_xml(raw_log, "nunit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUNIT_SAMPLE: &str = r#"<?xml version="1.0"?>
<testsuite name="LoginTests" tests="2" failures="1">
  <testcase classname="tests.LoginTests" name="test_valid" time="1.1"/>
  <testcase classname="tests.LoginTests" name="test_invalid" time="2.1">
    <failure type="AssertionError" message="expected 200 got 500">at tests/login.py:42</failure>
  </testcase>
</testsuite>"#;

    const NUNIT_SAMPLE: &str = r#"<test-run id="1">
  <test-case name="SubmitOrder" result="Failed" duration="2.5">
    <failure>
      <message>Object reference not set</message>
    </failure>
  </test-case>
</test-run>"#;

    #[test]
    fn test_junit_signature_and_parse() {
        let adapter = JunitXmlAdapter::new();
        assert!(adapter.can_handle(JUNIT_SAMPLE));

        let events = adapter.parse(JUNIT_SAMPLE);
        let failure = events
            .iter()
            .find(|e| e.exception_type.is_some())
            .expect("failure event");
        assert_eq!(failure.test_name.as_deref(), Some("test_invalid"));
        assert_eq!(failure.exception_type.as_deref(), Some("AssertionError"));
        assert_eq!(failure.message, "expected 200 got 500");
        assert!(failure.stacktrace.as_deref().unwrap().contains("login.py:42"));

        let passing = events
            .iter()
            .find(|e| e.test_name.as_deref() == Some("test_valid"))
            .expect("passing case event");
        assert_eq!(passing.level, LogLevel::Info);
    }

    #[test]
    fn test_nunit_result_attribute_marks_failure() {
        let adapter = NunitXmlAdapter::new();
        assert!(adapter.can_handle(NUNIT_SAMPLE));

        let events = adapter.parse(NUNIT_SAMPLE);
        let case_event = events
            .iter()
            .find(|e| e.metadata.get("test_status").map(String::as_str) == Some("FAILED"))
            .expect("failed case event");
        assert_eq!(case_event.test_name.as_deref(), Some("SubmitOrder"));
    }

    #[test]
    fn test_malformed_xml_keeps_recovered_events() {
        let adapter = JunitXmlAdapter::new();
        let truncated = "<testsuite><testcase name=\"a\"></testcase><testcase name=\"b\"";
        let events = adapter.parse(truncated);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].test_name.as_deref(), Some("a"));
    }
}
