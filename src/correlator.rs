//! Application-log correlation: does a service-side event explain the
//! automation failure?
//!
//! Purely additive. Correlation can add confidence to a PRODUCT_DEFECT
//! verdict; it never downgrades anything, and absent application logs
//! produce no effect at all.

use crate::constants::{CORRELATION_WINDOW_SECS, MIN_SHARED_TOKENS};
use crate::models::{ExecutionEvent, FailureSignal, LogLevel, LogSourceType, SignalType};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Common words that carry no correlation weight.
pub(crate) const STOP_WORDS: [&str; 24] = [
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "at", "is", "was", "were",
    "with", "from", "by", "not", "has", "had", "this", "that", "error", "exception",
];

/// Why a correlation held, for the evidence list.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationBasis {
    SharedExceptionType(String),
    SharedStatusCode(String),
    SharedTokens(Vec<String>),
}

impl CorrelationBasis {
    pub fn describe(&self) -> String {
        match self {
            CorrelationBasis::SharedExceptionType(exception) => {
                format!("application log shares exception type {exception}")
            }
            CorrelationBasis::SharedStatusCode(status) => {
                format!("application log contains HTTP status {status}")
            }
            CorrelationBasis::SharedTokens(tokens) => {
                format!("application log shares tokens: {}", tokens.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationOutcome {
    pub service_name: Option<String>,
    pub application_message: String,
    pub basis: CorrelationBasis,
}

pub struct AppLogCorrelator {
    window: Duration,
    min_shared_tokens: usize,
}

impl AppLogCorrelator {
    pub fn new(window_seconds: i64, min_shared_tokens: usize) -> Self {
        Self {
            window: Duration::seconds(window_seconds.max(0)),
            min_shared_tokens: min_shared_tokens.max(1),
        }
    }

    /// Check every application event inside the correlation window, at
    /// WARN or above, against the automation failure evidence.
    pub fn correlate(
        &self,
        events: &[ExecutionEvent],
        signals: &[FailureSignal],
    ) -> Option<CorrelationOutcome> {
        let automation: Vec<&ExecutionEvent> = events
            .iter()
            .filter(|e| e.log_source_type == LogSourceType::Automation)
            .collect();
        let application: Vec<&ExecutionEvent> = events
            .iter()
            .filter(|e| e.log_source_type == LogSourceType::Application)
            .filter(|e| e.level >= LogLevel::Warn)
            .collect();
        if application.is_empty() {
            return None;
        }

        let window = self.failure_window(&automation);
        let candidates: Vec<&&ExecutionEvent> = application
            .iter()
            .filter(|e| self.inside_window(e, window))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let automation_exceptions: HashSet<&str> = automation
            .iter()
            .filter_map(|e| e.exception_type.as_deref())
            .collect();
        let status_codes: Vec<String> = signals
            .iter()
            .filter(|s| s.signal_type == SignalType::HttpError)
            .filter_map(|s| s.metadata.get("http_status").cloned())
            .collect();
        let failure_tokens = self.distinctive_tokens(
            &signals
                .iter()
                .map(|s| s.message.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );

        for event in candidates {
            // 1. Shared exception type.
            if let Some(exception) = event.exception_type.as_deref() {
                if automation_exceptions.contains(exception) {
                    return Some(self.outcome(
                        event,
                        CorrelationBasis::SharedExceptionType(exception.to_string()),
                    ));
                }
            }
            // 2. Automation HTTP status appearing service-side.
            for status in &status_codes {
                if event.message.contains(status.as_str()) {
                    return Some(
                        self.outcome(event, CorrelationBasis::SharedStatusCode(status.clone())),
                    );
                }
            }
            // 3. Token overlap after stop-word removal.
            let shared: Vec<String> = self
                .distinctive_tokens(&event.message)
                .intersection(&failure_tokens)
                .cloned()
                .collect();
            if shared.len() >= self.min_shared_tokens {
                let mut sorted = shared;
                sorted.sort();
                return Some(self.outcome(event, CorrelationBasis::SharedTokens(sorted)));
            }
        }
        None
    }

    fn outcome(&self, event: &ExecutionEvent, basis: CorrelationBasis) -> CorrelationOutcome {
        debug!(basis = %basis.describe(), "Application log correlation holds");
        CorrelationOutcome {
            service_name: event.service_name.clone(),
            application_message: event.message.clone(),
            basis,
        }
    }

    /// The test's failure window: first-to-last automation timestamp,
    /// widened by the configured margin on both sides.
    fn failure_window(
        &self,
        automation: &[&ExecutionEvent],
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let stamps: Vec<DateTime<Utc>> = automation
            .iter()
            .filter_map(|e| e.timestamp_utc())
            .collect();
        let first = stamps.iter().min()?;
        let last = stamps.iter().max()?;
        Some((*first - self.window, *last + self.window))
    }

    fn inside_window(
        &self,
        event: &ExecutionEvent,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> bool {
        match (window, event.timestamp_utc()) {
            (Some((start, end)), Some(at)) => at >= start && at <= end,
            // Without usable timestamps the window cannot exclude anything.
            _ => true,
        }
    }

    fn distinctive_tokens(&self, text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() > 2)
            .filter(|t| !STOP_WORDS.contains(t))
            .filter(|t| t.chars().any(|c| c.is_alphabetic()))
            .map(str::to_string)
            .collect()
    }
}

impl Default for AppLogCorrelator {
    fn default() -> Self {
        Self::new(CORRELATION_WINDOW_SECS, MIN_SHARED_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureSignal;

    fn automation_event(ts: &str, message: &str) -> ExecutionEvent {
        ExecutionEvent::automation(ts.to_string(), LogLevel::Error, "pytest", message.to_string())
    }

    fn app_event(ts: &str, message: &str) -> ExecutionEvent {
        ExecutionEvent::application(ts.to_string(), LogLevel::Error, "payments", message.to_string())
    }

    #[test]
    fn test_shared_exception_type_correlates() {
        let correlator = AppLogCorrelator::default();
        let mut auto = automation_event("2024-01-15T10:00:00Z", "request blew up");
        auto.exception_type = Some("NullPointerException".to_string());
        let mut app = app_event("2024-01-15T10:00:10Z", "charge failed");
        app.exception_type = Some("NullPointerException".to_string());

        let outcome = correlator
            .correlate(&[auto, app], &[])
            .expect("correlation should hold");
        assert_eq!(
            outcome.basis,
            CorrelationBasis::SharedExceptionType("NullPointerException".to_string())
        );
    }

    #[test]
    fn test_status_code_match_correlates() {
        let correlator = AppLogCorrelator::default();
        let auto = automation_event("2024-01-15T10:00:00Z", "assert 500 == 200");
        let app = app_event(
            "2024-01-15T10:00:05Z",
            "request aborted with 500 from payment handler",
        );
        let signal = FailureSignal::new(
            SignalType::HttpError,
            "assert 500 == 200".to_string(),
            0.85,
        )
        .with_metadata("http_status", "500".to_string());

        let outcome = correlator.correlate(&[auto, app], &[signal]).unwrap();
        assert_eq!(
            outcome.basis,
            CorrelationBasis::SharedStatusCode("500".to_string())
        );
    }

    #[test]
    fn test_token_overlap_correlates() {
        let correlator = AppLogCorrelator::default();
        let auto = automation_event(
            "2024-01-15T10:00:00Z",
            "payment gateway declined transaction during checkout",
        );
        let app = app_event(
            "2024-01-15T10:00:20Z",
            "gateway declined transaction: insufficient funds on payment instrument",
        );
        let signal = FailureSignal::new(
            SignalType::Assertion,
            "payment gateway declined transaction during checkout".to_string(),
            0.9,
        );

        let outcome = correlator.correlate(&[auto, app], &[signal]).unwrap();
        match outcome.basis {
            CorrelationBasis::SharedTokens(tokens) => assert!(tokens.len() >= 3),
            other => panic!("expected token overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_event_outside_window_does_not_correlate() {
        let correlator = AppLogCorrelator::default();
        let mut auto = automation_event("2024-01-15T10:00:00Z", "boom");
        auto.exception_type = Some("IllegalStateException".to_string());
        let mut app = app_event("2024-01-15T11:30:00Z", "late failure");
        app.exception_type = Some("IllegalStateException".to_string());

        assert!(correlator.correlate(&[auto, app], &[]).is_none());
    }

    #[test]
    fn test_info_level_application_events_are_ignored() {
        let correlator = AppLogCorrelator::default();
        let mut auto = automation_event("2024-01-15T10:00:00Z", "boom");
        auto.exception_type = Some("IllegalStateException".to_string());
        let mut app = ExecutionEvent::application(
            "2024-01-15T10:00:05Z".to_string(),
            LogLevel::Info,
            "payments",
            "routine message".to_string(),
        );
        app.exception_type = Some("IllegalStateException".to_string());

        assert!(correlator.correlate(&[auto, app], &[]).is_none());
    }

    #[test]
    fn test_no_application_events_no_effect() {
        let correlator = AppLogCorrelator::default();
        let auto = automation_event("2024-01-15T10:00:00Z", "boom");
        assert!(correlator.correlate(&[auto], &[]).is_none());
    }

    #[test]
    fn test_unrelated_application_noise_does_not_correlate() {
        let correlator = AppLogCorrelator::default();
        let auto = automation_event("2024-01-15T10:00:00Z", "locator #login missing");
        let app = app_event("2024-01-15T10:00:05Z", "cache eviction cycle finished slowly");
        let signal = FailureSignal::new(
            SignalType::Locator,
            "locator #login missing".to_string(),
            0.92,
        );
        assert!(correlator.correlate(&[auto, app], &[signal]).is_none());
    }
}
