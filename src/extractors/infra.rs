//! Infrastructure and database failure extraction.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};

const INFRA_CONFIDENCE: f64 = 0.85;
const DATABASE_CONFIDENCE: f64 = 0.85;

pub struct InfraExtractor {
    keywords: Vec<&'static str>,
}

impl InfraExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "out of memory",
                "outofmemoryerror",
                "oom killed",
                "oomkilled",
                "no space left on device",
                "disk full",
                "disk quota exceeded",
                "permission denied",
                "service unavailable",
                "resource temporarily unavailable",
                "too many open files",
            ],
        }
    }
}

impl Default for InfraExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for InfraExtractor {
    fn name(&self) -> &'static str {
        "infra"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mut signal = FailureSignal::new(
                SignalType::Infra,
                event.message.clone(),
                INFRA_CONFIDENCE,
            )
            .with_pattern("infra.keyword");
            for keyword in matched {
                signal = signal.with_keyword(keyword);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}

pub struct DatabaseExtractor {
    keywords: Vec<&'static str>,
}

impl DatabaseExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "database",
                "sqlexception",
                "sqlstate",
                "deadlock",
                "connection pool",
                "pool exhausted",
                "jdbc",
                "psycopg2",
                "operationalerror",
                "db connection",
                "query timeout",
            ],
        }
    }
}

impl Default for DatabaseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for DatabaseExtractor {
    fn name(&self) -> &'static str {
        "database"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mut signal = FailureSignal::new(
                SignalType::Database,
                event.message.clone(),
                DATABASE_CONFIDENCE,
            )
            .with_pattern("database.keyword");
            for keyword in matched {
                signal = signal.with_keyword(keyword);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    fn event(message: &str) -> ExecutionEvent {
        ExecutionEvent::automation(
            "1970-01-01T00:00:00Z".to_string(),
            LogLevel::Error,
            "generic",
            message.to_string(),
        )
    }

    #[test]
    fn test_infra_keywords() {
        let extractor = InfraExtractor::new();
        let cases = vec![
            "java.lang.OutOfMemoryError: Java heap space",
            "write failed: No space left on device",
            "mkdir: permission denied",
            "503 Service Unavailable from ingress",
        ];
        for message in cases {
            let signals = extractor.extract(&[event(message)]);
            assert_eq!(signals.len(), 1, "{message}");
            assert_eq!(signals[0].signal_type, SignalType::Infra);
            assert!(signals[0].is_infra_related);
        }
    }

    #[test]
    fn test_database_keywords() {
        let extractor = DatabaseExtractor::new();
        let signals = extractor.extract(&[event(
            "SQLException: connection pool exhausted, query timeout after 30s",
        )]);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Database);
        assert!(signals[0].keywords.len() >= 2);
    }

    #[test]
    fn test_clean_messages_are_silent() {
        assert!(InfraExtractor::new().extract(&[event("all good")]).is_empty());
        assert!(DatabaseExtractor::new()
            .extract(&[event("all good")])
            .is_empty());
    }
}
