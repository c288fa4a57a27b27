//! Classification assembly: rule verdicts plus signal evidence, with the
//! UNKNOWN fallback when no rule fires.

use crate::constants::UNKNOWN_CONFIDENCE_CAP;
use crate::models::{FailureClassification, FailureSignal, FailureType};
use crate::rules::{RuleEngine, RuleVerdict};
use crate::Result;

pub struct Classifier {
    engine: RuleEngine,
}

impl Classifier {
    pub fn new(engine: RuleEngine) -> Self {
        Self { engine }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(RuleEngine::builtin()?))
    }

    /// Classify one test's signals. The failure type is decided by rule
    /// evaluation alone; everything else is evidence assembly.
    pub fn classify(&self, framework: &str, signals: &[FailureSignal]) -> FailureClassification {
        match self.engine.evaluate(framework, signals) {
            Some(verdict) => self.from_verdict(verdict, signals),
            None => self.unknown(signals),
        }
    }

    /// Base rule confidence, when the classification came from a rule.
    pub fn rule_confidence(classification: &FailureClassification) -> Option<f64> {
        if classification.rules_applied.is_empty() {
            None
        } else {
            Some(classification.confidence)
        }
    }

    fn from_verdict(
        &self,
        verdict: RuleVerdict,
        signals: &[FailureSignal],
    ) -> FailureClassification {
        let mut evidence: Vec<String> = verdict
            .matched_patterns
            .iter()
            .map(|p| format!("matched pattern: {p}"))
            .collect();
        evidence.extend(signal_evidence(signals));

        FailureClassification {
            failure_type: verdict.rule.failure_type,
            confidence: verdict.rule.confidence,
            reason: verdict.rule.description.clone(),
            evidence,
            signals: signals.to_vec(),
            rules_applied: vec![verdict.rule.id],
            code_reference: None,
            ai_insights: None,
        }
    }

    fn unknown(&self, signals: &[FailureSignal]) -> FailureClassification {
        let confidence = signals
            .iter()
            .map(|s| s.confidence)
            .fold(0.0_f64, f64::max)
            .min(UNKNOWN_CONFIDENCE_CAP);
        let reason = if signals.is_empty() {
            "No failure signals extracted".to_string()
        } else {
            "Signals present but no classification rule matched".to_string()
        };

        FailureClassification {
            failure_type: FailureType::Unknown,
            confidence,
            reason,
            evidence: signal_evidence(signals),
            signals: signals.to_vec(),
            rules_applied: Vec::new(),
            code_reference: None,
            ai_insights: None,
        }
    }
}

/// One evidence string per signal, plus traceable captures (selector,
/// status code, expected/actual) when the extractor recorded them.
fn signal_evidence(signals: &[FailureSignal]) -> Vec<String> {
    let mut evidence = Vec::new();
    for signal in signals {
        let detail = if signal.keywords.is_empty() {
            signal.message.clone()
        } else {
            signal.keywords.join(", ")
        };
        evidence.push(format!("{} signal: {}", signal.signal_type, detail));

        for key in ["selector", "http_status", "http_method", "http_url", "expected", "actual"] {
            if let Some(value) = signal.metadata.get(key) {
                evidence.push(format!("{key}={value}"));
            }
        }
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureSignal, SignalType};

    #[test]
    fn test_unknown_with_no_signals_has_zero_confidence() {
        let classifier = Classifier::builtin().unwrap();
        let classification = classifier.classify("generic", &[]);
        assert_eq!(classification.failure_type, FailureType::Unknown);
        assert_eq!(classification.confidence, 0.0);
        assert!(classification.rules_applied.is_empty());
    }

    #[test]
    fn test_unknown_confidence_is_capped_at_half() {
        let classifier = Classifier::builtin().unwrap();
        // OTHER signals match no rule; confidence comes from the signal, capped.
        let signals = vec![FailureSignal::new(
            SignalType::Other,
            "strange one-off breakage".to_string(),
            0.95,
        )];
        let classification = classifier.classify("generic", &signals);
        assert_eq!(classification.failure_type, FailureType::Unknown);
        assert!(classification.confidence <= 0.5);
    }

    #[test]
    fn test_evidence_carries_selector_capture() {
        let classifier = Classifier::builtin().unwrap();
        let signals = vec![FailureSignal::new(
            SignalType::Locator,
            "Unable to locate element".to_string(),
            0.92,
        )
        .with_keyword("unable to locate element")
        .with_metadata("selector", "#login".to_string())];
        let classification = classifier.classify("selenium", &signals);
        assert_eq!(classification.failure_type, FailureType::AutomationDefect);
        assert!(classification
            .evidence
            .iter()
            .any(|e| e.contains("#login")));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::builtin().unwrap();
        let signals = vec![
            FailureSignal::new(SignalType::Assertion, "assert 500 == 200".to_string(), 0.95),
            FailureSignal::new(
                SignalType::HttpError,
                "Response [500] from POST /charge".to_string(),
                0.85,
            ),
        ];
        let a = classifier.classify("pytest", &signals);
        let b = classifier.classify("pytest", &signals);
        assert_eq!(a.failure_type, b.failure_type);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.evidence, b.evidence);
        assert_eq!(a.rules_applied, b.rules_applied);
    }
}
