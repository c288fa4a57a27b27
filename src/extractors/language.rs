//! Language-level automation-defect extraction: null dereferences,
//! import/dependency failures and syntax errors across Python, Java,
//! JavaScript and C#.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};

const NULL_CONFIDENCE: f64 = 0.88;
const IMPORT_CONFIDENCE: f64 = 0.9;
const SYNTAX_CONFIDENCE: f64 = 0.9;

pub struct LanguageDefectExtractor {
    null_keywords: Vec<&'static str>,
    import_keywords: Vec<&'static str>,
    syntax_keywords: Vec<&'static str>,
}

impl LanguageDefectExtractor {
    pub fn new() -> Self {
        Self {
            null_keywords: vec![
                "nullpointerexception",
                "nonetype",
                "attributeerror: 'nonetype'",
                "cannot read properties of undefined",
                "cannot read property",
                "undefined is not a function",
                "nullreferenceexception",
                "object reference not set",
            ],
            import_keywords: vec![
                "importerror",
                "modulenotfounderror",
                "no module named",
                "cannot find module",
                "classnotfoundexception",
                "noclassdeffounderror",
                "package does not exist",
                "could not load file or assembly",
            ],
            syntax_keywords: vec![
                "syntaxerror",
                "indentationerror",
                "unexpected token",
                "compilation failed",
                "cannot find symbol",
                "expected ';'",
                "illegal character",
            ],
        }
    }

    fn scan(
        &self,
        event: &ExecutionEvent,
        keywords: &[&'static str],
        signal_type: SignalType,
        confidence: f64,
        pattern_id: &str,
    ) -> Option<FailureSignal> {
        let lowered = event.message.to_lowercase();
        let matched: Vec<&str> = keywords
            .iter()
            .copied()
            .filter(|k| lowered.contains(k))
            .collect();
        if matched.is_empty() {
            return None;
        }
        let mut signal = FailureSignal::new(signal_type, event.message.clone(), confidence)
            .with_pattern(pattern_id);
        for keyword in matched {
            signal = signal.with_keyword(keyword);
        }
        Some(inherit_event_context(signal, event))
    }
}

impl Default for LanguageDefectExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for LanguageDefectExtractor {
    fn name(&self) -> &'static str {
        "language_defect"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            if let Some(signal) = self.scan(
                event,
                &self.null_keywords,
                SignalType::NullPointer,
                NULL_CONFIDENCE,
                "language.null",
            ) {
                signals.push(signal);
            }
            if let Some(signal) = self.scan(
                event,
                &self.import_keywords,
                SignalType::Import,
                IMPORT_CONFIDENCE,
                "language.import",
            ) {
                signals.push(signal);
            }
            if let Some(signal) = self.scan(
                event,
                &self.syntax_keywords,
                SignalType::Syntax,
                SYNTAX_CONFIDENCE,
                "language.syntax",
            ) {
                signals.push(signal);
            }
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
    fn test_null_pointer_variants() {
        let extractor = LanguageDefectExtractor::new();
        let cases = vec![
            "java.lang.NullPointerException at PaymentService.charge",
            "TypeError: Cannot read properties of undefined (reading 'click')",
            "AttributeError: 'NoneType' object has no attribute 'find'",
            "System.NullReferenceException: Object reference not set",
        ];
        for message in cases {
            let signals = extractor.extract(&[event(message)]);
            assert_eq!(signals.len(), 1, "{message}");
            assert_eq!(signals[0].signal_type, SignalType::NullPointer);
        }
    }

    #[test]
    fn test_import_and_syntax() {
        let extractor = LanguageDefectExtractor::new();
        let import = extractor.extract(&[event("ModuleNotFoundError: No module named 'requests'")]);
        assert_eq!(import.len(), 1);
        assert_eq!(import[0].signal_type, SignalType::Import);

        let syntax = extractor.extract(&[event("SyntaxError: unexpected token ')'")]);
        assert_eq!(syntax.len(), 1);
        assert_eq!(syntax[0].signal_type, SignalType::Syntax);
    }

    #[test]
    fn test_none_of_the_above_is_silent() {
        let extractor = LanguageDefectExtractor::new();
        assert!(extractor.extract(&[event("timeout waiting for page")]).is_empty());
    }
}
