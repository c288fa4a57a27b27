//! Optional AI enrichment: advisory annotations that may nudge
//! confidence but can never reclassify a failure.
//!
//! The contract is a capability, not a hierarchy: a no-op implementation
//! is always present, and the network-backed variant is selected by
//! configuration. Nothing in the deterministic pipeline depends on it.

pub mod circuit_breaker;
pub mod http;

pub use http::HttpEnricher;

use crate::constants::{ENRICHMENT_MAX_DELTA, ENRICHMENT_MIN_CONFIDENCE};
use crate::models::{AiInsights, FailureClassification};
use crate::Result;
use async_trait::async_trait;

/// Context handed to the enrichment layer alongside the classification.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    pub test_name: String,
    pub framework: String,
    /// A bounded excerpt of the failure evidence.
    pub evidence_excerpt: String,
}

/// Advisory enrichment output.
#[derive(Debug, Clone)]
pub struct Enrichment {
    /// Bounded to ±0.1 before application; bucket preservation happens in
    /// the calibrator.
    pub confidence_delta: f64,
    pub insights: AiInsights,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Annotate a classification. `Ok(None)` means "nothing to add";
    /// errors are discarded by the caller and never affect the verdict.
    async fn enrich(
        &self,
        classification: &FailureClassification,
        context: &EnrichmentContext,
    ) -> Result<Option<Enrichment>>;

    fn name(&self) -> &'static str;
}

/// The always-available no-op variant.
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(
        &self,
        _classification: &FailureClassification,
        _context: &EnrichmentContext,
    ) -> Result<Option<Enrichment>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Gate an enrichment result: below the provider-confidence floor the
/// delta is zeroed, and the delta is clamped to the allowed band.
pub fn sanitize(enrichment: Enrichment, min_confidence: f64) -> Enrichment {
    let min_confidence = if min_confidence > 0.0 {
        min_confidence
    } else {
        ENRICHMENT_MIN_CONFIDENCE
    };
    let delta = if enrichment.insights.provider_confidence >= min_confidence {
        enrichment
            .confidence_delta
            .clamp(-ENRICHMENT_MAX_DELTA, ENRICHMENT_MAX_DELTA)
    } else {
        0.0
    };
    Enrichment {
        confidence_delta: delta,
        insights: enrichment.insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrichment(delta: f64, provider_confidence: f64) -> Enrichment {
        Enrichment {
            confidence_delta: delta,
            insights: AiInsights {
                summary: "advice".to_string(),
                suggestions: vec![],
                provider_confidence,
            },
        }
    }

    #[test]
    fn test_noop_returns_nothing() {
        let noop = NoopEnricher;
        let classification = FailureClassification {
            failure_type: crate::models::FailureType::Unknown,
            confidence: 0.0,
            reason: String::new(),
            evidence: vec![],
            signals: vec![],
            rules_applied: vec![],
            code_reference: None,
            ai_insights: None,
        };
        let result =
            tokio_test::block_on(noop.enrich(&classification, &EnrichmentContext::default()))
                .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_sanitize_clamps_delta() {
        let out = sanitize(enrichment(0.4, 0.9), 0.5);
        assert!((out.confidence_delta - 0.1).abs() < 1e-12);
        let out = sanitize(enrichment(-0.4, 0.9), 0.5);
        assert!((out.confidence_delta + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_sanitize_zeroes_low_provider_confidence() {
        let out = sanitize(enrichment(0.1, 0.3), 0.5);
        assert_eq!(out.confidence_delta, 0.0);
        // the insights text is still kept, only the nudge is dropped
        assert_eq!(out.insights.summary, "advice");
    }
}
