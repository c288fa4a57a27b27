//! Network-backed enrichment variant: a JSON POST to an LLM-style
//! endpoint, guarded by hard timeout, circuit breaker, token bucket and
//! transient-only retries.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::{Enricher, Enrichment, EnrichmentContext};
use crate::constants::{
    ENRICHMENT_BACKOFF_BASE_MS, ENRICHMENT_MAX_RETRIES, ENRICHMENT_REQUESTS_PER_MINUTE,
    ENRICHMENT_TIMEOUT_SECS,
};
use crate::models::{AiInsights, FailureClassification};
use crate::{Result, TriageError};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HttpEnricherConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub requests_per_minute: u32,
    pub max_retries: u32,
}

impl Default for HttpEnricherConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            timeout: Duration::from_secs(ENRICHMENT_TIMEOUT_SECS),
            requests_per_minute: ENRICHMENT_REQUESTS_PER_MINUTE,
            max_retries: ENRICHMENT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Serialize)]
struct EnrichmentRequest<'a> {
    request_id: String,
    test_name: &'a str,
    framework: &'a str,
    failure_type: &'a str,
    confidence: f64,
    reason: &'a str,
    evidence: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EnrichmentResponse {
    summary: String,
    #[serde(default)]
    suggestions: Vec<String>,
    /// The provider's own confidence in its advice.
    confidence: f64,
    #[serde(default)]
    confidence_delta: f64,
}

pub struct HttpEnricher {
    config: HttpEnricherConfig,
    client: reqwest::Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpEnricher {
    pub fn new(config: HttpEnricherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TriageError::EnrichmentApi)?;
        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute.max(1)).expect("max(1) is nonzero"),
        );
        Ok(Self {
            config,
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            circuit_breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        })
    }

    async fn call_once(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentResponse> {
        let mut builder = self.client.post(&self.config.endpoint).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(TriageError::EnrichmentApi)?;
        let response = response
            .error_for_status()
            .map_err(TriageError::EnrichmentApi)?;
        response
            .json::<EnrichmentResponse>()
            .await
            .map_err(TriageError::EnrichmentApi)
    }

    /// Exponential backoff with jitter, retrying transient errors only.
    async fn call_with_retries(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentResponse> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let backoff = ENRICHMENT_BACKOFF_BASE_MS << attempt;
                    let jitter = rand::thread_rng().gen_range(0..=backoff / 2);
                    debug!(attempt, backoff_ms = backoff + jitter, "Retrying transient enrichment failure");
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(
        &self,
        classification: &FailureClassification,
        context: &EnrichmentContext,
    ) -> Result<Option<Enrichment>> {
        if self.config.endpoint.is_empty() {
            return Ok(None);
        }
        if !self.circuit_breaker.allow_request().await {
            debug!("Enrichment circuit open, skipping");
            return Ok(None);
        }
        if self.limiter.check().is_err() {
            warn!("Enrichment rate limit reached, skipping");
            return Ok(None);
        }

        let request = EnrichmentRequest {
            request_id: Uuid::new_v4().to_string(),
            test_name: &context.test_name,
            framework: &context.framework,
            failure_type: classification.failure_type.as_str(),
            confidence: classification.confidence,
            reason: &classification.reason,
            evidence: &classification.evidence,
        };

        match self.call_with_retries(&request).await {
            Ok(response) => {
                self.circuit_breaker.record_success().await;
                Ok(Some(Enrichment {
                    confidence_delta: response.confidence_delta,
                    insights: AiInsights {
                        summary: response.summary,
                        suggestions: response.suggestions,
                        provider_confidence: response.confidence,
                    },
                }))
            }
            Err(e) => {
                self.circuit_breaker.record_failure().await;
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
