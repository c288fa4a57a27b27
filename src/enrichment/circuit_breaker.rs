//! Circuit breaker guarding the enrichment endpoint.
//!
//! Closed passes requests through, Open rejects everything until the
//! cool-off elapses, HalfOpen lets probes through and closes again after
//! enough successes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cool-off before probing again.
    pub open_duration: Duration,
    /// Successful probes needed to close from half-open.
    pub success_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            success_threshold: 2,
            failure_window: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitState>>,
    failure_count: Arc<AtomicU32>,
    success_count: Arc<AtomicU32>,
    last_failure: Arc<RwLock<Option<Instant>>>,
    opened_at: Arc<RwLock<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_count: Arc::new(AtomicU32::new(0)),
            success_count: Arc::new(AtomicU32::new(0)),
            last_failure: Arc::new(RwLock::new(None)),
            opened_at: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Whether an enrichment call may go out right now.
    pub async fn allow_request(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened = *self.opened_at.read().await;
                if opened.elapsed() >= self.config.open_duration {
                    self.transition(CircuitState::HalfOpen).await;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let state = *self.state.read().await;
        match state {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(successes, threshold = self.config.success_threshold, "Probe succeeded");
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed).await;
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed => {
                let mut last = self.last_failure.write().await;
                let now = Instant::now();
                let outside_window = last
                    .map(|at| now.duration_since(at) > self.config.failure_window)
                    .unwrap_or(true);
                let failures = if outside_window {
                    self.failure_count.store(1, Ordering::Relaxed);
                    1
                } else {
                    self.failure_count.fetch_add(1, Ordering::Relaxed) + 1
                };
                *last = Some(now);
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open).await;
                }
            }
            // One failed probe reopens immediately.
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open).await;
            }
            CircuitState::Open => {
                *self.last_failure.write().await = Some(Instant::now());
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    async fn transition(&self, to: CircuitState) {
        let mut state = self.state.write().await;
        if *state == to {
            return;
        }
        let from = *state;
        *state = to;
        self.success_count.store(0, Ordering::Relaxed);
        if to == CircuitState::Open {
            *self.opened_at.write().await = Instant::now();
            warn!(?from, "Enrichment circuit opened, skipping enrichment calls");
        } else {
            self.failure_count.store(0, Ordering::Relaxed);
            info!(?from, ?to, "Enrichment circuit transitioned");
        }
    }
}
