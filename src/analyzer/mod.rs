//! Analyzer / orchestrator: drives adapters, extractors, rules, code
//! resolution, correlation and calibration for each test, and fans a
//! batch out across a bounded worker pool.
//!
//! The per-test pipeline is a fault boundary: nothing that happens inside
//! one test's analysis escapes it. Only configuration errors terminate a
//! run.

use crate::calibrator::{CalibrationInput, ConfidenceCalibrator};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::constants::{ERROR_DIGEST_LIMIT, TOP_PATTERN_LIMIT};
use crate::correlator::AppLogCorrelator;
use crate::enrichment::{sanitize, Enricher, EnrichmentContext, HttpEnricher, NoopEnricher};
use crate::enrichment::http::HttpEnricherConfig;
use crate::extractors::{ExtractorSet, PerformanceThresholds};
use crate::grouping::{CorrelationGrouper, GroupingConfig};
use crate::models::{
    AnalysisResult, CorrelationGroup, ExecutionEvent, FailureType, LogSourceCollection,
    LogSourceType, TestStatus,
};
use crate::patterns::{pattern_hash, FilePatternStore, InMemoryPatternStore, PatternTracker};
use crate::resolver::CodeReferenceResolver;
use crate::router::LogRouter;
use crate::rules::RuleEngine;
use crate::Result;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Batch summary: totals by type, confidence histogram, top patterns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_confidence_bucket: BTreeMap<String, usize>,
    pub top_patterns: Vec<PatternCount>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PatternCount {
    pub pattern_hash: String,
    pub normalized_message: String,
    pub affected_tests: usize,
}

struct AnalyzerInner {
    config: Config,
    router: LogRouter,
    extractors: ExtractorSet,
    classifier: Classifier,
    resolver: CodeReferenceResolver,
    correlator: AppLogCorrelator,
    calibrator: ConfidenceCalibrator,
    tracker: PatternTracker,
    enricher: Box<dyn Enricher>,
    grouper: CorrelationGrouper,
    cancel: AtomicBool,
}

pub struct Analyzer {
    inner: Arc<AnalyzerInner>,
}

impl Analyzer {
    pub fn from_config(config: Config) -> Result<Self> {
        let enricher: Box<dyn Enricher> = if config.ai.enabled {
            Box::new(HttpEnricher::new(HttpEnricherConfig {
                endpoint: config.ai.endpoint.clone(),
                api_key: config.ai.api_key.clone(),
                timeout: Duration::from_millis(config.ai.timeout_ms),
                ..Default::default()
            })?)
        } else {
            Box::new(NoopEnricher)
        };
        Self::from_config_with_enricher(config, enricher)
    }

    /// Same as `from_config`, with a caller-supplied enrichment variant.
    pub fn from_config_with_enricher(config: Config, enricher: Box<dyn Enricher>) -> Result<Self> {
        let engine = RuleEngine::with_overrides(&config.rules.packs, config.rules.overrides.clone())?;
        let tracker = match &config.pattern.state_path {
            Some(path) => match FilePatternStore::open(path) {
                Ok(store) => PatternTracker::new(Box::new(store), config.pattern.n_cap),
                Err(e) => {
                    warn!(error = %e, "Pattern state unavailable, falling back to in-memory");
                    PatternTracker::new(Box::new(InMemoryPatternStore::new()), config.pattern.n_cap)
                }
            },
            None => PatternTracker::new(Box::new(InMemoryPatternStore::new()), config.pattern.n_cap),
        };

        let grouping = GroupingConfig {
            similarity_threshold: config.grouping.similarity_threshold,
            time_window_seconds: config.grouping.time_window_seconds,
            min_group_size: config.grouping.min_group_size,
            ..Default::default()
        };

        Ok(Self {
            inner: Arc::new(AnalyzerInner {
                router: LogRouter::new(),
                extractors: ExtractorSet::new(PerformanceThresholds::default()),
                classifier: Classifier::new(engine),
                resolver: CodeReferenceResolver::new(&config.execution.source_root),
                correlator: AppLogCorrelator::new(
                    config.correlation.window_seconds,
                    config.correlation.min_shared_tokens,
                ),
                calibrator: ConfidenceCalibrator::new(),
                tracker,
                enricher,
                grouper: CorrelationGrouper::new(grouping),
                cancel: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Default analyzer with built-in rules and in-memory pattern history.
    pub fn builtin() -> Result<Self> {
        Self::from_config(Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Ask in-flight batch work to stop after the current tests.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::Relaxed);
        info!("Batch cancellation requested");
    }

    /// Analyze one test from raw log text. Never fails: internal errors
    /// come back as an ERROR-status result.
    pub async fn analyze(
        &self,
        raw_log: &str,
        test_name: &str,
        framework: Option<&str>,
        app_log: Option<&str>,
    ) -> AnalysisResult {
        let registry = self.inner.router.registry();
        let adapter = match framework {
            Some(name) => match registry.by_name(name) {
                Some(adapter) => adapter,
                None => {
                    return AnalysisResult::error(
                        test_name,
                        name,
                        &format!("unknown framework adapter: {name}"),
                    )
                }
            },
            None => registry.detect(raw_log),
        };
        let mut events = adapter.parse(raw_log);
        let framework_name = adapter.name().to_string();

        let mut has_application_logs = false;
        if let Some(app_raw) = app_log {
            let parsed = crate::adapters::ApplicationLogAdapter::new().parse(
                app_raw,
                "application",
                crate::adapters::AppLogFormat::Auto,
            );
            has_application_logs = !parsed.is_empty();
            events.extend(parsed);
        }

        self.analyze_events(test_name, &framework_name, events, has_application_logs)
            .await
    }

    /// Analyze a routed collection: one result per test found in the
    /// automation stream.
    pub async fn analyze_collection(
        &self,
        collection: &LogSourceCollection,
    ) -> Result<Vec<AnalysisResult>> {
        let routed = self
            .inner
            .router
            .route(collection, self.inner.config.framework_override())?;
        let partitions = partition_by_test(&routed.events);
        let mut results = Vec::new();
        for (test_name, events) in partitions {
            results.push(
                self.analyze_events(
                    &test_name,
                    &routed.framework,
                    events,
                    routed.has_application_logs,
                )
                .await,
            );
        }
        results.sort_by(|a, b| a.test_name.cmp(&b.test_name));
        Ok(results)
    }

    /// Batch analysis over a bounded worker pool. Per-test failures and
    /// timeouts are captured as ERROR-status results; the batch always
    /// completes.
    pub async fn analyze_batch(
        &self,
        collection: &LogSourceCollection,
        parallel: bool,
    ) -> Result<Vec<AnalysisResult>> {
        if !parallel {
            return self.analyze_collection(collection).await;
        }

        let routed = self
            .inner
            .router
            .route(collection, self.inner.config.framework_override())?;
        let partitions = partition_by_test(&routed.events);
        let framework = routed.framework.clone();
        let budget = Duration::from_secs(self.inner.config.execution.budget_secs);
        let semaphore = Arc::new(Semaphore::new(self.inner.config.execution.max_parallel.max(1)));

        let mut join_set = JoinSet::new();
        for (test_name, events) in partitions {
            if self.inner.cancel.load(Ordering::Relaxed) {
                info!("Cancellation observed, not scheduling further tests");
                break;
            }
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            let framework = framework.clone();
            let has_app = routed.has_application_logs;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let analyzer = Analyzer { inner };
                match tokio::time::timeout(
                    budget,
                    analyzer.analyze_events(&test_name, &framework, events, has_app),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(test = %test_name, "Analysis exceeded budget");
                        AnalysisResult::error(&test_name, &framework, "ANALYSIS_TIMEOUT")
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "Analysis worker died");
                    results.push(AnalysisResult::error("unknown-test", &framework, &e.to_string()));
                }
            }
        }
        results.sort_by(|a, b| a.test_name.cmp(&b.test_name));
        self.persist_patterns();
        Ok(results)
    }

    /// The per-test pipeline; every error path collapses into the result.
    async fn analyze_events(
        &self,
        test_name: &str,
        framework: &str,
        events: Vec<ExecutionEvent>,
        has_application_logs: bool,
    ) -> AnalysisResult {
        if events.is_empty() {
            let mut result = AnalysisResult::error(test_name, framework, "no events parsed");
            result.failure_classification =
                Some(self.inner.classifier.classify(framework, &[]));
            result.has_application_logs = has_application_logs;
            result.timestamp = "1970-01-01T00:00:00+00:00".to_string();
            return result;
        }

        let status = determine_status(&events);
        let signals = self.inner.extractors.extract_all(&events);
        debug!(test = test_name, signals = signals.len(), "Signals extracted");

        let mut classification = (status != TestStatus::Pass)
            .then(|| self.inner.classifier.classify(framework, &signals));

        // Code reference from the first signal or event carrying a stack.
        let code_reference = signals
            .iter()
            .filter_map(|s| s.stacktrace.as_deref())
            .chain(events.iter().filter_map(|e| e.stacktrace.as_deref()))
            .find_map(|stack| self.inner.resolver.resolve(stack));

        if let Some(classification) = classification.as_mut() {
            // History boost reflects earlier runs, so read before recording.
            let history_boost = self.inner.tracker.boost_for_signals(&signals);
            for signal in &signals {
                self.inner.tracker.record(signal);
            }

            let mut app_log_boost = 0.0;
            if has_application_logs {
                if let Some(outcome) = self.inner.correlator.correlate(&events, &signals) {
                    if classification.failure_type == FailureType::ProductDefect {
                        app_log_boost = crate::constants::APP_LOG_CONFIDENCE_BOOST;
                        classification
                            .reason
                            .push_str(" [Application logs confirm product error]");
                    }
                    classification.evidence.push(outcome.basis.describe());
                }
            }

            let rule_confidence = (!classification.rules_applied.is_empty())
                .then_some(classification.confidence);
            let input = CalibrationInput {
                rule_confidence,
                signal_confidences: signals.iter().map(|s| s.confidence).collect(),
                history_boost,
                app_log_boost,
            };
            classification.confidence = self.inner.calibrator.calibrate(&input);
            classification.code_reference = code_reference.clone();

            self.apply_enrichment(test_name, framework, classification).await;
        }

        AnalysisResult {
            test_name: test_name.to_string(),
            framework: framework.to_string(),
            status,
            failure_classification: classification,
            duration_ms: duration_of(&events),
            timestamp: result_timestamp(&events),
            code_reference,
            signals,
            events,
            has_application_logs,
            metadata: Default::default(),
        }
    }

    /// Advisory enrichment: bounded delta, never a type change, errors
    /// discarded so the deterministic verdict stands.
    async fn apply_enrichment(
        &self,
        test_name: &str,
        framework: &str,
        classification: &mut crate::models::FailureClassification,
    ) {
        if !self.inner.config.ai.enabled {
            return;
        }
        let context = EnrichmentContext {
            test_name: test_name.to_string(),
            framework: framework.to_string(),
            evidence_excerpt: truncate(&classification.evidence.join("; "), 500),
        };
        let timeout = Duration::from_millis(self.inner.config.ai.timeout_ms);
        match tokio::time::timeout(
            timeout,
            self.inner.enricher.enrich(classification, &context),
        )
        .await
        {
            Ok(Ok(Some(enrichment))) => {
                let enrichment = sanitize(enrichment, self.inner.config.ai.min_confidence);
                classification.confidence = self
                    .inner
                    .calibrator
                    .apply_ai_delta(classification.confidence, enrichment.confidence_delta);
                classification.ai_insights = Some(enrichment.insights);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Enrichment failed, deterministic result stands");
            }
            Err(_) => {
                warn!("Enrichment timed out, deterministic result stands");
            }
        }
    }

    /// Totals by failure type, confidence histogram and the patterns
    /// hitting the most tests.
    pub fn summarize(&self, results: &[AnalysisResult]) -> Summary {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_bucket: BTreeMap<String, usize> = BTreeMap::new();
        let mut tests_per_pattern: BTreeMap<String, (String, HashSet<String>)> = BTreeMap::new();

        for result in results {
            if let Some(classification) = &result.failure_classification {
                *by_type
                    .entry(classification.failure_type.as_str().to_string())
                    .or_insert(0) += 1;
                *by_bucket
                    .entry(
                        crate::models::ConfidenceBucket::from_confidence(classification.confidence)
                            .as_str()
                            .to_string(),
                    )
                    .or_insert(0) += 1;
            }
            for signal in &result.signals {
                let normalized = self.inner.tracker.normalizer().normalize(&signal.message);
                let hash = pattern_hash(signal.signal_type, &normalized);
                let ignored = matches!(
                    self.inner.tracker.store().get(&hash),
                    Ok(Some(p)) if p.status == crate::models::PatternStatus::Ignored
                );
                if ignored {
                    continue;
                }
                tests_per_pattern
                    .entry(hash)
                    .or_insert_with(|| (normalized, HashSet::new()))
                    .1
                    .insert(result.test_name.clone());
            }
        }

        let mut top_patterns: Vec<PatternCount> = tests_per_pattern
            .into_iter()
            .map(|(hash, (message, tests))| PatternCount {
                pattern_hash: hash,
                normalized_message: message,
                affected_tests: tests.len(),
            })
            .collect();
        top_patterns.sort_by(|a, b| {
            b.affected_tests
                .cmp(&a.affected_tests)
                .then_with(|| a.pattern_hash.cmp(&b.pattern_hash))
        });
        top_patterns.truncate(TOP_PATTERN_LIMIT);

        Summary {
            total: results.len(),
            by_type,
            by_confidence_bucket: by_bucket,
            top_patterns,
        }
    }

    pub fn group(&self, results: &[AnalysisResult]) -> Vec<CorrelationGroup> {
        self.inner.grouper.group(results)
    }

    /// First few ERROR-status tests, for the stderr digest.
    pub fn error_digest(results: &[AnalysisResult]) -> Vec<String> {
        results
            .iter()
            .filter(|r| r.status == TestStatus::Error)
            .take(ERROR_DIGEST_LIMIT)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.test_name,
                    r.metadata
                        .get("error_cause")
                        .map(String::as_str)
                        .unwrap_or("analysis error")
                )
            })
            .collect()
    }

    fn persist_patterns(&self) {
        // File-backed stores flush on drop of the batch; in-memory is a no-op.
        if let Err(e) = self.try_persist_patterns() {
            warn!(error = %e, "Pattern persistence failed, history boost unaffected this run");
        }
    }

    fn try_persist_patterns(&self) -> Result<()> {
        if let Some(path) = &self.inner.config.pattern.state_path {
            let all = self.inner.tracker.store().all()?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&all)?)?;
        }
        Ok(())
    }
}

/// CI gate: fail when any result's failure type is in the fail set.
/// Order-independent over its input.
pub fn should_fail_ci(results: &[AnalysisResult], fail_on: &HashSet<FailureType>) -> bool {
    results.iter().any(|result| {
        result
            .failure_classification
            .as_ref()
            .map_or(false, |c| fail_on.contains(&c.failure_type))
    })
}

pub fn default_fail_on() -> HashSet<FailureType> {
    let mut set = HashSet::new();
    set.insert(FailureType::ProductDefect);
    set
}

/// Split a routed event stream into per-test streams. Automation events
/// keep their extracted test identity; anonymous automation events and
/// all application events are shared context for every test.
fn partition_by_test(events: &[ExecutionEvent]) -> Vec<(String, Vec<ExecutionEvent>)> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for event in events {
        if event.log_source_type == LogSourceType::Automation {
            if let Some(name) = &event.test_name {
                if seen.insert(name.clone()) {
                    order.push(name.clone());
                }
            }
        }
    }

    if order.is_empty() {
        return vec![("unknown-test".to_string(), events.to_vec())];
    }

    order
        .into_iter()
        .map(|name| {
            let test_events: Vec<ExecutionEvent> = events
                .iter()
                .filter(|e| match e.log_source_type {
                    LogSourceType::Automation => {
                        e.test_name.as_deref().map_or(true, |n| n == name)
                    }
                    LogSourceType::Application => true,
                })
                .cloned()
                .collect();
            (name, test_events)
        })
        .collect()
}

fn determine_status(events: &[ExecutionEvent]) -> TestStatus {
    let mut saw_pass = false;
    let mut saw_skip = false;
    for event in events
        .iter()
        .filter(|e| e.log_source_type == LogSourceType::Automation)
    {
        match event.metadata.get("test_status").map(String::as_str) {
            Some("FAILED") | Some("ERROR") => return TestStatus::Fail,
            Some("PASSED") => saw_pass = true,
            Some("SKIPPED") => saw_skip = true,
            _ => {}
        }
        if event.level >= crate::models::LogLevel::Error {
            return TestStatus::Fail;
        }
    }
    if saw_pass {
        TestStatus::Pass
    } else if saw_skip {
        TestStatus::Skip
    } else {
        TestStatus::Pass
    }
}

fn duration_of(events: &[ExecutionEvent]) -> Option<u64> {
    let stamps: Vec<chrono::DateTime<chrono::Utc>> = events
        .iter()
        .filter(|e| e.log_source_type == LogSourceType::Automation)
        .filter_map(|e| e.timestamp_utc())
        .collect();
    let first = stamps.iter().min()?;
    let last = stamps.iter().max()?;
    (*last - *first).num_milliseconds().try_into().ok()
}

/// Result timestamp: the last automation event's, so reruns of the same
/// input produce the same value.
fn result_timestamp(events: &[ExecutionEvent]) -> String {
    events
        .iter()
        .filter(|e| e.log_source_type == LogSourceType::Automation)
        .filter_map(|e| e.timestamp_utc())
        .max()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    fn failed_event(test: &str, message: &str) -> ExecutionEvent {
        let mut event = ExecutionEvent::automation(
            "2024-01-15T10:00:00+00:00".to_string(),
            LogLevel::Error,
            "pytest",
            message.to_string(),
        );
        event.test_name = Some(test.to_string());
        event
    }

    #[tokio::test]
    async fn test_analyze_never_fails_even_on_empty_input() {
        let analyzer = Analyzer::builtin().unwrap();
        let result = analyzer.analyze("", "empty-test", None, None).await;
        assert_eq!(result.status, TestStatus::Error);
        let classification = result.failure_classification.unwrap();
        assert_eq!(classification.failure_type, FailureType::Unknown);
        assert_eq!(classification.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_analyze_is_deterministic() {
        let log = "tests/test_a.py::test_a FAILED\nE       assert 500 == 200\n";
        let analyzer = Analyzer::builtin().unwrap();
        let a = analyzer.analyze(log, "test_a", Some("pytest"), None).await;
        let analyzer_b = Analyzer::builtin().unwrap();
        let b = analyzer_b.analyze(log, "test_a", Some("pytest"), None).await;

        let ca = a.failure_classification.unwrap();
        let cb = b.failure_classification.unwrap();
        assert_eq!(ca.failure_type, cb.failure_type);
        assert_eq!(ca.confidence, cb.confidence);
        assert_eq!(ca.evidence, cb.evidence);
    }

    #[tokio::test]
    async fn test_unknown_framework_becomes_error_result() {
        let analyzer = Analyzer::builtin().unwrap();
        let result = analyzer
            .analyze("whatever", "t", Some("not-a-framework"), None)
            .await;
        assert_eq!(result.status, TestStatus::Error);
    }

    #[test]
    fn test_partitioning_shares_anonymous_and_application_events() {
        let mut anonymous = ExecutionEvent::automation(
            "2024-01-15T09:59:59+00:00".to_string(),
            LogLevel::Warn,
            "pytest",
            "suite-level warning".to_string(),
        );
        anonymous.test_name = None;
        let app = ExecutionEvent::application(
            "2024-01-15T10:00:01+00:00".to_string(),
            LogLevel::Error,
            "svc",
            "service blew up".to_string(),
        );
        let events = vec![
            anonymous,
            failed_event("test_one", "boom"),
            failed_event("test_two", "bang"),
            app,
        ];
        let partitions = partition_by_test(&events);
        assert_eq!(partitions.len(), 2);
        for (_, stream) in &partitions {
            assert_eq!(stream.len(), 3, "own event + anonymous + application");
        }
    }

    #[test]
    fn test_should_fail_ci_is_order_independent() {
        let make = |failure_type| {
            let mut result = AnalysisResult::error("t", "generic", "x");
            result.status = TestStatus::Fail;
            result.failure_classification = Some(crate::models::FailureClassification {
                failure_type,
                confidence: 0.9,
                reason: String::new(),
                evidence: vec![],
                signals: vec![],
                rules_applied: vec![],
                code_reference: None,
                ai_insights: None,
            });
            result
        };
        let a = make(FailureType::ProductDefect);
        let b = make(FailureType::EnvironmentIssue);
        let fail_on = default_fail_on();

        assert!(should_fail_ci(&[a.clone(), b.clone()], &fail_on));
        assert!(should_fail_ci(&[b.clone(), a.clone()], &fail_on));
        assert!(!should_fail_ci(&[b], &fail_on));
    }

    #[tokio::test]
    async fn test_environment_issue_does_not_gate_by_default() {
        let analyzer = Analyzer::builtin().unwrap();
        let result = analyzer
            .analyze(
                "CypressError: cy.request() failed - ECONNREFUSED 127.0.0.1:4000\n",
                "checkout spec",
                Some("cypress"),
                None,
            )
            .await;
        let classification = result.failure_classification.as_ref().unwrap();
        assert_eq!(classification.failure_type, FailureType::EnvironmentIssue);
        assert!(!should_fail_ci(&[result], &default_fail_on()));
    }

    #[tokio::test]
    async fn test_summarize_counts_types_and_buckets() {
        let analyzer = Analyzer::builtin().unwrap();
        let r1 = analyzer
            .analyze(
                "ERROR connection refused by 10.0.0.2:5432\n",
                "t1",
                Some("generic"),
                None,
            )
            .await;
        let r2 = analyzer
            .analyze(
                "ERROR connection refused by 10.0.0.2:5432\n",
                "t2",
                Some("generic"),
                None,
            )
            .await;
        let summary = analyzer.summarize(&[r1, r2]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_type.get("ENVIRONMENT_ISSUE"), Some(&2));
        assert!(!summary.top_patterns.is_empty());
        assert_eq!(summary.top_patterns[0].affected_tests, 2);
    }
}
