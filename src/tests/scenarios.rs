//! End-to-end scenarios: raw log text in, classified analysis out.

use crate::analyzer::{default_fail_on, should_fail_ci, Analyzer};
use crate::config::Config;
use crate::enrichment::{Enricher, Enrichment, EnrichmentContext};
use crate::models::{
    AiInsights, FailureClassification, FailureType, LogSourceCollection, SignalType,
};
use crate::output::{render, OutputFormat};
use crate::rules::RuleSpec;
use crate::Result;
use async_trait::async_trait;
use std::io::Write;

const SELENIUM_LOCATOR_LOG: &str = r##"2024-03-02 14:11:02,101 INFO starting suite
NoSuchElementException: Unable to locate element: {"method":"css selector","selector":"#login"}
Traceback (most recent call last):
  File "tests/test_login.py", line 42, in test_login
    driver.find_element(By.CSS_SELECTOR, "#login").click()
selenium.common.exceptions.NoSuchElementException: Message: no such element
"##;

const PYTEST_API_LOG: &str = "tests/test_payment.py::test_charge FAILED\n2024-01-15 10:23:45 ERROR request to /charge returned status 500\nE       assert 500 == 200\n";

const PAYMENT_SERVICE_LOG: &str = "2024-01-15 10:23:50,000 ERROR [main] PaymentService - NullPointerException: charge handler returned 500\n";

#[tokio::test]
async fn scenario_selenium_locator_failure() {
    let analyzer = Analyzer::builtin().unwrap();
    let result = analyzer
        .analyze(SELENIUM_LOCATOR_LOG, "test_login", Some("selenium"), None)
        .await;

    let classification = result.failure_classification.as_ref().unwrap();
    assert_eq!(classification.failure_type, FailureType::AutomationDefect);
    assert!(classification.confidence >= 0.9);
    assert!(result
        .signals
        .iter()
        .any(|s| s.signal_type == SignalType::Locator));

    let reference = classification.code_reference.as_ref().unwrap();
    assert!(reference.file.ends_with("test_login.py"));
    assert_eq!(reference.line, 42);
    assert!(classification.evidence.iter().any(|e| e.contains("#login")));
}

#[tokio::test]
async fn scenario_api_500_confirmed_by_app_logs() {
    let analyzer = Analyzer::builtin().unwrap();

    let without_app = analyzer
        .analyze(PYTEST_API_LOG, "test_charge", Some("pytest"), None)
        .await;
    let base = without_app
        .failure_classification
        .as_ref()
        .unwrap()
        .confidence;
    assert!(base >= 0.85);

    let analyzer = Analyzer::builtin().unwrap();
    let with_app = analyzer
        .analyze(
            PYTEST_API_LOG,
            "test_charge",
            Some("pytest"),
            Some(PAYMENT_SERVICE_LOG),
        )
        .await;
    let classification = with_app.failure_classification.as_ref().unwrap();

    assert_eq!(classification.failure_type, FailureType::ProductDefect);
    let expected = (base + 0.15).min(1.0);
    assert!(
        (classification.confidence - expected).abs() < 1e-9,
        "expected exactly base + 0.15 (capped), got {} vs {expected}",
        classification.confidence
    );
    assert!(classification
        .reason
        .contains("[Application logs confirm product error]"));
}

#[tokio::test]
async fn scenario_connection_refused_without_app_logs() {
    let analyzer = Analyzer::builtin().unwrap();
    let result = analyzer
        .analyze(
            "CypressError: cy.request() failed - ECONNREFUSED 127.0.0.1:4000\n",
            "submits order",
            Some("cypress"),
            None,
        )
        .await;

    let classification = result.failure_classification.as_ref().unwrap();
    assert_eq!(classification.failure_type, FailureType::EnvironmentIssue);

    let connection = result
        .signals
        .iter()
        .find(|s| s.signal_type == SignalType::ConnectionError)
        .expect("connection signal");
    assert!(connection.is_retryable);
    assert!(connection.is_infra_related);

    assert!(!should_fail_ci(&[result], &default_fail_on()));
}

#[tokio::test]
async fn scenario_mass_database_failures_group_together() {
    let analyzer = Analyzer::builtin().unwrap();
    let mut results = Vec::new();
    for i in 0..15 {
        let minute = i % 3;
        let log = format!(
            "2024-01-15 10:0{minute}:00 ERROR SQLException: connection pool exhausted while preparing statement\n"
        );
        results.push(
            analyzer
                .analyze(&log, &format!("test_db_{i:02}"), Some("generic"), None)
                .await,
        );
    }

    let groups = analyzer.group(&results);
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.affected_tests, 15);
    assert_eq!(group.signal_type, SignalType::Database);
    assert!(group.root_cause.to_lowercase().contains("database"));
    assert!(
        group.recommendation.to_lowercase().contains("pool")
            || group.recommendation.to_lowercase().contains("scal")
    );
}

/// Enrichment layer that tries to flip the verdict.
struct FlippingEnricher;

#[async_trait]
impl Enricher for FlippingEnricher {
    async fn enrich(
        &self,
        _classification: &FailureClassification,
        _context: &EnrichmentContext,
    ) -> Result<Option<Enrichment>> {
        Ok(Some(Enrichment {
            confidence_delta: 0.13,
            insights: AiInsights {
                summary: "Looks like a PRODUCT_DEFECT in the backend".to_string(),
                suggestions: vec!["File a backend ticket".to_string()],
                provider_confidence: 0.95,
            },
        }))
    }

    fn name(&self) -> &'static str {
        "flipping-stub"
    }
}

#[tokio::test]
async fn scenario_ai_cannot_flip_classification() {
    let mut config = Config::default();
    config.ai.enabled = true;
    config.rules.overrides = vec![RuleSpec {
        id: "team.slow_checkout".to_string(),
        description: "Checkout performance budget exceeded".to_string(),
        failure_type: FailureType::AutomationDefect,
        confidence: 0.82,
        priority: 999,
        match_any: vec!["[slow_test]".to_string()],
        requires_all: vec![],
        excludes: vec![],
        framework: None,
    }];

    let analyzer =
        Analyzer::from_config_with_enricher(config, Box::new(FlippingEnricher)).unwrap();
    let log = "ERROR checkout step failed hard\nWARN checkout took 300 seconds\n";
    let result = analyzer.analyze(log, "test_checkout", Some("generic"), None).await;

    let classification = result.failure_classification.as_ref().unwrap();
    // The deterministic verdict stands; the AI text is advisory only.
    assert_eq!(classification.failure_type, FailureType::AutomationDefect);
    assert!(classification.confidence >= 0.72 && classification.confidence < 0.9);
    let insights = classification.ai_insights.as_ref().unwrap();
    assert!(insights.summary.contains("PRODUCT_DEFECT"));
}

#[tokio::test]
async fn scenario_missing_application_log_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let automation = dir.path().join("run.log");
    let mut file = std::fs::File::create(&automation).unwrap();
    file.write_all(PYTEST_API_LOG.as_bytes()).unwrap();

    let mut with_missing = Config::default();
    with_missing.execution.logs.automation = vec![automation.clone()];
    with_missing.execution.logs.application = vec![crate::config::ApplicationSource::Path(
        dir.path().join("logs/service.log"),
    )];

    let mut without_app = Config::default();
    without_app.execution.logs.automation = vec![automation];

    let a = Analyzer::from_config(with_missing).unwrap();
    let results_a = a
        .analyze_collection(&a_collection(&a).unwrap())
        .await
        .unwrap();
    let b = Analyzer::from_config(without_app).unwrap();
    let results_b = b
        .analyze_collection(&a_collection(&b).unwrap())
        .await
        .unwrap();

    assert_eq!(results_a.len(), results_b.len());
    let ca = results_a[0].failure_classification.as_ref().unwrap();
    let cb = results_b[0].failure_classification.as_ref().unwrap();
    assert_eq!(ca.failure_type, cb.failure_type);
    assert_eq!(ca.confidence, cb.confidence);
    assert_eq!(ca.reason, cb.reason);
}

fn a_collection(analyzer: &Analyzer) -> Result<LogSourceCollection> {
    analyzer.config().log_sources()
}

#[tokio::test]
async fn property_full_document_is_byte_identical_across_runs() {
    let run = || async {
        let analyzer = Analyzer::builtin().unwrap();
        let mut results = Vec::new();
        for (name, log) in [
            ("test_login", SELENIUM_LOCATOR_LOG),
            ("test_charge", PYTEST_API_LOG),
        ] {
            results.push(analyzer.analyze(log, name, None, None).await);
        }
        results.sort_by(|x, y| x.test_name.cmp(&y.test_name));
        let summary = analyzer.summarize(&results);
        let groups = analyzer.group(&results);
        render(OutputFormat::Json, &results, &summary, &groups).unwrap()
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn property_noncorrelating_app_log_never_hurts() {
    let analyzer = Analyzer::builtin().unwrap();
    let plain = analyzer
        .analyze(PYTEST_API_LOG, "test_charge", Some("pytest"), None)
        .await;

    let analyzer = Analyzer::builtin().unwrap();
    let noise = "2024-01-15 10:23:50,000 WARN [main] CacheService - eviction cycle sluggish\n";
    let with_noise = analyzer
        .analyze(PYTEST_API_LOG, "test_charge", Some("pytest"), Some(noise))
        .await;

    let ca = plain.failure_classification.as_ref().unwrap();
    let cb = with_noise.failure_classification.as_ref().unwrap();
    assert_eq!(ca.failure_type, cb.failure_type);
    assert!(cb.confidence >= ca.confidence);
}

#[tokio::test]
async fn property_unicode_survives_the_pipeline() {
    let analyzer = Analyzer::builtin().unwrap();
    let log = "ERROR AssertionError: erwartet 'grün', erhalten 'rot' ✗ 失敗\n";
    let result = analyzer.analyze(log, "unicode_test", Some("generic"), None).await;

    let classification = result.failure_classification.as_ref().unwrap();
    assert!(classification.evidence.iter().any(|e| e.contains("grün") || e.contains("assertionerror")));

    let summary = analyzer.summarize(std::slice::from_ref(&result));
    let json = render(OutputFormat::Json, &[result], &summary, &[]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["results"][0]["classification"].is_object());
}

#[tokio::test]
async fn property_concurrent_analyses_do_not_interfere() {
    let analyzer = Analyzer::builtin().unwrap();
    let names: Vec<String> = (0..8).map(|i| format!("test_{i}")).collect();
    let pending: Vec<_> = names
        .iter()
        .map(|name| {
            analyzer.analyze(
                "ERROR connection refused by upstream\n",
                name,
                Some("generic"),
                None,
            )
        })
        .collect();

    let results = futures::future::join_all(pending).await;
    assert_eq!(results.len(), 8);
    for result in &results {
        let classification = result.failure_classification.as_ref().unwrap();
        assert_eq!(classification.failure_type, FailureType::EnvironmentIssue);
    }
}

#[tokio::test]
async fn property_batch_is_resilient_to_unreadable_members() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.log");
    std::fs::write(&good, "tests/test_ok.py::test_ok FAILED\nE       assert 1 == 2\n").unwrap();

    let mut config = Config::default();
    config.execution.logs.automation = vec![good, dir.path().join("missing.log")];
    let analyzer = Analyzer::from_config(config).unwrap();
    let collection = analyzer.config().log_sources().unwrap();
    let results = analyzer.analyze_batch(&collection, true).await.unwrap();

    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.failure_classification.is_some() || r.status == crate::models::TestStatus::Pass));
}
