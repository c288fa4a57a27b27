use super::*;
use std::io::Write;

fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triage.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn test_minimal_config_loads_with_defaults() {
    let (dir, path) = write_config(
        "execution:\n  logs:\n    automation:\n      - run.log\n",
    );
    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.execution.framework, "auto");
    assert!(config.framework_override().is_none());
    assert_eq!(config.execution.budget_secs, 10);
    assert_eq!(config.correlation.window_seconds, 30);
    assert_eq!(config.correlation.min_shared_tokens, 3);
    assert!((config.grouping.similarity_threshold - 0.8).abs() < 1e-12);
    assert_eq!(config.grouping.min_group_size, 2);
    assert_eq!(config.pattern.n_cap, 20);
    assert_eq!(config.pattern.hash_algo, "sha256");
    assert!(!config.ai.enabled);
    drop(dir);
}

#[test]
fn test_missing_automation_logs_is_a_configuration_error() {
    let (dir, path) = write_config("execution:\n  logs:\n    automation: []\n");
    let result = Config::from_file(&path);
    assert!(matches!(result, Err(TriageError::Configuration(_))));
    drop(dir);
}

#[test]
fn test_env_substitution_with_defaults() {
    std::env::set_var("TRIAGE_TEST_FRAMEWORK", "pytest");
    std::env::remove_var("TRIAGE_TEST_UNSET");

    let substituted = substitute_env(
        "framework: ${TRIAGE_TEST_FRAMEWORK}\nroot: ${TRIAGE_TEST_UNSET:-/workspace}\n",
    );
    assert!(substituted.contains("framework: pytest"));
    assert!(substituted.contains("root: /workspace"));

    std::env::remove_var("TRIAGE_TEST_FRAMEWORK");
}

#[test]
fn test_application_sources_accept_both_shapes() {
    let (dir, path) = write_config(
        "execution:\n  logs:\n    automation:\n      - run.log\n    application:\n      - plain.log\n      - path: svc.log\n        service: payments\n",
    );
    let config = Config::from_file(&path).unwrap();
    let sources = &config.execution.logs.application;
    assert_eq!(sources.len(), 2);
    assert!(sources[0].service().is_none());
    assert_eq!(sources[1].service(), Some("payments"));
    drop(dir);
}

#[test]
fn test_ai_enabled_requires_endpoint() {
    let (dir, path) = write_config(
        "execution:\n  logs:\n    automation:\n      - run.log\nai:\n  enabled: true\n",
    );
    assert!(matches!(
        Config::from_file(&path),
        Err(TriageError::Configuration(_))
    ));
    drop(dir);
}

#[test]
fn test_unsupported_hash_algo_is_rejected() {
    let (dir, path) = write_config(
        "execution:\n  logs:\n    automation:\n      - run.log\npattern:\n  hash_algo: md5\n",
    );
    assert!(matches!(
        Config::from_file(&path),
        Err(TriageError::Configuration(_))
    ));
    drop(dir);
}

#[test]
fn test_directory_expansion_is_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    for name in ["b.log", "a.log", "c.log"] {
        std::fs::File::create(logs.join(name)).unwrap();
    }

    let config = Config {
        execution: ExecutionConfig {
            logs: LogsConfig {
                automation: vec![logs],
                application: vec![],
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let sources = config.log_sources().unwrap();
    let names: Vec<String> = sources
        .automation
        .iter()
        .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.log", "b.log", "c.log"]);
}

#[test]
fn test_inline_rule_overrides_deserialize() {
    let (dir, path) = write_config(
        r#"execution:
  logs:
    automation:
      - run.log
rules:
  overrides:
    - id: team.flaky_checkout
      description: Known flaky checkout sync issue
      failure_type: AUTOMATION_DEFECT
      confidence: 0.8
      priority: 500
      match_any: ["checkout spinner"]
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.rules.overrides.len(), 1);
    assert_eq!(config.rules.overrides[0].id, "team.flaky_checkout");
    drop(dir);
}
