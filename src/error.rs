use thiserror::Error;

/// Convenience type alias for Results with TriageError
pub type Result<T> = std::result::Result<T, TriageError>;

/// Main error type for the execution intelligence engine
///
/// Only `Configuration` terminates a run; every other variant is caught at
/// the per-test fault boundary and turned into an ERROR-status result.
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Rule pack error: {path} - {message}")]
    RulePack { path: String, message: String },

    #[error("Log source error: {path} - {message}")]
    LogSource { path: String, message: String },

    #[error("Analysis error: {test_name} - {message}")]
    Analysis { test_name: String, message: String },

    #[error("Analysis timed out after {budget_secs}s: {test_name}")]
    AnalysisTimeout { test_name: String, budget_secs: u64 },

    #[error("Pattern store error: {0}")]
    PatternStore(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Enrichment API error: {0}")]
    EnrichmentApi(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TriageError {
    /// True for errors the enrichment client may retry (transient network,
    /// rate limit, 5xx). Parse and validation errors are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            TriageError::EnrichmentApi(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }
}
