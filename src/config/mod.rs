use crate::constants;
use crate::models::{LogSource, LogSourceCollection, SourceKind};
use crate::rules::RuleSpec;
use crate::{Result, TriageError};
use config::{File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(test)]
mod tests;

/// Top-level configuration document for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub grouping: GroupingSettings,
    #[serde(default)]
    pub pattern: PatternConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Adapter name, or "auto" for signature-based detection.
    #[serde(default = "default_framework")]
    pub framework: String,
    /// Workspace root for source snippet resolution.
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    #[serde(default)]
    pub logs: LogsConfig,
    /// Wall-clock budget per test analysis.
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// Worker bound for batch analysis.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            framework: default_framework(),
            source_root: default_source_root(),
            logs: LogsConfig::default(),
            budget_secs: default_budget_secs(),
            max_parallel: default_max_parallel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogsConfig {
    /// Automation log files or directories. At least one is required.
    #[serde(default)]
    pub automation: Vec<PathBuf>,
    /// Optional service logs; missing entries are skipped, never fatal.
    #[serde(default)]
    pub application: Vec<ApplicationSource>,
}

/// An application log source: a bare path, or a path with the service
/// name stamped onto its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApplicationSource {
    Path(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        service: Option<String>,
    },
}

impl ApplicationSource {
    pub fn path(&self) -> &Path {
        match self {
            ApplicationSource::Path(path) => path,
            ApplicationSource::Detailed { path, .. } => path,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            ApplicationSource::Path(_) => None,
            ApplicationSource::Detailed { service, .. } => service.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    /// Extra rule pack files, highest precedence first.
    #[serde(default)]
    pub packs: Vec<PathBuf>,
    /// Inline rule overrides; precedence above any pack file.
    #[serde(default)]
    pub overrides: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    /// API key value, normally injected via ${VAR} substitution.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ai_min_confidence")]
    pub min_confidence: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            timeout_ms: default_ai_timeout_ms(),
            min_confidence: default_ai_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    #[serde(default = "default_min_shared_tokens")]
    pub min_shared_tokens: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            min_shared_tokens: default_min_shared_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingSettings {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_time_window_seconds")]
    pub time_window_seconds: i64,
    #[serde(default = "default_min_group_size")]
    pub min_group_size: usize,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            time_window_seconds: default_time_window_seconds(),
            min_group_size: default_min_group_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default = "default_hash_algo")]
    pub hash_algo: String,
    #[serde(default = "default_n_cap")]
    pub n_cap: u64,
    /// Pattern history file; in-memory only when unset.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            hash_algo: default_hash_algo(),
            n_cap: default_n_cap(),
            state_path: None,
        }
    }
}

impl Config {
    /// Load a configuration document, applying `${VAR:-default}`
    /// environment substitution before parsing.
    pub fn from_file(path: &Path) -> Result<Self> {
        // .env is a convenience for local runs; absence is fine.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded .env from {path:?}"),
            Err(_) => tracing::debug!("No .env file found"),
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            TriageError::Configuration(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        let substituted = substitute_env(&raw);

        let config: Config = config::Config::builder()
            .add_source(File::from_str(&substituted, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.logs.automation.is_empty() {
            return Err(TriageError::Configuration(
                "execution.logs.automation requires at least one path".to_string(),
            ));
        }
        if self.pattern.hash_algo.to_lowercase() != "sha256" {
            return Err(TriageError::Configuration(format!(
                "pattern.hash_algo '{}' is not supported (only sha256)",
                self.pattern.hash_algo
            )));
        }
        if !(0.0..=1.0).contains(&self.ai.min_confidence) {
            return Err(TriageError::Configuration(
                "ai.min_confidence must be within [0,1]".to_string(),
            ));
        }
        if self.ai.enabled && self.ai.endpoint.trim().is_empty() {
            return Err(TriageError::Configuration(
                "ai.enabled requires ai.endpoint".to_string(),
            ));
        }
        if self.grouping.similarity_threshold <= 0.0 || self.grouping.similarity_threshold > 1.0 {
            return Err(TriageError::Configuration(
                "grouping.similarity_threshold must be in (0,1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand the configured log paths into the router's input contract.
    /// Directories contribute their files in sorted order.
    pub fn log_sources(&self) -> Result<LogSourceCollection> {
        let mut automation = Vec::new();
        for path in &self.execution.logs.automation {
            for expanded in expand_path(path) {
                automation.push(LogSource {
                    path: expanded,
                    kind: SourceKind::Automation,
                    service_name: None,
                });
            }
        }
        if automation.is_empty() {
            return Err(TriageError::Configuration(format!(
                "no automation log files found under configured paths: {:?}",
                self.execution.logs.automation
            )));
        }

        let application = self
            .execution
            .logs
            .application
            .iter()
            .flat_map(|source| {
                let service = source.service().map(str::to_string);
                expand_path(source.path())
                    .into_iter()
                    .map(move |path| LogSource {
                        path,
                        kind: SourceKind::Application,
                        service_name: service.clone(),
                    })
            })
            .collect();

        Ok(LogSourceCollection {
            automation,
            application,
        })
    }

    pub fn framework_override(&self) -> Option<&str> {
        let framework = self.execution.framework.trim();
        if framework.is_empty() || framework.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(framework)
        }
    }
}

/// `${VAR}` and `${VAR:-default}` substitution.
pub fn substitute_env(raw: &str) -> String {
    let pattern =
        Regex::new(r"\$\{(?P<var>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<default>[^}]*))?\}").unwrap();
    pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            match std::env::var(&caps["var"]) {
                Ok(value) if !value.is_empty() => value,
                _ => caps
                    .name("default")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

/// A file stays itself; a directory expands to its files, sorted for
/// deterministic ordering. Missing paths pass through untouched so the
/// router can report them per its own policy.
fn expand_path(path: &Path) -> Vec<PathBuf> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    }
}

fn default_framework() -> String {
    "auto".to_string()
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_budget_secs() -> u64 {
    constants::ANALYSIS_BUDGET_SECS
}

fn default_max_parallel() -> usize {
    constants::MAX_PARALLEL_ANALYSES
}

fn default_ai_timeout_ms() -> u64 {
    constants::ENRICHMENT_TIMEOUT_SECS * 1000
}

fn default_ai_min_confidence() -> f64 {
    constants::ENRICHMENT_MIN_CONFIDENCE
}

fn default_window_seconds() -> i64 {
    constants::CORRELATION_WINDOW_SECS
}

fn default_min_shared_tokens() -> usize {
    constants::MIN_SHARED_TOKENS
}

fn default_similarity_threshold() -> f64 {
    constants::GROUP_SIMILARITY_THRESHOLD
}

fn default_time_window_seconds() -> i64 {
    constants::GROUP_TIME_WINDOW_SECS
}

fn default_min_group_size() -> usize {
    constants::MIN_GROUP_SIZE
}

fn default_hash_algo() -> String {
    "sha256".to_string()
}

fn default_n_cap() -> u64 {
    constants::PATTERN_N_CAP
}
