use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Canonical log levels shared by automation and application events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Map a framework- or logger-specific level name onto the canonical set.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "TRACE" | "DEBUG" | "FINE" | "FINER" | "FINEST" | "VERBOSE" => LogLevel::Debug,
            "INFO" | "INFORMATION" | "NOTICE" | "PASS" | "PASSED" | "OK" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" | "ERR" | "FAIL" | "FAILED" | "SEVERE" => LogLevel::Error,
            "FATAL" | "CRITICAL" | "PANIC" => LogLevel::Fatal,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// Origin of an event: the test automation itself, or a service under test.
///
/// Set by the adapter that parsed the line and never inferred downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogSourceType {
    Automation,
    Application,
}

/// One normalized log record.
///
/// Created by an adapter, immutable afterwards; extractors and correlators
/// only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// ISO-8601 timestamp; synthesized from the run offset when the raw
    /// line carries none.
    pub timestamp: String,
    pub level: LogLevel,
    /// Framework or service that produced the line.
    pub source: String,
    pub message: String,
    pub log_source_type: LogSourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    /// Populated for APPLICATION events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ExecutionEvent {
    pub fn automation(timestamp: String, level: LogLevel, source: &str, message: String) -> Self {
        Self {
            timestamp,
            level,
            source: source.to_string(),
            message,
            log_source_type: LogSourceType::Automation,
            test_name: None,
            test_file: None,
            exception_type: None,
            stacktrace: None,
            service_name: None,
            metadata: HashMap::new(),
        }
    }

    pub fn application(
        timestamp: String,
        level: LogLevel,
        service_name: &str,
        message: String,
    ) -> Self {
        Self {
            timestamp,
            level,
            source: service_name.to_string(),
            message,
            log_source_type: LogSourceType::Application,
            test_name: None,
            test_file: None,
            exception_type: None,
            stacktrace: None,
            service_name: Some(service_name.to_string()),
            metadata: HashMap::new(),
        }
    }

    /// Parsed timestamp, when the adapter produced a well-formed one.
    pub fn timestamp_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .ok()
    }
}

/// Failure modes an extractor can report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Timeout,
    Assertion,
    Locator,
    HttpError,
    ConnectionError,
    DnsError,
    Infra,
    SlowTest,
    MemoryLeak,
    HighCpu,
    Database,
    NullPointer,
    Syntax,
    Import,
    Other,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Timeout => "TIMEOUT",
            SignalType::Assertion => "ASSERTION",
            SignalType::Locator => "LOCATOR",
            SignalType::HttpError => "HTTP_ERROR",
            SignalType::ConnectionError => "CONNECTION_ERROR",
            SignalType::DnsError => "DNS_ERROR",
            SignalType::Infra => "INFRA",
            SignalType::SlowTest => "SLOW_TEST",
            SignalType::MemoryLeak => "MEMORY_LEAK",
            SignalType::HighCpu => "HIGH_CPU",
            SignalType::Database => "DATABASE",
            SignalType::NullPointer => "NULL_POINTER",
            SignalType::Syntax => "SYNTAX",
            SignalType::Import => "IMPORT",
            SignalType::Other => "OTHER",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured evidence of one failure mode inside a test's event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSignal {
    pub signal_type: SignalType,
    /// Representative sample line that triggered the extractor.
    pub message: String,
    /// Extractor-calibrated confidence in [0,1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Identifiers of the patterns that matched, for traceable evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Derived at construction; pure function of signal_type and metadata.
    pub is_retryable: bool,
    /// Derived at construction; pure function of signal_type and metadata.
    pub is_infra_related: bool,
}

impl FailureSignal {
    pub fn new(signal_type: SignalType, message: String, confidence: f64) -> Self {
        let metadata = HashMap::new();
        Self {
            is_retryable: Self::derive_retryable(signal_type, &metadata),
            is_infra_related: Self::derive_infra_related(signal_type),
            signal_type,
            message,
            confidence: confidence.clamp(0.0, 1.0),
            stacktrace: None,
            file: None,
            line: None,
            keywords: Vec::new(),
            patterns: Vec::new(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: String) -> Self {
        self.metadata.insert(key.to_string(), value);
        self.is_retryable = Self::derive_retryable(self.signal_type, &self.metadata);
        self
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.keywords.push(keyword.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern_id: &str) -> Self {
        self.patterns.push(pattern_id.to_string());
        self
    }

    fn derive_retryable(signal_type: SignalType, metadata: &HashMap<String, String>) -> bool {
        match signal_type {
            SignalType::Timeout | SignalType::ConnectionError | SignalType::DnsError => true,
            // Rate-limit responses are transient even though the signal is HTTP.
            SignalType::HttpError => metadata
                .get("http_status")
                .map_or(false, |s| s == "429" || s == "503"),
            _ => false,
        }
    }

    fn derive_infra_related(signal_type: SignalType) -> bool {
        matches!(
            signal_type,
            SignalType::ConnectionError
                | SignalType::DnsError
                | SignalType::Infra
                | SignalType::Database
                | SignalType::HttpError
        )
    }
}

/// The five failure categories the engine can assign
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    ProductDefect,
    AutomationDefect,
    EnvironmentIssue,
    ConfigurationIssue,
    Unknown,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::ProductDefect => "PRODUCT_DEFECT",
            FailureType::AutomationDefect => "AUTOMATION_DEFECT",
            FailureType::EnvironmentIssue => "ENVIRONMENT_ISSUE",
            FailureType::ConfigurationIssue => "CONFIGURATION_ISSUE",
            FailureType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRODUCT_DEFECT" => Ok(FailureType::ProductDefect),
            "AUTOMATION_DEFECT" => Ok(FailureType::AutomationDefect),
            "ENVIRONMENT_ISSUE" => Ok(FailureType::EnvironmentIssue),
            "CONFIGURATION_ISSUE" => Ok(FailureType::ConfigurationIssue),
            "UNKNOWN" => Ok(FailureType::Unknown),
            other => Err(format!("Unknown failure type: {other}")),
        }
    }
}

/// Confidence buckets used for reporting and for the enrichment clamp
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceBucket {
    VeryLow,
    Low,
    Medium,
    High,
}

impl ConfidenceBucket {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceBucket::High
        } else if confidence >= 0.7 {
            ConfidenceBucket::Medium
        } else if confidence >= 0.5 {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::VeryLow
        }
    }

    /// Inclusive lower and exclusive upper bound of the bucket.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            ConfidenceBucket::VeryLow => (0.0, 0.5),
            ConfidenceBucket::Low => (0.5, 0.7),
            ConfidenceBucket::Medium => (0.7, 0.9),
            ConfidenceBucket::High => (0.9, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBucket::VeryLow => "VERY_LOW",
            ConfidenceBucket::Low => "LOW",
            ConfidenceBucket::Medium => "MEDIUM",
            ConfidenceBucket::High => "HIGH",
        }
    }
}

/// The resolved user-code site of a failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReference {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

/// Advisory output of the optional enrichment layer.
///
/// Never alters the deterministic fields of a classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiInsights {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// The enrichment layer's own confidence in its advice.
    pub provider_confidence: f64,
}

/// The verdict for one test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureClassification {
    /// Decided exclusively by rule evaluation (UNKNOWN when no rule fires).
    pub failure_type: FailureType,
    pub confidence: f64,
    pub reason: String,
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<FailureSignal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules_applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_reference: Option<CodeReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<AiInsights>,
}

/// Outcome of one test as reported by its framework
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Skip,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Skip => "SKIP",
        }
    }
}

/// Per-test output of the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub test_name: String,
    pub framework: String,
    pub status: TestStatus,
    /// Absent when the test passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_classification: Option<FailureClassification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ExecutionEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<FailureSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_reference: Option<CodeReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: String,
    pub has_application_logs: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AnalysisResult {
    /// ERROR-status result produced at the per-test fault boundary.
    pub fn error(test_name: &str, framework: &str, cause: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error_cause".to_string(), cause.to_string());
        Self {
            test_name: test_name.to_string(),
            framework: framework.to_string(),
            status: TestStatus::Error,
            failure_classification: None,
            events: Vec::new(),
            signals: Vec::new(),
            code_reference: None,
            duration_ms: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            has_application_logs: false,
            metadata,
        }
    }
}

/// Lifecycle state of a tracked pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternStatus {
    Open,
    Investigating,
    Resolved,
    Ignored,
}

/// A deduplicated failure signature tracked across runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Deterministic function of signal_type and normalized message.
    pub pattern_hash: String,
    pub normalized_message: String,
    pub signal_type: SignalType,
    pub first_seen: String,
    pub last_seen: String,
    pub occurrence_count: u64,
    pub status: PatternStatus,
}

/// One member of a correlation group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub test_name: String,
    pub similarity: f64,
}

/// A cluster of related failures across a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationGroup {
    pub group_id: String,
    pub pattern: String,
    pub affected_tests: usize,
    pub failure_type: FailureType,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub root_cause: String,
    pub recommendation: String,
    pub members: Vec<GroupMember>,
}

/// Kind of parser family a log source is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Automation,
    Application,
}

/// One configured log source
#[derive(Debug, Clone)]
pub struct LogSource {
    pub path: std::path::PathBuf,
    pub kind: SourceKind,
    /// Service name attached to APPLICATION events from this source.
    pub service_name: Option<String>,
}

/// Input contract for one analysis invocation.
///
/// At least one automation source is required; application sources are
/// purely additive.
#[derive(Debug, Clone, Default)]
pub struct LogSourceCollection {
    pub automation: Vec<LogSource>,
    pub application: Vec<LogSource>,
}

impl LogSourceCollection {
    pub fn automation_paths(paths: Vec<std::path::PathBuf>) -> Self {
        Self {
            automation: paths
                .into_iter()
                .map(|path| LogSource {
                    path,
                    kind: SourceKind::Automation,
                    service_name: None,
                })
                .collect(),
            application: Vec::new(),
        }
    }
}
