//! System-wide defaults for the analysis pipeline.
//!
//! Every knob here can be overridden through the configuration document;
//! these are the values used when a section is omitted.

// ⚙️ ANALYSIS PIPELINE
/// Wall-clock budget for one test's analysis before it is abandoned
/// with an ANALYSIS_TIMEOUT error result.
pub const ANALYSIS_BUDGET_SECS: u64 = 10;

/// Upper bound on concurrent per-test analyses in a batch run.
pub const MAX_PARALLEL_ANALYSES: usize = 8;

/// Lines of source captured on each side of a resolved failure line.
pub const SNIPPET_CONTEXT_LINES: usize = 5;

// 🔗 APPLICATION LOG CORRELATION
/// Seconds added on both sides of the test window when selecting
/// application events for correlation.
pub const CORRELATION_WINDOW_SECS: i64 = 30;

/// Distinctive tokens (after stop-word removal) two messages must share
/// before they are considered semantically correlated.
pub const MIN_SHARED_TOKENS: usize = 3;

/// Confidence added when application logs confirm a product defect.
pub const APP_LOG_CONFIDENCE_BOOST: f64 = 0.15;

// 📊 PATTERN TRACKING
/// Occurrence count at which the frequency boost saturates.
pub const PATTERN_N_CAP: u64 = 20;

/// Ceiling of the frequency boost contribution.
pub const PATTERN_BOOST_CAP: f64 = 0.15;

/// Hex characters kept from the SHA-256 pattern digest.
pub const PATTERN_HASH_LEN: usize = 16;

// 🧮 GROUPING
/// Cosine similarity at or above which two normalized messages are
/// grouped together.
pub const GROUP_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Sliding window for the temporal grouping strategy.
pub const GROUP_TIME_WINDOW_SECS: i64 = 300;

/// Minimum members before a category group is emitted.
pub const MIN_GROUP_SIZE: usize = 2;

/// Stack frames compared by the stack-shape grouping strategy.
pub const STACK_SIGNATURE_FRAMES: usize = 3;

// 🤖 ENRICHMENT
/// Hard timeout for one enrichment call.
pub const ENRICHMENT_TIMEOUT_SECS: u64 = 30;

/// Enrichment results below this self-reported confidence are discarded.
pub const ENRICHMENT_MIN_CONFIDENCE: f64 = 0.5;

/// Absolute cap on the enrichment confidence adjustment.
pub const ENRICHMENT_MAX_DELTA: f64 = 0.1;

/// Enrichment requests allowed per minute (token bucket).
pub const ENRICHMENT_REQUESTS_PER_MINUTE: u32 = 30;

/// Retry attempts for transient enrichment failures.
pub const ENRICHMENT_MAX_RETRIES: u32 = 3;

/// Base delay for enrichment retry backoff, doubled per attempt with jitter.
pub const ENRICHMENT_BACKOFF_BASE_MS: u64 = 250;

// 🧾 CLASSIFICATION
/// Ceiling for UNKNOWN classifications derived from signals alone.
pub const UNKNOWN_CONFIDENCE_CAP: f64 = 0.5;

/// Tests named in the stderr digest after a batch with errors.
pub const ERROR_DIGEST_LIMIT: usize = 5;

/// Patterns listed by `summarize` as the most frequent offenders.
pub const TOP_PATTERN_LIMIT: usize = 5;
