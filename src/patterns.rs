//! Pattern tracking: normalized failure signatures persisted across runs.
//!
//! The tracker depends on storage only through [`PatternStore`]; a local
//! map, a JSON file, SQLite or Redis all satisfy it.

use crate::constants::{PATTERN_BOOST_CAP, PATTERN_HASH_LEN, PATTERN_N_CAP};
use crate::models::{FailureSignal, Pattern, PatternStatus, SignalType};
use crate::{Result, TriageError};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Deterministic message normalizer.
///
/// Volatile fragments (numbers, ids, paths, timestamps, addresses, URLs,
/// quoted literals) collapse to canonical placeholders so that two
/// occurrences of the same failure hash identically.
pub struct MessageNormalizer {
    timestamp: Regex,
    uuid: Regex,
    url: Regex,
    path: Regex,
    addr: Regex,
    hex_run: Regex,
    quoted: Regex,
    number: Regex,
    whitespace: Regex,
    noise_prefix: Regex,
}

impl MessageNormalizer {
    pub fn new() -> Self {
        Self {
            timestamp: Regex::new(
                r"\d{4}-\d{2}-\d{2}[t ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:z|[+-]\d{2}:?\d{2})?",
            )
            .unwrap(),
            uuid: Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
                .unwrap(),
            url: Regex::new(r#"https?://[^\s"'<>]+"#).unwrap(),
            path: Regex::new(r"(?:[a-z]:)?(?:[\\/][\w.$@~+-]+){2,}").unwrap(),
            addr: Regex::new(r"0x[0-9a-f]+").unwrap(),
            hex_run: Regex::new(r"\b[0-9a-f]{8,}\b").unwrap(),
            quoted: Regex::new(r#""[^"]*"|'[^']*'"#).unwrap(),
            number: Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
            noise_prefix: Regex::new(
                r"^(?:\[[^\]]*\]\s*|e\s+|fail(?:ed)?[:!]\s*|error[:!]\s*|stderr[:|]\s*)+",
            )
            .unwrap(),
        }
    }

    /// Lowercase, placeholder-substitute, collapse whitespace, strip
    /// framework noise prefixes. Replacement order matters: composite
    /// shapes (timestamps, UUIDs, URLs) go before their components.
    pub fn normalize(&self, message: &str) -> String {
        let mut text = message.to_lowercase();
        text = self.timestamp.replace_all(&text, "<TS>").into_owned();
        text = self.uuid.replace_all(&text, "<UUID>").into_owned();
        text = self.url.replace_all(&text, "<URL>").into_owned();
        text = self.quoted.replace_all(&text, "<STR>").into_owned();
        text = self.path.replace_all(&text, "<PATH>").into_owned();
        text = self.addr.replace_all(&text, "<ADDR>").into_owned();
        text = self.hex_run.replace_all(&text, "<ADDR>").into_owned();
        text = self.number.replace_all(&text, "<NUM>").into_owned();
        text = self.noise_prefix.replace(&text, "").into_owned();
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

impl Default for MessageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of `signal_type || "|" || normalized_message`, truncated to 16
/// hex characters. The deduplication key for pattern storage.
pub fn pattern_hash(signal_type: SignalType, normalized_message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signal_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_message.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..PATTERN_HASH_LEN].to_string()
}

/// Narrow storage interface the tracker depends on.
///
/// Both operations are atomic with respect to concurrent analyses.
pub trait PatternStore: Send + Sync {
    /// Insert the pattern or increment its occurrence count, updating
    /// `last_seen`. New rows start with `status = OPEN`.
    fn upsert_increment(&self, pattern: Pattern) -> Result<Pattern>;

    fn get(&self, pattern_hash: &str) -> Result<Option<Pattern>>;

    fn all(&self) -> Result<Vec<Pattern>>;
}

/// Map-backed store; the default when no state directory is configured.
#[derive(Default)]
pub struct InMemoryPatternStore {
    patterns: Mutex<HashMap<String, Pattern>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatternStore for InMemoryPatternStore {
    fn upsert_increment(&self, pattern: Pattern) -> Result<Pattern> {
        let mut patterns = self
            .patterns
            .lock()
            .map_err(|e| TriageError::PatternStore(format!("lock poisoned: {e}")))?;
        let entry = patterns
            .entry(pattern.pattern_hash.clone())
            .and_modify(|existing| {
                existing.occurrence_count += 1;
                existing.last_seen = pattern.last_seen.clone();
            })
            .or_insert(pattern);
        Ok(entry.clone())
    }

    fn get(&self, pattern_hash: &str) -> Result<Option<Pattern>> {
        let patterns = self
            .patterns
            .lock()
            .map_err(|e| TriageError::PatternStore(format!("lock poisoned: {e}")))?;
        Ok(patterns.get(pattern_hash).cloned())
    }

    fn all(&self) -> Result<Vec<Pattern>> {
        let patterns = self
            .patterns
            .lock()
            .map_err(|e| TriageError::PatternStore(format!("lock poisoned: {e}")))?;
        let mut all: Vec<Pattern> = patterns.values().cloned().collect();
        all.sort_by(|a, b| a.pattern_hash.cmp(&b.pattern_hash));
        Ok(all)
    }
}

/// JSON-file-backed store for history that outlives a single run.
///
/// The file is loaded eagerly; `persist` writes it back after a batch.
/// Any storage failure degrades to "no frequency boost" upstream.
pub struct FilePatternStore {
    path: PathBuf,
    inner: InMemoryPatternStore,
}

impl FilePatternStore {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = InMemoryPatternStore::new();
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let loaded: Vec<Pattern> = serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Pattern state unreadable, starting fresh");
                Vec::new()
            });
            let mut patterns = inner
                .patterns
                .lock()
                .map_err(|e| TriageError::PatternStore(format!("lock poisoned: {e}")))?;
            for pattern in loaded {
                patterns.insert(pattern.pattern_hash.clone(), pattern);
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn persist(&self) -> Result<()> {
        let all = self.inner.all()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        debug!(path = %self.path.display(), patterns = all.len(), "Pattern state persisted");
        Ok(())
    }
}

impl PatternStore for FilePatternStore {
    fn upsert_increment(&self, pattern: Pattern) -> Result<Pattern> {
        self.inner.upsert_increment(pattern)
    }

    fn get(&self, pattern_hash: &str) -> Result<Option<Pattern>> {
        self.inner.get(pattern_hash)
    }

    fn all(&self) -> Result<Vec<Pattern>> {
        self.inner.all()
    }
}

/// Records signal occurrences and computes the history boost.
pub struct PatternTracker {
    normalizer: MessageNormalizer,
    store: Box<dyn PatternStore>,
    n_cap: u64,
}

impl PatternTracker {
    pub fn new(store: Box<dyn PatternStore>, n_cap: u64) -> Self {
        Self {
            normalizer: MessageNormalizer::new(),
            store,
            n_cap: n_cap.max(1),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryPatternStore::new()), PATTERN_N_CAP)
    }

    /// Record one signal occurrence; returns the updated pattern, or None
    /// when storage failed (logged at WARN, analysis continues).
    pub fn record(&self, signal: &FailureSignal) -> Option<Pattern> {
        let normalized = self.normalizer.normalize(&signal.message);
        let hash = pattern_hash(signal.signal_type, &normalized);
        let now = chrono::Utc::now().to_rfc3339();
        let candidate = Pattern {
            pattern_hash: hash.clone(),
            normalized_message: normalized,
            signal_type: signal.signal_type,
            first_seen: now.clone(),
            last_seen: now,
            occurrence_count: 1,
            status: PatternStatus::Open,
        };
        match self.store.upsert_increment(candidate) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(hash = %hash, error = %e, "Pattern upsert failed, continuing without history");
                None
            }
        }
    }

    /// Frequency boost with diminishing returns: `log(1+n) / log(1+n_cap)`,
    /// clamped to [0, PATTERN_BOOST_CAP].
    pub fn frequency_boost(&self, occurrence_count: u64) -> f64 {
        let raw = ((1 + occurrence_count) as f64).ln() / ((1 + self.n_cap) as f64).ln();
        (raw * PATTERN_BOOST_CAP).clamp(0.0, PATTERN_BOOST_CAP)
    }

    /// Boost for the strongest pattern among a test's signals.
    pub fn boost_for_signals(&self, signals: &[FailureSignal]) -> f64 {
        signals
            .iter()
            .filter_map(|signal| {
                let normalized = self.normalizer.normalize(&signal.message);
                let hash = pattern_hash(signal.signal_type, &normalized);
                match self.store.get(&hash) {
                    Ok(Some(pattern)) => Some(self.frequency_boost(pattern.occurrence_count)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(error = %e, "Pattern read failed, skipping history boost");
                        None
                    }
                }
            })
            .fold(0.0, f64::max)
    }

    pub fn normalizer(&self) -> &MessageNormalizer {
        &self.normalizer
    }

    pub fn store(&self) -> &dyn PatternStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalType;

    #[test]
    fn test_normalization_replaces_volatile_fragments() {
        let normalizer = MessageNormalizer::new();
        let cases = vec![
            (
                "Retry 3 of 5 failed after 3000 ms",
                "retry <NUM> of <NUM> failed after <NUM> ms",
            ),
            (
                "request 0x7fff5fbff8a0 died",
                "request <ADDR> died",
            ),
            (
                "GET https://api.example.com/v1/users returned 503",
                "get <URL> returned <NUM>",
            ),
            (
                "session 6f1e4bd2-9c7a-4f52-8d3b-2a1e9c7b4f52 expired",
                "session <UUID> expired",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(normalizer.normalize(input), expected);
        }
    }

    #[test]
    fn test_normalization_strips_noise_prefix_and_whitespace() {
        let normalizer = MessageNormalizer::new();
        assert_eq!(
            normalizer.normalize("[ERROR]   something   broke"),
            "something broke"
        );
        assert_eq!(
            normalizer.normalize("FAILED: element 'btn' missing"),
            "element <STR> missing"
        );
    }

    #[test]
    fn test_hash_is_stable_for_equal_normalized_messages() {
        let normalizer = MessageNormalizer::new();
        let a = normalizer.normalize("timeout after 30 s on node 7");
        let b = normalizer.normalize("timeout after 45 s on node 12");
        assert_eq!(a, b);
        assert_eq!(
            pattern_hash(SignalType::Timeout, &a),
            pattern_hash(SignalType::Timeout, &b)
        );
        // Same message, different signal type: different key.
        assert_ne!(
            pattern_hash(SignalType::Timeout, &a),
            pattern_hash(SignalType::Database, &a)
        );
    }

    #[test]
    fn test_hash_is_16_hex_chars_and_unicode_safe() {
        let hash = pattern_hash(SignalType::Assertion, "erwartet 'grün', erhalten 'rot' ✗");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_upsert_increments_occurrence_count() {
        let tracker = PatternTracker::in_memory();
        let signal = FailureSignal::new(
            SignalType::Database,
            "connection pool exhausted after 30s".to_string(),
            0.8,
        );

        let first = tracker.record(&signal).unwrap();
        assert_eq!(first.occurrence_count, 1);
        assert_eq!(first.status, PatternStatus::Open);

        let second = tracker.record(&signal).unwrap();
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.pattern_hash, first.pattern_hash);
    }

    #[test]
    fn test_frequency_boost_has_diminishing_returns_and_cap() {
        let tracker = PatternTracker::in_memory();
        let b1 = tracker.frequency_boost(1);
        let b5 = tracker.frequency_boost(5);
        let b20 = tracker.frequency_boost(20);
        let b1000 = tracker.frequency_boost(1000);

        assert!(b1 > 0.0);
        assert!(b5 > b1);
        assert!(b20 > b5);
        assert!(b5 - b1 > b20 - b5, "growth must flatten");
        assert!(b1000 <= PATTERN_BOOST_CAP + 1e-9);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let now = chrono::Utc::now().to_rfc3339();

        let store = FilePatternStore::open(&path).unwrap();
        store
            .upsert_increment(Pattern {
                pattern_hash: "ab12cd34ef56ab78".to_string(),
                normalized_message: "timed out after <NUM>s".to_string(),
                signal_type: SignalType::Timeout,
                first_seen: now.clone(),
                last_seen: now,
                occurrence_count: 1,
                status: PatternStatus::Open,
            })
            .unwrap();
        store.persist().unwrap();

        let reloaded = FilePatternStore::open(&path).unwrap();
        let all = reloaded.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].pattern_hash, "ab12cd34ef56ab78");
        assert_eq!(all[0].occurrence_count, 1);
    }
}
