//! Rule engine: declarative YAML rule packs evaluated over a test's
//! signal corpus.
//!
//! Packs layer in precedence order (user overrides, then the framework
//! pack, then generic). Within one priority level rules keep that pack
//! order, then in-pack declaration order; evaluation walks priorities
//! descending and the first full match wins.

use crate::models::{FailureSignal, FailureType};
use crate::{Result, TriageError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

const GENERIC_PACK: &str = include_str!("packs/generic.yaml");
const SELENIUM_PACK: &str = include_str!("packs/selenium.yaml");
const PYTEST_PACK: &str = include_str!("packs/pytest.yaml");
const CYPRESS_PACK: &str = include_str!("packs/cypress.yaml");
const PLAYWRIGHT_PACK: &str = include_str!("packs/playwright.yaml");
const API_PACK: &str = include_str!("packs/api.yaml");

/// One declarative rule as written in a pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub failure_type: FailureType,
    pub confidence: f64,
    #[serde(default)]
    pub priority: i32,
    /// At least one must match the corpus.
    #[serde(default)]
    pub match_any: Vec<String>,
    /// Every one must match.
    #[serde(default)]
    pub requires_all: Vec<String>,
    /// None may match.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Restricts the rule to one framework; unscoped rules apply to all.
    #[serde(default)]
    pub framework: Option<String>,
}

/// A rule-pack file: optional framework key stamped onto rules that do
/// not carry their own scope, plus the rule list.
#[derive(Debug, Deserialize)]
struct RulePackFile {
    #[serde(default)]
    framework: Option<String>,
    rules: Vec<RuleSpec>,
}

/// Case-insensitive substring, or a regex fragment when the pattern
/// carries regex metacharacters.
enum Matcher {
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn compile(raw: &str) -> Self {
        let has_meta = raw
            .chars()
            .any(|c| matches!(c, '\\' | '+' | '*' | '?' | '(' | ')' | '|' | '^' | '$' | '{'));
        if has_meta {
            match Regex::new(&format!("(?i){raw}")) {
                Ok(regex) => return Matcher::Pattern(regex),
                Err(e) => {
                    warn!(pattern = raw, error = %e, "Rule pattern is not valid regex, matching as substring");
                }
            }
        }
        Matcher::Substring(raw.to_lowercase())
    }

    fn matches(&self, corpus: &str) -> bool {
        match self {
            Matcher::Substring(needle) => corpus.contains(needle),
            Matcher::Pattern(regex) => regex.is_match(corpus),
        }
    }

    fn raw(&self) -> String {
        match self {
            Matcher::Substring(needle) => needle.clone(),
            Matcher::Pattern(regex) => regex.as_str().trim_start_matches("(?i)").to_string(),
        }
    }
}

struct CompiledRule {
    spec: RuleSpec,
    match_any: Vec<Matcher>,
    requires_all: Vec<Matcher>,
    excludes: Vec<Matcher>,
}

impl CompiledRule {
    fn new(spec: RuleSpec) -> Self {
        Self {
            match_any: spec.match_any.iter().map(|p| Matcher::compile(p)).collect(),
            requires_all: spec
                .requires_all
                .iter()
                .map(|p| Matcher::compile(p))
                .collect(),
            excludes: spec.excludes.iter().map(|p| Matcher::compile(p)).collect(),
            spec,
        }
    }

    fn evaluate(&self, corpus: &str) -> Option<Vec<String>> {
        let matched: Vec<String> = self
            .match_any
            .iter()
            .filter(|m| m.matches(corpus))
            .map(Matcher::raw)
            .collect();
        if !self.match_any.is_empty() && matched.is_empty() {
            return None;
        }
        if !self.requires_all.iter().all(|m| m.matches(corpus)) {
            return None;
        }
        if self.excludes.iter().any(|m| m.matches(corpus)) {
            return None;
        }
        let mut all = matched;
        all.extend(self.requires_all.iter().map(Matcher::raw));
        Some(all)
    }
}

/// The winning rule plus the patterns that matched, for evidence.
pub struct RuleVerdict {
    pub rule: RuleSpec,
    pub matched_patterns: Vec<String>,
}

pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Engine with only the built-in packs.
    pub fn builtin() -> Result<Self> {
        Self::with_overrides(&[], Vec::new())
    }

    /// Engine with user pack files and inline overrides layered on top of
    /// the built-ins. A rule id seen in a higher-precedence layer shadows
    /// any later definition.
    pub fn with_overrides(user_pack_paths: &[std::path::PathBuf], inline: Vec<RuleSpec>) -> Result<Self> {
        let mut specs: Vec<RuleSpec> = Vec::new();

        for spec in inline {
            specs.push(spec);
        }
        for path in user_pack_paths {
            specs.extend(load_pack_file(path)?);
        }
        for (name, raw) in [
            ("selenium", SELENIUM_PACK),
            ("pytest", PYTEST_PACK),
            ("cypress", CYPRESS_PACK),
            ("playwright", PLAYWRIGHT_PACK),
            ("api", API_PACK),
            ("generic", GENERIC_PACK),
        ] {
            specs.extend(parse_pack(raw, name)?);
        }

        // Shadow duplicate ids: the first (highest-precedence) definition wins.
        let mut seen: HashSet<String> = HashSet::new();
        let mut unique: Vec<RuleSpec> = Vec::new();
        for spec in specs {
            if seen.insert(spec.id.clone()) {
                unique.push(spec);
            } else {
                debug!(rule = %spec.id, "Rule shadowed by higher-precedence definition");
            }
        }

        // Stable sort keeps pack precedence and declaration order for ties.
        unique.sort_by_key(|spec| std::cmp::Reverse(spec.priority));

        Ok(Self {
            rules: unique.into_iter().map(CompiledRule::new).collect(),
        })
    }

    /// Evaluate the loaded rules against one test's signals. Returns the
    /// first full match in descending priority order, or None.
    pub fn evaluate(&self, framework: &str, signals: &[FailureSignal]) -> Option<RuleVerdict> {
        if signals.is_empty() {
            return None;
        }
        let corpus = build_corpus(signals);

        for rule in &self.rules {
            if let Some(scope) = &rule.spec.framework {
                if scope != framework {
                    continue;
                }
            }
            if let Some(matched_patterns) = rule.evaluate(&corpus) {
                debug!(rule = %rule.spec.id, "Rule matched");
                return Some(RuleVerdict {
                    rule: rule.spec.clone(),
                    matched_patterns,
                });
            }
        }
        None
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// The normalized corpus rules match against: every signal contributes a
/// lowercase `[signal_type]` tag, its message and its matched keywords.
fn build_corpus(signals: &[FailureSignal]) -> String {
    let mut corpus = String::new();
    for signal in signals {
        corpus.push('[');
        corpus.push_str(&signal.signal_type.as_str().to_lowercase());
        corpus.push_str("] ");
        corpus.push_str(&signal.message.to_lowercase());
        for keyword in &signal.keywords {
            corpus.push(' ');
            corpus.push_str(&keyword.to_lowercase());
        }
        corpus.push('\n');
    }
    corpus
}

fn parse_pack(raw: &str, name: &str) -> Result<Vec<RuleSpec>> {
    let pack: RulePackFile = serde_yaml::from_str(raw).map_err(|e| TriageError::RulePack {
        path: name.to_string(),
        message: e.to_string(),
    })?;
    let mut ids = HashSet::new();
    for rule in &pack.rules {
        if !ids.insert(rule.id.clone()) {
            return Err(TriageError::RulePack {
                path: name.to_string(),
                message: format!("duplicate rule id: {}", rule.id),
            });
        }
        if !(0.0..=1.0).contains(&rule.confidence) {
            return Err(TriageError::RulePack {
                path: name.to_string(),
                message: format!("rule {} confidence outside [0,1]", rule.id),
            });
        }
    }
    Ok(pack
        .rules
        .into_iter()
        .map(|mut rule| {
            if rule.framework.is_none() {
                rule.framework = pack.framework.clone();
            }
            rule
        })
        .collect())
}

fn load_pack_file(path: &Path) -> Result<Vec<RuleSpec>> {
    let raw = std::fs::read_to_string(path).map_err(|e| TriageError::RulePack {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_pack(&raw, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalType;

    fn signal(signal_type: SignalType, message: &str) -> FailureSignal {
        FailureSignal::new(signal_type, message.to_string(), 0.9)
    }

    #[test]
    fn test_builtin_packs_load() {
        let engine = RuleEngine::builtin().unwrap();
        assert!(engine.rule_count() > 10);
    }

    #[test]
    fn test_locator_signal_classifies_as_automation_defect() {
        let engine = RuleEngine::builtin().unwrap();
        let signals = vec![signal(
            SignalType::Locator,
            "NoSuchElementException: Unable to locate element #login",
        )];
        let verdict = engine.evaluate("selenium", &signals).unwrap();
        assert_eq!(verdict.rule.failure_type, FailureType::AutomationDefect);
        assert!(verdict.rule.confidence >= 0.9);
    }

    #[test]
    fn test_http_error_with_assertion_is_product_defect() {
        let engine = RuleEngine::builtin().unwrap();
        let signals = vec![
            signal(SignalType::Assertion, "assert 500 == 200"),
            signal(SignalType::HttpError, "Response [500] from POST /charge"),
        ];
        let verdict = engine.evaluate("pytest", &signals).unwrap();
        assert_eq!(verdict.rule.failure_type, FailureType::ProductDefect);
        assert!(verdict.rule.confidence >= 0.85);
    }

    #[test]
    fn test_connection_error_is_environment_issue() {
        let engine = RuleEngine::builtin().unwrap();
        let signals = vec![signal(
            SignalType::ConnectionError,
            "ECONNREFUSED 127.0.0.1:4000",
        )];
        let verdict = engine.evaluate("cypress", &signals).unwrap();
        assert_eq!(verdict.rule.failure_type, FailureType::EnvironmentIssue);
    }

    #[test]
    fn test_no_signals_means_no_verdict() {
        let engine = RuleEngine::builtin().unwrap();
        assert!(engine.evaluate("generic", &[]).is_none());
    }

    #[test]
    fn test_priority_and_declaration_order_break_ties() {
        let inline = vec![
            RuleSpec {
                id: "low".to_string(),
                description: "low priority".to_string(),
                failure_type: FailureType::Unknown,
                confidence: 0.5,
                priority: 1,
                match_any: vec!["[timeout]".to_string()],
                requires_all: vec![],
                excludes: vec![],
                framework: None,
            },
            RuleSpec {
                id: "high".to_string(),
                description: "high priority".to_string(),
                failure_type: FailureType::EnvironmentIssue,
                confidence: 0.8,
                priority: 500,
                match_any: vec!["[timeout]".to_string()],
                requires_all: vec![],
                excludes: vec![],
                framework: None,
            },
        ];
        let engine = RuleEngine::with_overrides(&[], inline).unwrap();
        let signals = vec![signal(SignalType::Timeout, "timed out after 30s")];
        let verdict = engine.evaluate("generic", &signals).unwrap();
        assert_eq!(verdict.rule.id, "high");
    }

    #[test]
    fn test_inline_override_shadows_builtin_id() {
        let inline = vec![RuleSpec {
            id: "generic.connection_refused".to_string(),
            description: "overridden".to_string(),
            failure_type: FailureType::ConfigurationIssue,
            confidence: 0.6,
            priority: 900,
            match_any: vec!["[connection_error]".to_string()],
            requires_all: vec![],
            excludes: vec![],
            framework: None,
        }];
        let engine = RuleEngine::with_overrides(&[], inline).unwrap();
        let signals = vec![signal(SignalType::ConnectionError, "connection refused")];
        let verdict = engine.evaluate("generic", &signals).unwrap();
        assert_eq!(verdict.rule.description, "overridden");
        assert_eq!(verdict.rule.failure_type, FailureType::ConfigurationIssue);
    }

    #[test]
    fn test_excludes_veto_a_match() {
        let inline = vec![RuleSpec {
            id: "veto".to_string(),
            description: "vetoed by locator".to_string(),
            failure_type: FailureType::ProductDefect,
            confidence: 0.9,
            priority: 999,
            match_any: vec!["[assertion]".to_string()],
            requires_all: vec![],
            excludes: vec!["[locator]".to_string()],
            framework: None,
        }];
        let engine = RuleEngine::with_overrides(&[], inline).unwrap();
        let signals = vec![
            signal(SignalType::Assertion, "assert failed"),
            signal(SignalType::Locator, "NoSuchElement"),
        ];
        let verdict = engine.evaluate("generic", &signals).unwrap();
        assert_ne!(verdict.rule.id, "veto");
    }
}
