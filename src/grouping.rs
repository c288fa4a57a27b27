//! Correlation grouping: cluster related failures across a batch.
//!
//! Four strategies (message similarity, category, temporal proximity,
//! stack shape) propose candidate groups; a test joins the
//! highest-confidence group it qualifies for and residual singletons are
//! dropped. Everything here is deterministic: candidate ordering, tie
//! breaks and group ids are all derived from the input.

use crate::constants::{
    GROUP_SIMILARITY_THRESHOLD, GROUP_TIME_WINDOW_SECS, MIN_GROUP_SIZE, STACK_SIGNATURE_FRAMES,
};
use crate::correlator::STOP_WORDS;
use crate::models::{
    AnalysisResult, CorrelationGroup, FailureType, GroupMember, SignalType,
};
use crate::patterns::MessageNormalizer;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct GroupingItem {
    test_name: String,
    failure_type: FailureType,
    signal_type: SignalType,
    normalized_message: String,
    timestamp: Option<DateTime<Utc>>,
    stack_signature: Option<String>,
    confidence: f64,
}

#[derive(Debug, Clone)]
struct CandidateGroup {
    strategy: &'static str,
    /// Indexes into the item list, with per-member similarity.
    members: Vec<(usize, f64)>,
    confidence: f64,
}

#[derive(Debug, Clone)]
pub struct GroupingConfig {
    pub similarity_threshold: f64,
    pub time_window_seconds: i64,
    pub min_group_size: usize,
    pub stack_frames: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: GROUP_SIMILARITY_THRESHOLD,
            time_window_seconds: GROUP_TIME_WINDOW_SECS,
            min_group_size: MIN_GROUP_SIZE,
            stack_frames: STACK_SIGNATURE_FRAMES,
        }
    }
}

pub struct CorrelationGrouper {
    config: GroupingConfig,
    normalizer: MessageNormalizer,
}

impl CorrelationGrouper {
    pub fn new(config: GroupingConfig) -> Self {
        Self {
            config,
            normalizer: MessageNormalizer::new(),
        }
    }

    pub fn group(&self, results: &[AnalysisResult]) -> Vec<CorrelationGroup> {
        let items = self.collect_items(results);
        if items.len() < self.config.min_group_size {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        candidates.extend(self.by_message_similarity(&items));
        candidates.extend(self.by_category(&items));
        candidates.extend(self.by_temporal_proximity(&items));
        candidates.extend(self.by_stack_shape(&items));

        self.merge(candidates, &items)
    }

    fn collect_items(&self, results: &[AnalysisResult]) -> Vec<GroupingItem> {
        results
            .iter()
            .filter_map(|result| {
                let classification = result.failure_classification.as_ref()?;
                if classification.signals.is_empty()
                    && classification.failure_type == FailureType::Unknown
                {
                    return None;
                }
                // The dominant signal: strongest confidence, first on ties.
                let dominant = classification
                    .signals
                    .iter()
                    .max_by(|a, b| {
                        a.confidence
                            .partial_cmp(&b.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|s| (s.signal_type, s.message.clone(), s.stacktrace.clone()));
                let (signal_type, message, stacktrace) = dominant.unwrap_or((
                    SignalType::Other,
                    classification.reason.clone(),
                    None,
                ));
                Some(GroupingItem {
                    test_name: result.test_name.clone(),
                    failure_type: classification.failure_type,
                    signal_type,
                    normalized_message: self.normalizer.normalize(&message),
                    timestamp: DateTime::parse_from_rfc3339(&result.timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .ok(),
                    stack_signature: stacktrace
                        .as_deref()
                        .map(|s| stack_signature(s, self.config.stack_frames)),
                    confidence: classification.confidence,
                })
            })
            .collect()
    }

    /// Strategy 1: cosine similarity over normalized-message TF vectors.
    fn by_message_similarity(&self, items: &[GroupingItem]) -> Vec<CandidateGroup> {
        let vectors: Vec<HashMap<String, f64>> = items
            .iter()
            .map(|i| tf_vector(&i.normalized_message))
            .collect();

        let mut grouped: HashSet<usize> = HashSet::new();
        let mut candidates = Vec::new();
        for seed in 0..items.len() {
            if grouped.contains(&seed) {
                continue;
            }
            let mut members = vec![(seed, 1.0)];
            for other in (seed + 1)..items.len() {
                if grouped.contains(&other) {
                    continue;
                }
                let similarity = cosine(&vectors[seed], &vectors[other]);
                if similarity >= self.config.similarity_threshold {
                    members.push((other, similarity));
                }
            }
            if members.len() >= self.config.min_group_size {
                for (index, _) in &members {
                    grouped.insert(*index);
                }
                candidates.push(CandidateGroup {
                    strategy: "message",
                    confidence: average(items, &members),
                    members,
                });
            }
        }
        candidates
    }

    /// Strategy 2: shared (failure_type, signal_type).
    fn by_category(&self, items: &[GroupingItem]) -> Vec<CandidateGroup> {
        let mut buckets: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for (index, item) in items.iter().enumerate() {
            buckets
                .entry((
                    item.failure_type.as_str().to_string(),
                    item.signal_type.as_str().to_string(),
                ))
                .or_default()
                .push(index);
        }
        buckets
            .into_values()
            .filter(|members| members.len() >= self.config.min_group_size)
            .map(|members| CandidateGroup {
                strategy: "category",
                confidence: average(
                    items,
                    &members.iter().map(|i| (*i, 1.0)).collect::<Vec<_>>(),
                ) * 0.9,
                members: members.into_iter().map(|i| (i, 1.0)).collect(),
            })
            .collect()
    }

    /// Strategy 3: same category inside a sliding time window.
    fn by_temporal_proximity(&self, items: &[GroupingItem]) -> Vec<CandidateGroup> {
        let window = chrono::Duration::seconds(self.config.time_window_seconds);
        let mut ordered: Vec<usize> = (0..items.len())
            .filter(|i| items[*i].timestamp.is_some())
            .collect();
        ordered.sort_by_key(|i| items[*i].timestamp);

        let mut grouped: HashSet<usize> = HashSet::new();
        let mut candidates = Vec::new();
        for position in 0..ordered.len() {
            let seed = ordered[position];
            if grouped.contains(&seed) {
                continue;
            }
            let seed_time = items[seed].timestamp.expect("filtered to Some");
            let mut members = vec![(seed, 1.0)];
            for &other in ordered.iter().skip(position + 1) {
                if grouped.contains(&other) {
                    continue;
                }
                let other_time = items[other].timestamp.expect("filtered to Some");
                if other_time - seed_time <= window
                    && items[other].failure_type == items[seed].failure_type
                    && items[other].signal_type == items[seed].signal_type
                {
                    members.push((other, 1.0));
                }
            }
            if members.len() >= self.config.min_group_size {
                for (index, _) in &members {
                    grouped.insert(*index);
                }
                candidates.push(CandidateGroup {
                    strategy: "temporal",
                    confidence: average(items, &members) * 0.85,
                    members,
                });
            }
        }
        candidates
    }

    /// Strategy 4: identical top-K stack frame signatures.
    fn by_stack_shape(&self, items: &[GroupingItem]) -> Vec<CandidateGroup> {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, item) in items.iter().enumerate() {
            if let Some(signature) = &item.stack_signature {
                if !signature.is_empty() {
                    buckets.entry(signature.clone()).or_default().push(index);
                }
            }
        }
        buckets
            .into_values()
            .filter(|members| members.len() >= self.config.min_group_size)
            .map(|members| CandidateGroup {
                strategy: "stack",
                confidence: average(
                    items,
                    &members.iter().map(|i| (*i, 1.0)).collect::<Vec<_>>(),
                ) * 0.95,
                members: members.into_iter().map(|i| (i, 1.0)).collect(),
            })
            .collect()
    }

    /// Assign each test to the highest-confidence candidate it belongs
    /// to, then drop what degenerates below the minimum size.
    fn merge(
        &self,
        mut candidates: Vec<CandidateGroup>,
        items: &[GroupingItem],
    ) -> Vec<CorrelationGroup> {
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.strategy.cmp(b.strategy))
                .then_with(|| a.members[0].0.cmp(&b.members[0].0))
        });

        let mut assigned: HashSet<usize> = HashSet::new();
        let mut groups = Vec::new();
        for candidate in candidates {
            let members: Vec<(usize, f64)> = candidate
                .members
                .iter()
                .filter(|(index, _)| !assigned.contains(index))
                .cloned()
                .collect();
            if members.len() < self.config.min_group_size {
                continue;
            }
            for (index, _) in &members {
                assigned.insert(*index);
            }
            groups.push(self.build_group(&candidate, members, items));
        }
        groups
    }

    fn build_group(
        &self,
        candidate: &CandidateGroup,
        members: Vec<(usize, f64)>,
        items: &[GroupingItem],
    ) -> CorrelationGroup {
        let dominant_signal = dominant_signal_type(&members, items);
        let dominant_failure = items[members[0].0].failure_type;
        let (root_cause, recommendation) = templates_for(dominant_signal, dominant_failure);

        let mut names: Vec<String> = members
            .iter()
            .map(|(i, _)| items[*i].test_name.clone())
            .collect();
        names.sort();

        CorrelationGroup {
            group_id: group_id(&names),
            pattern: items[members[0].0].normalized_message.clone(),
            affected_tests: members.len(),
            failure_type: dominant_failure,
            signal_type: dominant_signal,
            confidence: average(items, &members),
            root_cause,
            recommendation,
            members: {
                let mut list: Vec<GroupMember> = members
                    .iter()
                    .map(|(index, similarity)| GroupMember {
                        test_name: items[*index].test_name.clone(),
                        similarity: *similarity,
                    })
                    .collect();
                list.sort_by(|a, b| a.test_name.cmp(&b.test_name));
                list
            },
        }
    }
}

impl Default for CorrelationGrouper {
    fn default() -> Self {
        Self::new(GroupingConfig::default())
    }
}

fn average(items: &[GroupingItem], members: &[(usize, f64)]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    members.iter().map(|(i, _)| items[*i].confidence).sum::<f64>() / members.len() as f64
}

fn dominant_signal_type(members: &[(usize, f64)], items: &[GroupingItem]) -> SignalType {
    let mut counts: BTreeMap<&'static str, (usize, SignalType)> = BTreeMap::new();
    for (index, _) in members {
        let signal_type = items[*index].signal_type;
        let entry = counts.entry(signal_type.as_str()).or_insert((0, signal_type));
        entry.0 += 1;
    }
    counts
        .into_values()
        .max_by_key(|(count, _)| *count)
        .map(|(_, signal_type)| signal_type)
        .unwrap_or(SignalType::Other)
}

/// Deterministic group id derived from the sorted member names.
fn group_id(sorted_names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in sorted_names {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("grp-{hex}")
}

/// First K frame signatures (file:function) of a stack trace.
fn stack_signature(stacktrace: &str, frames: usize) -> String {
    let frame_markers = ["at ", "File \""];
    stacktrace
        .lines()
        .map(str::trim)
        .filter(|l| frame_markers.iter().any(|m| l.starts_with(m)))
        .take(frames)
        .collect::<Vec<_>>()
        .join("|")
}

fn tf_vector(text: &str) -> HashMap<String, f64> {
    let mut vector: HashMap<String, f64> = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '<' && c != '>')
        .filter(|t| t.len() > 2)
        .filter(|t| !STOP_WORDS.contains(t))
    {
        *vector.entry(token.to_string()).or_insert(0.0) += 1.0;
    }
    vector
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(token, weight)| b.get(token).map(|other| weight * other))
        .sum();
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn templates_for(signal_type: SignalType, failure_type: FailureType) -> (String, String) {
    match signal_type {
        SignalType::Database | SignalType::ConnectionError => (
            "Database or backend connection pool saturation".to_string(),
            "Scale the connection pool and add retries around transient connects".to_string(),
        ),
        SignalType::DnsError => (
            "Name resolution failing in the test environment".to_string(),
            "Check DNS configuration and service discovery health".to_string(),
        ),
        SignalType::Timeout => (
            "Shared slowness or resource contention".to_string(),
            "Check infrastructure load before raising timeouts".to_string(),
        ),
        SignalType::Locator => (
            "A UI change broke locators shared across tests".to_string(),
            "Update the shared selectors or page objects".to_string(),
        ),
        SignalType::HttpError => (
            "A backend service is returning errors".to_string(),
            "Inspect service logs and recent deployments".to_string(),
        ),
        SignalType::Infra => (
            "Environment resource exhaustion".to_string(),
            "Increase runner resources or isolate the workload".to_string(),
        ),
        SignalType::Assertion => (
            "A shared behavioral regression".to_string(),
            "Bisect the latest product changes".to_string(),
        ),
        _ => (
            format!("Shared {failure_type} pattern across tests"),
            "Investigate the common failure pattern".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureClassification, FailureSignal, TestStatus};

    fn db_result(name: &str, minute: u32) -> AnalysisResult {
        let signal = FailureSignal::new(
            SignalType::Database,
            "SQLException: connection pool exhausted after 30s".to_string(),
            0.85,
        );
        AnalysisResult {
            test_name: name.to_string(),
            framework: "junit".to_string(),
            status: TestStatus::Fail,
            failure_classification: Some(FailureClassification {
                failure_type: FailureType::EnvironmentIssue,
                confidence: 0.85,
                reason: "Database connectivity or capacity problem".to_string(),
                evidence: vec![],
                signals: vec![signal.clone()],
                rules_applied: vec!["generic.database_unavailable".to_string()],
                code_reference: None,
                ai_insights: None,
            }),
            events: vec![],
            signals: vec![signal],
            code_reference: None,
            duration_ms: Some(1000),
            timestamp: format!("2024-01-15T10:{minute:02}:00Z"),
            has_application_logs: false,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_mass_database_failures_form_one_group() {
        let grouper = CorrelationGrouper::default();
        let results: Vec<AnalysisResult> =
            (0..15).map(|i| db_result(&format!("test_db_{i:02}"), i % 3)).collect();

        let groups = grouper.group(&results);
        assert_eq!(groups.len(), 1, "expected a single merged group");
        let group = &groups[0];
        assert_eq!(group.affected_tests, 15);
        assert_eq!(group.signal_type, SignalType::Database);
        assert!(group.root_cause.to_lowercase().contains("pool"));
        assert!(group.recommendation.to_lowercase().contains("pool")
            || group.recommendation.to_lowercase().contains("retries"));
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let grouper = CorrelationGrouper::default();
        let results: Vec<AnalysisResult> =
            (0..6).map(|i| db_result(&format!("t{i}"), i)).collect();
        let a = grouper.group(&results);
        let b = grouper.group(&results);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].group_id, b[0].group_id);
        let names_a: Vec<_> = a[0].members.iter().map(|m| &m.test_name).collect();
        let names_b: Vec<_> = b[0].members.iter().map(|m| &m.test_name).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn test_singletons_are_not_emitted() {
        let grouper = CorrelationGrouper::default();
        let mut lone = db_result("lonely", 0);
        if let Some(c) = lone.failure_classification.as_mut() {
            c.signals[0] = FailureSignal::new(
                SignalType::Locator,
                "one unique locator failure nobody shares".to_string(),
                0.9,
            );
            c.failure_type = FailureType::AutomationDefect;
            c.signals[0].confidence = 0.9;
        }
        let results = vec![db_result("a", 0), db_result("b", 1), lone];
        let groups = grouper.group(&results);
        assert_eq!(groups.len(), 1);
        assert!(groups[0]
            .members
            .iter()
            .all(|m| m.test_name != "lonely"));
    }

    #[test]
    fn test_empty_batch_has_no_groups() {
        let grouper = CorrelationGrouper::default();
        assert!(grouper.group(&[]).is_empty());
    }
}
