//! Output rendering: the canonical JSON document plus human-readable
//! text and summary formats.
//!
//! The JSON layout is a contract for downstream tooling: field order is
//! fixed, floats render with four decimals, enum names are stable. Maps
//! are emitted in sorted key order so identical runs are byte-identical.

use crate::analyzer::Summary;
use crate::models::{AnalysisResult, CorrelationGroup};
use crate::Result;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
    Summary,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

pub fn render(
    format: OutputFormat,
    results: &[AnalysisResult],
    summary: &Summary,
    groups: &[CorrelationGroup],
) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(results, summary, groups),
        OutputFormat::Text => Ok(render_text(results, summary, groups)),
        OutputFormat::Summary => Ok(render_summary(summary)),
    }
}

/// Four-decimal fixed-precision float rendering, part of the contract.
fn fixed(value: f64) -> String {
    format!("{value:.4}")
}

fn json_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn render_json(
    results: &[AnalysisResult],
    summary: &Summary,
    groups: &[CorrelationGroup],
) -> Result<String> {
    let mut out = String::new();
    out.push_str("{\"version\":\"1\",\"summary\":");
    write_summary_json(&mut out, summary)?;
    out.push_str(",\"results\":[");
    for (index, result) in results.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_result_json(&mut out, result)?;
    }
    out.push_str("],\"groups\":[");
    for (index, group) in groups.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_group_json(&mut out, group)?;
    }
    out.push_str("]}");
    Ok(out)
}

fn write_summary_json(out: &mut String, summary: &Summary) -> Result<()> {
    let _ = write!(out, "{{\"total\":{}", summary.total);
    out.push_str(",\"by_type\":{");
    for (index, (key, count)) in summary.by_type.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}:{count}", json_string(key)?);
    }
    out.push_str("},\"by_confidence_bucket\":{");
    for (index, (key, count)) in summary.by_confidence_bucket.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}:{count}", json_string(key)?);
    }
    out.push_str("},\"top_patterns\":[");
    for (index, pattern) in summary.top_patterns.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "{{\"pattern_hash\":{},\"normalized_message\":{},\"affected_tests\":{}}}",
            json_string(&pattern.pattern_hash)?,
            json_string(&pattern.normalized_message)?,
            pattern.affected_tests
        );
    }
    out.push_str("]}");
    Ok(())
}

fn write_result_json(out: &mut String, result: &AnalysisResult) -> Result<()> {
    let _ = write!(
        out,
        "{{\"test_name\":{},\"framework\":{},\"status\":{}",
        json_string(&result.test_name)?,
        json_string(&result.framework)?,
        json_string(result.status.as_str())?
    );
    if let Some(classification) = &result.failure_classification {
        out.push_str(",\"classification\":{");
        let _ = write!(
            out,
            "\"failure_type\":{},\"confidence\":{},\"reason\":{}",
            json_string(classification.failure_type.as_str())?,
            fixed(classification.confidence),
            json_string(&classification.reason)?
        );
        out.push_str(",\"evidence\":[");
        for (index, item) in classification.evidence.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push_str(&json_string(item)?);
        }
        out.push_str("],\"rules_applied\":[");
        for (index, rule) in classification.rules_applied.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push_str(&json_string(rule)?);
        }
        out.push(']');
        if let Some(reference) = &classification.code_reference {
            let _ = write!(
                out,
                ",\"code_reference\":{{\"file\":{},\"line\":{}",
                json_string(&reference.file)?,
                reference.line
            );
            if let Some(snippet) = &reference.snippet {
                let _ = write!(out, ",\"snippet\":{}", json_string(snippet)?);
            }
            out.push('}');
        }
        if let Some(insights) = &classification.ai_insights {
            let _ = write!(
                out,
                ",\"ai_insights\":{{\"summary\":{},\"provider_confidence\":{}}}",
                json_string(&insights.summary)?,
                fixed(insights.provider_confidence)
            );
        }
        let _ = write!(
            out,
            ",\"has_application_logs\":{}",
            result.has_application_logs
        );
        out.push('}');
    }
    out.push('}');
    Ok(())
}

fn write_group_json(out: &mut String, group: &CorrelationGroup) -> Result<()> {
    let _ = write!(
        out,
        "{{\"group_id\":{},\"pattern\":{},\"affected_tests\":{},\"failure_type\":{},\"signal_type\":{},\"confidence\":{},\"root_cause\":{},\"recommendation\":{}",
        json_string(&group.group_id)?,
        json_string(&group.pattern)?,
        group.affected_tests,
        json_string(group.failure_type.as_str())?,
        json_string(group.signal_type.as_str())?,
        fixed(group.confidence),
        json_string(&group.root_cause)?,
        json_string(&group.recommendation)?
    );
    out.push_str(",\"members\":[");
    for (index, member) in group.members.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "{{\"test_name\":{},\"similarity\":{}}}",
            json_string(&member.test_name)?,
            fixed(member.similarity)
        );
    }
    out.push_str("]}");
    Ok(())
}

fn render_text(
    results: &[AnalysisResult],
    summary: &Summary,
    groups: &[CorrelationGroup],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Execution analysis: {} test(s)", summary.total);
    let _ = writeln!(out, "{}", "=".repeat(60));

    for result in results {
        let _ = writeln!(out, "\n{} [{}] {}", result.status.as_str(), result.framework, result.test_name);
        if let Some(classification) = &result.failure_classification {
            let _ = writeln!(
                out,
                "  {} (confidence {:.2})",
                classification.failure_type, classification.confidence
            );
            let _ = writeln!(out, "  reason: {}", classification.reason);
            for item in classification.evidence.iter().take(6) {
                let _ = writeln!(out, "  - {item}");
            }
            if let Some(reference) = &classification.code_reference {
                let _ = writeln!(out, "  at {}:{}", reference.file, reference.line);
                if let Some(snippet) = &reference.snippet {
                    for line in snippet.lines() {
                        let _ = writeln!(out, "    | {line}");
                    }
                }
            }
            if let Some(insights) = &classification.ai_insights {
                let _ = writeln!(out, "  ai: {}", insights.summary);
            }
        }
    }

    if !groups.is_empty() {
        let _ = writeln!(out, "\nCorrelated groups");
        let _ = writeln!(out, "{}", "-".repeat(60));
        for group in groups {
            let _ = writeln!(
                out,
                "{} affecting {} tests [{} / {}]",
                group.group_id, group.affected_tests, group.failure_type, group.signal_type
            );
            let _ = writeln!(out, "  root cause: {}", group.root_cause);
            let _ = writeln!(out, "  recommendation: {}", group.recommendation);
        }
    }

    out.push('\n');
    out.push_str(&render_summary(summary));
    out
}

fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "total: {}", summary.total);
    for (failure_type, count) in &summary.by_type {
        let _ = writeln!(out, "  {failure_type}: {count}");
    }
    let _ = writeln!(out, "confidence:");
    for (bucket, count) in &summary.by_confidence_bucket {
        let _ = writeln!(out, "  {bucket}: {count}");
    }
    if !summary.top_patterns.is_empty() {
        let _ = writeln!(out, "top patterns:");
        for pattern in &summary.top_patterns {
            let _ = writeln!(
                out,
                "  {} x{} {}",
                pattern.pattern_hash, pattern.affected_tests, pattern.normalized_message
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CodeReference, FailureClassification, FailureType, TestStatus,
    };
    use std::collections::BTreeMap;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            test_name: "test_login".to_string(),
            framework: "selenium".to_string(),
            status: TestStatus::Fail,
            failure_classification: Some(FailureClassification {
                failure_type: FailureType::AutomationDefect,
                confidence: 0.92,
                reason: "Element locator no longer matches the page under test".to_string(),
                evidence: vec!["selector=#login".to_string()],
                signals: vec![],
                rules_applied: vec!["generic.locator_failure".to_string()],
                code_reference: Some(CodeReference {
                    file: "tests/test_login.py".to_string(),
                    line: 42,
                    function: Some("test_login".to_string()),
                    class_name: None,
                    snippet: None,
                    language_hint: Some("python".to_string()),
                }),
                ai_insights: None,
            }),
            events: vec![],
            signals: vec![],
            code_reference: None,
            duration_ms: Some(1200),
            timestamp: "2024-01-15T10:00:00+00:00".to_string(),
            has_application_logs: false,
            metadata: Default::default(),
        }
    }

    fn sample_summary() -> Summary {
        let mut by_type = BTreeMap::new();
        by_type.insert("AUTOMATION_DEFECT".to_string(), 1);
        let mut by_bucket = BTreeMap::new();
        by_bucket.insert("HIGH".to_string(), 1);
        Summary {
            total: 1,
            by_type,
            by_confidence_bucket: by_bucket,
            top_patterns: vec![],
        }
    }

    #[test]
    fn test_json_is_bit_stable_across_calls() {
        let results = vec![sample_result()];
        let summary = sample_summary();
        let a = render(OutputFormat::Json, &results, &summary, &[]).unwrap();
        let b = render(OutputFormat::Json, &results, &summary, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_field_order_and_fixed_precision() {
        let results = vec![sample_result()];
        let json = render(OutputFormat::Json, &results, &sample_summary(), &[]).unwrap();

        assert!(json.starts_with("{\"version\":\"1\",\"summary\":"));
        assert!(json.contains("\"confidence\":0.9200"));
        let type_pos = json.find("\"failure_type\"").unwrap();
        let conf_pos = json.find("\"confidence\"").unwrap();
        let reason_pos = json.find("\"reason\"").unwrap();
        assert!(type_pos < conf_pos && conf_pos < reason_pos);
        // parses as real JSON
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "1");
        assert_eq!(
            value["results"][0]["classification"]["code_reference"]["line"],
            42
        );
    }

    #[test]
    fn test_unicode_passes_through_intact() {
        let mut result = sample_result();
        if let Some(c) = result.failure_classification.as_mut() {
            c.reason = "erwartet 'grün' ✗ – 失敗".to_string();
        }
        let json = render(OutputFormat::Json, &[result], &sample_summary(), &[]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value["results"][0]["classification"]["reason"],
            "erwartet 'grün' ✗ – 失敗"
        );
    }

    #[test]
    fn test_text_format_mentions_classification() {
        let text = render(
            OutputFormat::Text,
            &[sample_result()],
            &sample_summary(),
            &[],
        )
        .unwrap();
        assert!(text.contains("AUTOMATION_DEFECT"));
        assert!(text.contains("test_login"));
        assert!(text.contains("tests/test_login.py:42"));
    }

    #[test]
    fn test_summary_format_is_compact() {
        let summary = render(OutputFormat::Summary, &[], &sample_summary(), &[]).unwrap();
        assert!(summary.contains("total: 1"));
        assert!(summary.contains("AUTOMATION_DEFECT: 1"));
    }
}
