//! Analysis result types as reported by the analysis service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Risk grading used for individual findings and the overall score.
///
/// Any value the service adds later decodes as [`RiskLevel::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Acceptable,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Acceptable => "acceptable",
            Self::Unknown => "unknown",
        }
    }
}

/// A playbook excerpt the service retrieved as evidence for a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_version_id: Option<String>,
}

/// One clause-level finding.
///
/// The shape is owned by the service. Fields this client does not know about
/// are kept in `extra` so the record passes through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub clause_type: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(default)]
    pub retrieved_chunks: Vec<RetrievedChunk>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
}

/// Token accounting for a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// The authoritative outcome delivered once, with the `final` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    /// ISO 8601 timestamp string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub overall_risk_score: RiskLevel,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub guardrail_warnings: Vec<GuardrailWarning>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_keeps_unknown_fields() {
        let json = r#"{
            "clause_type": "Limitation of Liability",
            "risk_level": "high",
            "extracted_value": "Liability capped at fees paid",
            "recommendation": "Action: negotiate a higher cap. Cite chunks: c-1.",
            "severity_rank": 2
        }"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(finding.risk_level, RiskLevel::High);
        assert!(finding.retrieved_chunks.is_empty());
        assert_eq!(finding.extra.get("severity_rank"), Some(&Value::from(2)));

        let back = serde_json::to_value(&finding).unwrap();
        assert_eq!(back["severity_rank"], 2);
        assert!(back.get("deviation").is_none());
    }

    #[test]
    fn unrecognised_risk_level_is_unknown() {
        let level: RiskLevel = serde_json::from_str(r#""catastrophic""#).unwrap();
        assert_eq!(level, RiskLevel::Unknown);
        assert_eq!(level.as_str(), "unknown");
    }

    #[test]
    fn guardrail_warning_uses_type_field() {
        let json = r#"{"type": "content_filter", "message": "sanitized input", "triggered_by": "system prompt"}"#;
        let warning: GuardrailWarning = serde_json::from_str(json).unwrap();
        assert_eq!(warning.kind, "content_filter");
        assert_eq!(warning.triggered_by.as_deref(), Some("system prompt"));
    }

    #[test]
    fn analysis_result_defaults_optional_sections() {
        let json = r#"{
            "analysis_id": "a-1",
            "timestamp": "2026-02-21T10:00:00",
            "overall_risk_score": "medium",
            "findings": [],
            "confidence_score": 0.7
        }"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.overall_risk_score, RiskLevel::Medium);
        assert!(result.guardrail_warnings.is_empty());
        assert!(result.usage.is_none());
        assert!(result.playbook_version_id.is_none());
    }
}
