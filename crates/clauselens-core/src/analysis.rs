//! Analysis submission and the client-side view of a running job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AnalysisResult, CoreError, Finding, GuardrailWarning, RiskLevel, StreamEvent, Usage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    #[default]
    Risks,
    Summary,
    Obligations,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Risks => "risks",
            Self::Summary => "summary",
            Self::Obligations => "obligations",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "risks" => Ok(Self::Risks),
            "summary" => Ok(Self::Summary),
            "obligations" => Ok(Self::Obligations),
            other => Err(format!(
                "unknown analysis kind `{other}` (expected risks, summary or obligations)"
            )),
        }
    }
}

/// Body of `POST /analyze`.
///
/// The playbook version is captured here, at submission time. Changing the
/// active version afterwards does not affect a job already submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    #[serde(rename = "contract_text")]
    pub document_text: String,
    #[serde(rename = "analysis_type")]
    pub kind: AnalysisKind,
    pub playbook_version_id: Option<String>,
}

impl AnalysisRequest {
    pub fn new(document_text: impl Into<String>, kind: AnalysisKind) -> Self {
        Self {
            document_text: document_text.into(),
            kind,
            playbook_version_id: None,
        }
    }

    pub fn with_playbook_version(mut self, version_id: Option<String>) -> Self {
        self.playbook_version_id = version_id;
        self
    }

    /// Reject a request that must never reach the service.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.document_text.trim().is_empty() {
            return Err(CoreError::EmptyDocument);
        }
        Ok(())
    }
}

/// Locally inferred job status. Only reflects what the stream has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What a single event did to the job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The job was already terminal; nothing changed.
    Ignored,
    StatusChanged { message: Option<String> },
    /// A finding was appended at this index.
    FindingAppended(usize),
    Completed,
    /// Observation ended without a result.
    Stopped,
}

/// Client-side accumulation of one analysis.
///
/// Mutated only through [`apply`](Self::apply). Once a terminal event has been
/// applied the job never changes again.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    id: String,
    status: AnalysisStatus,
    message: Option<String>,
    findings: Vec<Finding>,
    result: Option<AnalysisResult>,
    stop_reason: Option<String>,
}

impl AnalysisJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AnalysisStatus::Queued,
            message: None,
            findings: Vec::new(),
            result: None,
            stop_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    /// Latest human-readable status text.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Findings in arrival order, or the final set once completed.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn overall_risk_score(&self) -> Option<RiskLevel> {
        self.result.as_ref().map(|r| r.overall_risk_score)
    }

    pub fn guardrail_warnings(&self) -> Option<&[GuardrailWarning]> {
        self.result.as_ref().map(|r| r.guardrail_warnings.as_slice())
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.result.as_ref().and_then(|r| r.usage.as_ref())
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold one stream event into the job.
    pub fn apply(&mut self, event: StreamEvent) -> Transition {
        if self.is_terminal() {
            debug!(analysis_id = %self.id, "event after terminal state ignored");
            return Transition::Ignored;
        }
        match event {
            StreamEvent::Status(update) => {
                // Status events never complete or fail a job.
                self.status = match update.status.as_deref() {
                    Some("queued") => AnalysisStatus::Queued,
                    _ => AnalysisStatus::Running,
                };
                if let Some(text) = update.display() {
                    self.message = Some(text.to_string());
                }
                Transition::StatusChanged {
                    message: update.display().map(str::to_string),
                }
            }
            StreamEvent::PartialFinding(finding) => {
                self.findings.push(finding);
                Transition::FindingAppended(self.findings.len() - 1)
            }
            StreamEvent::Final(result) => {
                self.findings = result.findings.clone();
                self.result = Some(result);
                self.status = AnalysisStatus::Completed;
                Transition::Completed
            }
            StreamEvent::TransportError(reason) => {
                self.stop_reason = Some(reason);
                self.status = AnalysisStatus::Failed;
                Transition::Stopped
            }
        }
    }
}
