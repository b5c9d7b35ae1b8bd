//! Named events pushed on an analysis stream.
//!
//! The service emits four event names: `status`, `partial_finding`, `final`
//! and `error`. Each is decoded into one [`StreamEvent`] variant so the whole
//! channel can be folded through [`AnalysisJob::apply`](crate::AnalysisJob::apply).

use serde::Deserialize;
use tracing::debug;

use crate::{AnalysisResult, CoreError, Finding};

pub const STATUS_EVENT: &str = "status";
pub const PARTIAL_FINDING_EVENT: &str = "partial_finding";
pub const FINAL_EVENT: &str = "final";
pub const ERROR_EVENT: &str = "error";

/// Progress report carried by a `status` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Human-readable text: the message if present, otherwise the status code.
    pub fn display(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.status.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Status(StatusUpdate),
    PartialFinding(Finding),
    Final(AnalysisResult),
    /// The channel failed or the service reported an error. Carries a reason
    /// for logging only.
    TransportError(String),
}

#[derive(Deserialize)]
struct PartialFindingPayload {
    finding: Finding,
}

#[derive(Deserialize)]
struct FinalPayload {
    result: AnalysisResult,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
}

impl StreamEvent {
    /// Decode one named event and its JSON data.
    ///
    /// Returns `Ok(None)` for event names outside the protocol. A `final` or
    /// `error` event with an unreadable body still decodes as a transport
    /// error, so both names are always terminal.
    pub fn decode(event: &str, data: &str) -> Result<Option<Self>, CoreError> {
        let payload_err = |source| CoreError::Payload {
            event: event.to_string(),
            source,
        };
        let decoded = match event {
            STATUS_EVENT => Self::Status(serde_json::from_str(data).map_err(payload_err)?),
            PARTIAL_FINDING_EVENT => {
                let payload: PartialFindingPayload =
                    serde_json::from_str(data).map_err(payload_err)?;
                Self::PartialFinding(payload.finding)
            }
            // A `final` frame ends the stream whether or not its body is usable.
            FINAL_EVENT => match serde_json::from_str::<FinalPayload>(data) {
                Ok(payload) => Self::Final(payload.result),
                Err(e) => Self::TransportError(format!("malformed `final` payload: {e}")),
            },
            ERROR_EVENT => {
                let reason = serde_json::from_str::<ErrorPayload>(data)
                    .ok()
                    .and_then(|p| p.error)
                    .unwrap_or_else(|| "analysis stream reported an error".to_string());
                Self::TransportError(reason)
            }
            other => {
                debug!(event = other, "ignoring unknown stream event");
                return Ok(None);
            }
        };
        Ok(Some(decoded))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::TransportError(_))
    }
}
