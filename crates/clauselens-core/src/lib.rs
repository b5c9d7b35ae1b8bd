pub mod analysis;
pub mod error;
pub mod event;
pub mod finding;
pub mod playbook;
pub mod recommendation;

pub use analysis::{AnalysisJob, AnalysisKind, AnalysisRequest, AnalysisStatus, Transition};
pub use error::CoreError;
pub use event::{StatusUpdate, StreamEvent};
pub use finding::{AnalysisResult, Finding, GuardrailWarning, RetrievedChunk, RiskLevel, Usage};
pub use playbook::{PlaybookVersion, resolve_active};
pub use recommendation::Recommendation;
