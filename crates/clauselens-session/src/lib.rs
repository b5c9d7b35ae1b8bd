//! Client-side session state: one streamed analysis at a time, and the active
//! playbook version that new analyses are submitted against.

mod controller;
mod error;
mod resolver;
mod service;

pub use controller::{AnalysisObserver, NoopObserver, StreamingAnalysisController};
pub use error::SessionError;
pub use resolver::{ACTIVE_VERSION_KEY, VersionResolver};
pub use service::{AnalysisService, PlaybookService};
