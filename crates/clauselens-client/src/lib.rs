//! Client for the analysis service: JSON request/response calls and the
//! server-sent-event analysis stream.

pub mod http;
pub mod sse;

pub use http::{AnalysisLookup, ApiClient, ClientError, EventStream};
