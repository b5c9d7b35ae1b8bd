use clauselens_client::ClientError;
use clauselens_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Rejected before any request was sent.
    #[error("invalid request: {0}")]
    Validation(#[from] CoreError),

    #[error("analysis service request failed: {0}")]
    Request(#[from] ClientError),

    /// The new version exists on the service but the list could not be
    /// refreshed afterwards.
    #[error("playbook version {version_id} was saved but reloading versions failed: {source}")]
    Reload {
        version_id: String,
        #[source]
        source: ClientError,
    },
}
