use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("document text is empty")]
    EmptyDocument,

    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
