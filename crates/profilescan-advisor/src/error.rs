use profilescan_core::PayloadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("advisor is not configured: {0}")]
    NotConfigured(String),

    #[error("advisor returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("advisor reply had no message content")]
    EmptyReply,

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("advisor reply is not a usable payload: {0}")]
    Payload(#[from] PayloadError),
}
