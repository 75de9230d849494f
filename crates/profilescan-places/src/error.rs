use thiserror::Error;

/// Errors returned by the places lookup adapter.
#[derive(Debug, Error)]
pub enum PlacesError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// No query composition produced a match.
    #[error("{message}")]
    NotFound { message: String },

    /// The API key is missing or was rejected.
    #[error("places API configuration error: {0}")]
    Configuration(String),

    /// The provider's quota for this key is exhausted.
    #[error("places API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other non-OK `status` in the response envelope.
    #[error("places API returned {status}: {message}")]
    Api { status: String, message: String },
}

impl PlacesError {
    /// Returns `true` for failures that may succeed when the same request is
    /// repeated later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            PlacesError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            PlacesError::Api { status, .. } => status == "UNKNOWN_ERROR",
            PlacesError::Deserialize { .. }
            | PlacesError::NotFound { .. }
            | PlacesError::Configuration(_)
            | PlacesError::QuotaExceeded(_) => false,
        }
    }
}
