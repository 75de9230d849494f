use thiserror::Error;

/// Failures seen by the scan client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error envelope.
    #[error("{code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response whose body could not be read.
    #[error("unexpected response from {context}: {reason}")]
    Decode {
        context: &'static str,
        reason: String,
    },

    /// The server reported that no recommendations could be produced.
    #[error("recommendation generation failed")]
    GenerationFailed,

    /// The event stream closed before delivering a result.
    #[error("recommendation stream closed early")]
    StreamClosed,

    /// A newer submission superseded this one.
    #[error("scan attempt cancelled")]
    Cancelled,

    #[error("cannot {action} while {phase}")]
    InvalidState {
        action: &'static str,
        phase: &'static str,
    },
}

impl ClientError {
    /// Worth another attempt: connection failures, timeouts, gateway errors
    /// and internal server errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(e) => e.is_connect() || e.is_timeout(),
            ClientError::Api { status, .. } => matches!(status, 500 | 502),
            ClientError::Decode { .. }
            | ClientError::GenerationFailed
            | ClientError::StreamClosed
            | ClientError::Cancelled
            | ClientError::InvalidState { .. } => false,
        }
    }

    /// Text suitable for showing to the person running the scan.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Api { .. } | ClientError::Decode { .. } => {
                "Something went wrong on our side. Please try again.".to_owned()
            }
            ClientError::Network(_) => {
                "We couldn't reach the scan service. Check your connection and try again."
                    .to_owned()
            }
            other => other.to_string(),
        }
    }
}
