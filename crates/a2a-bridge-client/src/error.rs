//! Error types for the A2A client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to an A2A agent.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request did not produce a usable HTTP response.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The body arrived but does not decode per the protocol schema.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The endpoint URL could not be used to build a client.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The agent answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The call did not finish within its deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Connection refused, DNS failure, reset, ...
    #[error("network error: {0}")]
    Network(String),

    /// The client was closed before the call was issued.
    #[error("client for {0} is closed")]
    Closed(String),
}

impl TransportError {
    /// HTTP-style status for display: the real status for non-2xx replies,
    /// 408 for deadlines and 500 for everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            Self::DeadlineExceeded(_) => 408,
            Self::Network(_) | Self::Closed(_) => 500,
        }
    }

    /// Returns true if the failure was a timeout.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::DeadlineExceeded(timeout)
        } else {
            Self::Network(error.to_string())
        }
    }
}
