//! Structured error types for the bridge
//!
//! Every failure the bridge reports to a client flows through
//! [`BridgeError`]; the `Display` text of a variant is what the client
//! sees in an `error` envelope.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No auth token could be discovered at startup. Fatal.
    #[error("no auth token configured: set OKXUS_AUTH_TOKEN or auth_token in the config file")]
    MissingToken,

    /// Configuration file present but unusable
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A bounded wait elapsed without a result
    #[error("response wait timed out after {}s", duration.as_secs())]
    Timeout { duration: Duration },

    /// The external read primitive could not produce a snapshot
    #[error("failed to read response: {message}")]
    ReadFailure { message: String },

    /// The peer went away mid-exchange
    #[error("connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl BridgeError {
    /// Check if the failure is transient enough to retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            Self::MissingToken
            | Self::InvalidConfig { .. }
            | Self::ReadFailure { .. }
            | Self::ConnectionClosed
            | Self::Json(_) => false,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BridgeError::Timeout {
            duration: Duration::from_secs(60)
        }
        .is_retryable());

        assert!(!BridgeError::MissingToken.is_retryable());
        assert!(!BridgeError::ReadFailure {
            message: "clipboard unavailable".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_description_names_the_deadline() {
        let err = BridgeError::Timeout {
            duration: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "response wait timed out after 60s");
    }
}
