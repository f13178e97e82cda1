//! Error types for the x402 agent
//!
//! Failures come in two tiers. [`AttemptFailure`] describes why a single
//! attempt did not produce a result; the client retries those. [`AgentError`]
//! is what a caller of [`crate::PaymentClient::request_data`] finally sees.

use http::StatusCode;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Why one attempt failed. Every variant is transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The server answered the paid reissue with something other than 200
    #[error("Payment rejected: {status}")]
    PaymentRejected { status: StatusCode, body: String },

    /// The server answered with a status the protocol does not handle
    #[error("Unexpected status: {status}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// A 200 response whose body is not JSON
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl AttemptFailure {
    /// HTTP status behind this failure, if a response was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::PaymentRejected { status, .. } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            Self::Network(_) | Self::InvalidBody(_) => None,
        }
    }

    /// Create a network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}

/// Terminal error returned by the agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// A 402 response carried no usable payment requirement
    #[error("Payment requirement missing from 402 response")]
    PaymentRequirementMissing,

    /// Payment is required but no signing credential is configured
    #[error("No signer available: configure a wallet credential or enable test mode")]
    SignerUnavailable,

    /// The caller cancelled the request between attempts
    #[error("Request cancelled")]
    Cancelled,

    /// Every attempt in the retry budget failed
    #[error("All {attempts} attempts failed: {last}")]
    RetriesExhausted { attempts: u32, last: AttemptFailure },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Signing failed with a configured credential
    #[error("Signing error: {message}")]
    Signing { message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a signing error
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// True for defects that retrying cannot fix
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::PaymentRequirementMissing | Self::SignerUnavailable | Self::Config { .. }
        )
    }

    /// The failure of the last attempt, when the retry budget ran out
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}
