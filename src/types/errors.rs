//! Runtime error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. The first
//! five variants are the protocol taxonomy seen by extension logic; the rest
//! cover configuration, wire decoding and I/O.

use thiserror::Error;

/// Runtime result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the extension runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport to the host is gone. Fatal to pending intents, not to the process.
    #[error("channel closed")]
    ChannelClosed,

    /// The host declined the intent (e.g. the user cancelled a dialog).
    #[error("intent rejected: {0}")]
    IntentRejected(String),

    /// A caller-supplied deadline elapsed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A shared resource constructor failed. Every waiter sees the same failure.
    #[error("resource '{key}' construction failed: {reason}")]
    ResourceConstructionFailed { key: String, reason: String },

    /// A callable submitted to the offload pool failed or panicked.
    #[error("offload failure: {0}")]
    OffloadFailure(String),

    /// Invalid input (bad payload field, bad configuration).
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed or unexpected wire message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable code sent to the host in failed event results and error frames.
    pub fn to_wire_code(&self) -> &'static str {
        match self {
            Error::ChannelClosed => "CHANNEL_CLOSED",
            Error::IntentRejected(_) => "INTENT_REJECTED",
            Error::Timeout(_) => "TIMEOUT",
            Error::ResourceConstructionFailed { .. } => "RESOURCE_CONSTRUCTION_FAILED",
            Error::OffloadFailure(_) => "OFFLOAD_FAILURE",
            Error::Validation(_) | Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::Protocol(_) => "PROTOCOL_ERROR",
            Error::Internal(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// Whether extension logic can keep going after this error.
    ///
    /// Only a lost channel is unrecoverable; the runtime shuts down after it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::ChannelClosed)
    }
}

// Convenience constructors
impl Error {
    pub fn intent_rejected(reason: impl Into<String>) -> Self {
        Self::IntentRejected(reason.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn construction_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceConstructionFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn offload_failure(msg: impl Into<String>) -> Self {
        Self::OffloadFailure(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
