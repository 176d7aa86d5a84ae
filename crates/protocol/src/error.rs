//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The exchanged data violates the protocol: a required field is
    /// missing, the version is unsupported, a field is malformed or a
    /// signature does not match.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A builder was handed arguments that break its contract. Raised
    /// before any cryptographic work happens.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid or malformed public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption operation failed.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl ProtocolError {
    /// Shorthand for a [`ProtocolError::Protocol`] with the given cause.
    pub(crate) fn protocol(cause: impl Into<String>) -> Self {
        ProtocolError::Protocol(cause.into())
    }

    /// Shorthand for a [`ProtocolError::InvalidArgument`] with the given cause.
    pub(crate) fn invalid_argument(cause: impl Into<String>) -> Self {
        ProtocolError::InvalidArgument(cause.into())
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::Protocol(format!("malformed base64: {err}"))
    }
}

impl From<std::string::FromUtf8Error> for ProtocolError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ProtocolError::Protocol(format!("malformed text: {err}"))
    }
}

impl From<ed25519_dalek::SignatureError> for ProtocolError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        ProtocolError::InvalidPublicKey(err.to_string())
    }
}
