//! Network-specific error types

use locorig_core::CoreError;
use thiserror::Error;

/// Network hub errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The receive socket could not be bound
    #[error("Failed to bind UDP port {port}: {reason}")]
    BindFailed {
        /// Port that was requested
        port: u16,
        /// Failure reason
        reason: String,
    },

    /// A sender socket could not be created
    #[error("Failed to open sender to {destination}: {reason}")]
    SenderFailed {
        /// Destination address
        destination: String,
        /// Failure reason
        reason: String,
    },

    /// No usable recipient for a send
    #[error("No recipient available for {0}")]
    NoRecipient(String),

    /// Invalid id or target list
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Hub already shut down
    #[error("Network hub is shut down")]
    ShutDown,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    /// Whether the error rejected caller input, leaving state unchanged
    pub fn is_validation(&self) -> bool {
        matches!(self, NetworkError::Validation(_))
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            NetworkError::BindFailed { .. } => "BIND_FAILED",
            NetworkError::SenderFailed { .. } => "SENDER_FAILED",
            NetworkError::NoRecipient(_) => "NO_RECIPIENT",
            NetworkError::Validation(inner) => inner.error_code(),
            NetworkError::ShutDown => "SHUT_DOWN",
            NetworkError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
