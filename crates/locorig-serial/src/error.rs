//! Error types for serial link and bridge operations

use thiserror::Error;

/// Serial link and bridge errors
#[derive(Error, Debug)]
pub enum SerialError {
    // ===== Port Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port name
        port: String,
        /// Failure reason
        reason: String,
    },

    /// Port enumeration failed
    #[error("Failed to list serial ports: {0}")]
    EnumerationFailed(String),

    /// Serial read error
    #[error("Serial read error: {0}")]
    ReadError(String),

    /// Serial write error
    #[error("Serial write error: {0}")]
    WriteError(String),

    /// Serial port disconnected
    #[error("Serial port disconnected")]
    Disconnected,

    /// No byte arrived before the watchdog fired
    #[error("No data within {duration_ms}ms of opening")]
    HandshakeTimeout {
        /// Watchdog duration in milliseconds
        duration_ms: u64,
    },

    // ===== Command Errors =====
    /// Pin outside the addressable range
    #[error("Invalid pin {pin}: pins are 0-{max}")]
    InvalidPin {
        /// Requested pin
        pin: u32,
        /// Highest valid pin
        max: u8,
    },

    /// Value does not fit its bit field
    #[error("Value {value} does not fit in {width} bits")]
    FieldOverflow {
        /// Offending value
        value: u64,
        /// Declared field width
        width: u8,
    },

    /// Field width outside 1..=64
    #[error("Invalid field width: {0}")]
    InvalidWidth(u8),

    // ===== Bridge Errors =====
    /// Bridge has been disposed
    #[error("Device bridge is disposed")]
    Disposed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Check if this error is transient and the port may be tried again
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SerialError::HandshakeTimeout { .. }
                | SerialError::Disconnected
                | SerialError::ReadError(_)
                | SerialError::WriteError(_)
                | SerialError::EnumerationFailed(_)
        )
    }

    /// Check if this error rejected caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SerialError::InvalidPin { .. }
                | SerialError::FieldOverflow { .. }
                | SerialError::InvalidWidth(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            SerialError::PortNotFound(_) => "PORT_NOT_FOUND",
            SerialError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            SerialError::EnumerationFailed(_) => "ENUMERATION_FAILED",
            SerialError::ReadError(_) => "READ_ERROR",
            SerialError::WriteError(_) => "WRITE_ERROR",
            SerialError::Disconnected => "DISCONNECTED",
            SerialError::HandshakeTimeout { .. } => "HANDSHAKE_TIMEOUT",
            SerialError::InvalidPin { .. } => "INVALID_PIN",
            SerialError::FieldOverflow { .. } => "FIELD_OVERFLOW",
            SerialError::InvalidWidth(_) => "INVALID_WIDTH",
            SerialError::Disposed => "DISPOSED",
            SerialError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for serial operations
pub type Result<T> = std::result::Result<T, SerialError>;

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for SerialError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => SerialError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                SerialError::Io(std::io::Error::new(kind, err.description))
            }
            _ => SerialError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}
