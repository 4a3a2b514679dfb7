//! Error types shared by the locorig crates

use thiserror::Error;

/// Core validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Text is not a dotted-quad IPv4 address
    #[error("Invalid IPv4 address: {0:?}")]
    InvalidAddress(String),

    /// Text is not a 10-digit peer id
    #[error("Invalid peer id: {0:?}")]
    InvalidPeerId(String),

    /// The same id appears more than once in a target list
    #[error("Duplicate peer id: {0}")]
    DuplicatePeer(String),

    /// The id resolves to one of this machine's own addresses
    #[error("Peer id {0} refers to this device")]
    SelfAddress(String),

    /// Unknown role name
    #[error("Unknown role: {0:?}")]
    UnknownRole(String),

    /// Instruction has the wrong number of values
    #[error("Instruction {key:?} expects {expected} values, got {got}")]
    InstructionArity {
        /// Instruction key
        key: String,
        /// Number of values expected
        expected: usize,
        /// Number of values received
        got: usize,
    },

    /// Instruction text could not be parsed
    #[error("Malformed instruction: {0:?}")]
    MalformedInstruction(String),
}

impl CoreError {
    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidAddress(_) => "INVALID_ADDRESS",
            CoreError::InvalidPeerId(_) => "INVALID_PEER_ID",
            CoreError::DuplicatePeer(_) => "DUPLICATE_PEER",
            CoreError::SelfAddress(_) => "SELF_ADDRESS",
            CoreError::UnknownRole(_) => "UNKNOWN_ROLE",
            CoreError::InstructionArity { .. } => "INSTRUCTION_ARITY",
            CoreError::MalformedInstruction(_) => "MALFORMED_INSTRUCTION",
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
