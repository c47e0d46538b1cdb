//! Error types for the SolsTiS client
//!
//! Every failure a caller can see is one variant of [`SolstisError`], so
//! recovery can be decided by matching on the kind (re-home and retry vs.
//! abort). Nothing is retried or swallowed inside the crate.

use thiserror::Error;

use crate::network::SessionState;
use crate::protocol::{Operation, StatusCode};

/// Result type alias using SolstisError
pub type Result<T> = std::result::Result<T, SolstisError>;

/// Unified error type for SolsTiS operations
#[derive(Debug, Error)]
pub enum SolstisError {
    // -------------------------------------------------------------------------
    // Connection / Transport Errors
    // -------------------------------------------------------------------------
    /// The TCP connection could not be established (refused, timed out,
    /// unreachable). The session stays `Unconnected`.
    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write failed on an open session. The session is `Closed`
    /// afterwards; framing cannot be recovered.
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The session is not in a state that allows the requested action.
    #[error("Cannot {action}: session is {state}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Received bytes do not parse as a reply frame.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// The reply answers a different operation than the one sent.
    #[error("Reply operation mismatch: expected '{expected}', got '{actual}'")]
    OperationMismatch { expected: String, actual: String },

    /// The reply carries a different transmission id than the one sent.
    #[error("Reply transmission id mismatch: expected {expected}, got {actual}")]
    TransmissionMismatch { expected: u32, actual: u32 },

    /// The instrument could not parse the command it was sent.
    #[error("Instrument failed to parse message with transmission id {transmission_id}")]
    ParseFailed { transmission_id: u32 },

    /// An unsolicited report frame arrived on the command path.
    #[error("Unexpected report frame '{op}'")]
    UnexpectedReport { op: String },

    // -------------------------------------------------------------------------
    // Instrument Status Errors
    // -------------------------------------------------------------------------
    /// The reply parsed but reports a documented failure for this operation.
    #[error("{operation} failed with status {code}: {meaning}")]
    Instrument {
        operation: Operation,
        code: StatusCode,
        meaning: &'static str,
    },

    /// The reply carries a status the operation does not document.
    #[error("{operation} returned undocumented status {code}")]
    UnknownStatus {
        operation: Operation,
        code: StatusCode,
    },

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// A command argument was rejected before anything was sent.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be built from its source.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SolstisError {
    /// True for failures the instrument itself reported through a status code
    pub fn is_instrument_status(&self) -> bool {
        matches!(
            self,
            SolstisError::Instrument { .. } | SolstisError::UnknownStatus { .. }
        )
    }
}
