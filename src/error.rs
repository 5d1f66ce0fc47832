//! Error types for ctlwire
//!
//! Provides a unified error type for all operations.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Result type alias using CtlError
pub type Result<T> = std::result::Result<T, CtlError>;

/// Unified error type for ctlwire operations
#[derive(Debug, Error)]
pub enum CtlError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    // -------------------------------------------------------------------------
    // Stream Errors
    // -------------------------------------------------------------------------
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Reply with status {status} arrived with no outstanding command")]
    UnmatchedReply { status: u16 },

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Timed out after {0:?} waiting for reply")]
    Timeout(Duration),

    #[error("Result for command {0} was already taken")]
    ResultTaken(u64),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CtlError {
    /// Whether this error ends the connection.
    ///
    /// Framing, transport and unmatched-reply errors mean the FIFO can no
    /// longer be trusted; everything else is local to one caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CtlError::Io(_) | CtlError::Framing(_) | CtlError::UnmatchedReply { .. }
        )
    }

    /// The server-reported error, if this is one
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            CtlError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}
