//! Error types shared across Veil core.
//!
//! Cryptographic failures live in [`veil_crypto::session_protocol::SessionProtocolError`]
//! and are surfaced to the immediate caller; the types here cover storage and
//! the network collaborators.

use thiserror::Error;

/// Errors raised by persistent-storage collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),
}

/// Errors raised by the swarm and anonymizing-path collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request never produced a response
    #[error("transport failed: {0}")]
    Transport(String),

    /// The destination answered with a non-success HTTP status
    #[error("http status {0}")]
    HttpStatus(u16),

    /// The response could not be interpreted
    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("request timed out")]
    Timeout,
}
