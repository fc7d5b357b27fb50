//! Error taxonomy for intake, verification, matching and storage.
//!
//! Business rejections ([`Rejection`]) are reduced to a `false` response plus a rejection log
//! entry. Infrastructure failures ([`RepositoryError`], [`IntakeError`]) propagate to the HTTP
//! boundary so clients can tell an invalid order from a failing system.

use crate::types::OrderId;
use thiserror::Error;

/// Why a submission was turned away before it reached the book.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("malformed request: {0}")]
    Shape(String),

    #[error("invalid order: {0}")]
    Invariant(String),

    #[error("signature rejected: {0}")]
    Signature(String),
}

impl Rejection {
    /// Short label used in log lines and rejection records.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Shape(_) => "shape",
            Rejection::Invariant(_) => "invariant",
            Rejection::Signature(_) => "signature",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("payload could not be canonicalized: {0}")]
    Canonicalization(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<VerificationError> for Rejection {
    fn from(e: VerificationError) -> Self {
        Rejection::Signature(e.to_string())
    }
}

/// Order store failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// Worth retrying: the store was momentarily unable to serve the call.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("order store unavailable: {0}")]
    Unavailable(String),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order store corrupt: {0}")]
    Corrupt(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

/// Snapshot file failures.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PersistenceError> for RepositoryError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Io(io) => RepositoryError::Unavailable(io.to_string()),
            PersistenceError::Serialization(se) => RepositoryError::Corrupt(se.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Another transaction filled this order first. The whole match was rolled back.
    #[error("order {0} was filled concurrently")]
    Conflict(OrderId),

    #[error("arithmetic overflow: {0}")]
    Arithmetic(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Hard failures surfaced by [`crate::intake::OrderIntake::admit`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntakeError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("matching failure: {0}")]
    Matching(String),
}

impl From<EngineError> for IntakeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Repository(re) => IntakeError::Persistence(re),
            other => IntakeError::Matching(other.to_string()),
        }
    }
}
