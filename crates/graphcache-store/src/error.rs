//! Store error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from persistent store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid record {path}: {message}")]
    InvalidRecord { path: PathBuf, message: String },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("persistence directory not configured")]
    NotConfigured,
}

/// Reasons a stored record is rejected as stale or foreign.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("schema version {found} (expected {expected})")]
    SchemaVersion { expected: u32, found: u32 },

    #[error("signature fingerprint mismatch: expected {expected}, found {found}")]
    SignatureMismatch { expected: String, found: String },

    #[error("IR fingerprint mismatch: expected {expected}, found {found}")]
    IrFingerprintMismatch { expected: String, found: String },

    #[error("device type mismatch: expected {expected}, found {found}")]
    DeviceMismatch { expected: String, found: String },

    #[error("stored IR differs from generated IR")]
    IrContentMismatch,

    #[error("stored IR is not valid base64")]
    IrUndecodable,
}
