//! Error types for extract-archive
//!
//! This module provides the error taxonomy for the extraction pipeline:
//! - [`Error`] is the crate-wide error returned by the queue, store and manager APIs
//! - [`ExtractError`] describes why a single extraction target failed
//! - [`DatabaseError`] wraps failures of the SQLite key-value store
//!
//! Target failures are contained at the target boundary by the manager; they are
//! reported through events and logs, never propagated to sibling targets.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for extract-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for extract-archive
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A single extraction target failed
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (unrar, tar, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, backend without repair, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Reasons a single archive target could not be extracted
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive is encrypted and the supplied password was rejected
    #[error("wrong password for encrypted archive {archive}")]
    WrongPassword {
        /// The encrypted archive
        archive: PathBuf,
    },

    /// The archive is encrypted and no candidate password opened it
    #[error("no password found for encrypted archive {archive}")]
    NoPasswordFound {
        /// The encrypted archive
        archive: PathBuf,
    },

    /// Checksum mismatch, the archive data is damaged
    #[error("CRC mismatch in {archive}: {reason}")]
    Crc {
        /// The damaged archive
        archive: PathBuf,
        /// Tool or library message describing the damage
        reason: String,
    },

    /// Any other structural problem (truncated headers, unsupported method, I/O)
    #[error("archive error in {archive}: {reason}")]
    Archive {
        /// The archive that failed
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// The backend's external tool is missing
    #[error("{tool} is not installed")]
    ToolUnavailable {
        /// Name of the missing binary
        tool: String,
    },
}

impl ExtractError {
    /// Short label used in log lines ("Wrong password", "CRC mismatch", ...)
    pub fn label(&self) -> &'static str {
        match self {
            ExtractError::WrongPassword { .. } => "Wrong password",
            ExtractError::NoPasswordFound { .. } => "No password found",
            ExtractError::Crc { .. } => "CRC mismatch",
            ExtractError::Archive { .. } => "Archive error",
            ExtractError::ToolUnavailable { .. } => "Tool unavailable",
        }
    }
}
