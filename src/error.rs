//! Error types for minidicom
//!
//! This module defines the error hierarchy for the indexer:
//! - Codec errors (value and header conversion)
//! - SQLite database errors
//! - Folder scan and reconciliation errors
//! - Selection/query contract violations
//! - Volume assembly errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the indexer
#[derive(Error, Debug)]
pub enum IndexError {
    /// Value or header conversion errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Folder scan errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Selection contract violations
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// Volume assembly errors
    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Element value and header conversion errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Tag name cannot be resolved against the dictionary or parsed
    /// as a synthesized private-tag name
    #[error("Unknown tag name '{0}'")]
    UnknownTagName(String),

    /// Element value could not be converted to a storable form
    #[error("Cannot convert value for {tag} (VR {vr}): {reason}")]
    Convert {
        tag: String,
        vr: &'static str,
        reason: String,
    },

    /// Stored value does not match the shape expected for its column
    #[error("Stored value for column '{column}' is invalid: {reason}")]
    Stored { column: String, reason: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hex decoding error for binary values
    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Number of bound values does not match the column count
    #[error("Column count mismatch: {expected} columns, {actual} values")]
    ColumnCount { expected: usize, actual: usize },

    /// Commit requested without a matching begin
    #[error("Commit requested outside of a transaction")]
    NoTransaction,

    /// Schema error
    #[error("Database schema error: {0}")]
    Schema(String),
}

/// Folder scan and reconciliation errors
#[derive(Error, Debug)]
pub enum ScanError {
    /// Source folder missing or not a directory
    #[error("Not a directory: '{0}'")]
    NotADirectory(PathBuf),

    /// Database error during ingestion; aborts the scan
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Header encoding failure that cannot be skipped
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error while walking the folder tree
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize {
        size: usize,
        min: usize,
        max: usize,
    },

    /// Source folder does not exist
    #[error("Folder not found: '{0}'")]
    FolderNotFound(PathBuf),
}

/// Selection/query contract violations; caller errors, not recoverable
/// internally
#[derive(Error, Debug)]
pub enum SelectionError {
    /// Requested tag is not present in the current selection
    #[error("Tag '{0}' is not present in the current selection")]
    TagNotPresent(String),

    /// An operation that requires a single series found several
    #[error("Selection spans {count} series; narrow it to exactly one")]
    MultipleSeries { count: usize },

    /// A single value was requested where several distinct values exist
    #[error("Tag '{name}' has {count} distinct values, expected one")]
    NotSingular { name: String, count: usize },

    /// Database error while evaluating the selection
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Codec error while encoding a filter value or decoding a column
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Volume assembly errors
#[derive(Error, Debug)]
pub enum VolumeError {
    /// A tag required for scale-factor computation is absent
    #[error("Missing prerequisite tag '{0}' for scale factor")]
    MissingPrerequisite(String),

    /// The external assembler failed
    #[error("Volume assembly failed: {0}")]
    Assembly(String),
}

/// Result type alias for IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Result type alias for CodecError
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Result type alias for ScanError
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Result type alias for SelectionError
pub type SelectionResult<T> = std::result::Result<T, SelectionError>;

/// Result type alias for VolumeError
pub type VolumeResult<T> = std::result::Result<T, VolumeError>;
