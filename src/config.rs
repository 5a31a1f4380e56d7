//! Configuration for the index
//!
//! Runtime configuration with validation. The indexer has no CLI surface;
//! embedding applications construct an [`IndexConfig`] directly.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Default database file name, created inside the indexed folder
pub const DATABASE_FILE: &str = "minidicom.db";

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 100_000;

/// Number of files ingested between commits by default
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Configuration for opening a [`DicomIndex`](crate::index::DicomIndex)
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Folder tree to index
    pub folder: PathBuf,

    /// Database file location; defaults to `minidicom.db` inside the folder
    pub database_path: Option<PathBuf>,

    /// Keep the database in memory only (useful for tests and one-shot
    /// queries; nothing is persisted)
    pub in_memory: bool,

    /// Number of files ingested between commits. A mid-scan interruption
    /// loses at most one batch of progress.
    pub batch_size: usize,

    /// Index private tags under synthesized column names
    pub include_private_tags: bool,

    /// Suppress progress output
    pub silent: bool,
}

impl IndexConfig {
    /// Create a configuration with defaults for the given folder
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            database_path: None,
            in_memory: false,
            batch_size: DEFAULT_BATCH_SIZE,
            include_private_tags: false,
            silent: false,
        }
    }

    /// Keep the database in memory only
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Override the database file location
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Override the ingestion batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Index private tags as well
    pub fn include_private_tags(mut self, include: bool) -> Self {
        self.include_private_tags = include;
        self
    }

    /// Suppress progress output
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Resolved database file path
    pub fn resolved_database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => self.folder.join(DATABASE_FILE),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size < MIN_BATCH_SIZE || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: self.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        if !self.folder.is_dir() {
            return Err(ConfigError::FolderNotFound(self.folder.clone()));
        }

        Ok(())
    }

    /// Absolute path of the indexed folder
    pub fn absolute_folder(&self) -> std::io::Result<PathBuf> {
        self.folder.canonicalize()
    }
}
