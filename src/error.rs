//! Error types shared by the sorting pipeline.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors produced while classifying, moving, cataloging or watching files.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// The extension is not in any category table and the entry point rejects unknown types.
    #[error("Unknown file type: {filename}")]
    UnknownFileType { filename: String },

    /// A submitted filename cannot be used as a file name.
    #[error("Invalid filename '{filename}': {reason}")]
    InvalidFilename { filename: String, reason: String },

    /// The physical relocation did not complete. Nothing was recorded.
    #[error("Failed to move {} to {}: {source}", source_path.display(), destination.display())]
    MoveFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A category directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staging directory could not be enumerated.
    #[error("Failed to read staging directory {}: {source}", path.display())]
    StagingUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Uploaded bytes could not be written into the staging area.
    #[error("Failed to store upload '{filename}': {source}")]
    UploadFailed {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// The catalog store rejected a write.
    #[error("Catalog write failed: {0}")]
    CatalogWriteFailed(#[source] rusqlite::Error),

    /// The catalog store could not be opened or queried.
    #[error("Catalog read failed: {0}")]
    CatalogReadFailed(#[source] rusqlite::Error),

    /// The undo journal could not be updated.
    #[error("Failed to write undo journal {}: {reason}", path.display())]
    JournalWriteFailed { path: PathBuf, reason: String },

    /// The filesystem notification backend failed.
    #[error("Watch backend error: {0}")]
    WatchFailed(#[from] notify::Error),

    /// A watcher or worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawnFailed(#[source] std::io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for pipeline operations.
pub type SortResult<T> = Result<T, SortError>;
