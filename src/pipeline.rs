//! The assembled sorting pipeline and its entry points.

use crate::catalog::{Catalog, FileRecord};
use crate::config::{CompiledFilters, SorterConfig, UnknownPolicy};
use crate::error::{SortError, SortResult};
use crate::file_category::{Category, CategoryRules, is_hidden};
use crate::file_organizer::{FileOrganizer, MoveOutcome, StagingEntry};
use crate::reconcile::Reconciler;
use crate::undo::UndoJournal;
use crate::watcher::{DirectoryWatcher, SignalSource};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of the temporary files submissions are written to. The leading
/// dot keeps them out of watcher passes.
const UPLOAD_PREFIX: &str = ".upload-";

/// Where a submitted file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub category: Category,
    pub destination_path: PathBuf,
}

/// Owns the category rules, catalog, undo journal and policies, and hands
/// shared references to the watcher and its workers.
#[derive(Debug)]
pub struct Pipeline {
    config: SorterConfig,
    staging_dir: PathBuf,
    organizer: Arc<FileOrganizer>,
    filters: Arc<CompiledFilters>,
    catalog: Catalog,
    reconciler: Reconciler,
}

impl Pipeline {
    /// Builds a pipeline from `config`, creating the staging directory and
    /// the catalog if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the staging
    /// directory cannot be created, or the catalog cannot be opened.
    pub fn new(config: &SorterConfig) -> SortResult<Self> {
        config.validate()?;

        let staging_dir = prepare_staging_dir(&config.paths.staging_dir)?;
        let catalog = Catalog::open(&config.paths.catalog_db)?;
        let journal = Arc::new(UndoJournal::new(&config.paths.undo_journal));
        let rules = Arc::new(CategoryRules::with_extra(&config.categories));
        let filters = Arc::new(config.compile_filters()?);

        let organizer = Arc::new(FileOrganizer::new(
            rules,
            staging_dir.clone(),
            catalog.clone(),
            journal,
            config.workers.max_claim_attempts,
        ));
        let reconciler = Reconciler::new(&staging_dir, catalog.clone());

        info!(
            staging = %staging_dir.display(),
            catalog = %catalog.path().display(),
            "pipeline ready"
        );

        Ok(Self {
            config: config.clone(),
            staging_dir,
            organizer,
            filters,
            catalog,
            reconciler,
        })
    }

    /// Absolute path of the staging directory.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    pub fn organizer(&self) -> &Arc<FileOrganizer> {
        &self.organizer
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Backfills catalog rows for files already in category directories.
    /// Returns the number of rows inserted.
    pub fn trigger_reconcile(&self) -> SortResult<usize> {
        self.reconciler.scan_existing()
    }

    /// Files `bytes` under `filename` and returns where they went.
    ///
    /// The name is checked and classified before anything is written, so a
    /// rejected submission leaves no trace.
    ///
    /// # Errors
    ///
    /// * `InvalidFilename` for empty, hidden or path-bearing names
    /// * `UnknownFileType` when the extension is unrecognized and unknown
    ///   submissions are rejected
    /// * `UploadFailed` when the bytes cannot be stored
    /// * `MoveFailed` / `DirectoryCreationFailed` when filing fails
    pub fn submit_file(&self, bytes: &[u8], filename: &str) -> SortResult<Submission> {
        validate_filename(filename)?;

        let policy = self.config.policy.submit_unknown;
        let (category, recognized) = self.organizer.rules().classify(filename);
        if !recognized && policy == UnknownPolicy::Reject {
            return Err(SortError::UnknownFileType {
                filename: filename.to_string(),
            });
        }

        let temp_path = self.store_upload(bytes, filename)?;
        let entry = StagingEntry::uploaded(
            temp_path.clone(),
            filename,
            self.staging_dir.join(filename),
        );

        let result = match self.organizer.move_one(&entry, policy) {
            Ok(MoveOutcome::Moved(moved)) => Ok(Submission {
                category: moved.category,
                destination_path: moved.destination_path,
            }),
            Ok(MoveOutcome::Skipped(reason)) => Err(SortError::MoveFailed {
                source_path: temp_path.clone(),
                destination: self.organizer.category_dir(category),
                source: io::Error::other(format!("upload was not moved: {:?}", reason)),
            }),
            Err(e) => Err(e),
        };

        if result.is_err() && temp_path.exists() {
            debug!(path = %temp_path.display(), "removing failed upload");
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    /// Catalog rows in insertion order, optionally for one category.
    pub fn list_catalog(&self, filter: Option<Category>) -> SortResult<Vec<FileRecord>> {
        self.catalog.query(filter)
    }

    /// A stopped watcher over the staging directory using the watch-path
    /// unknown policy and configured pool size.
    pub fn watcher(&self) -> DirectoryWatcher {
        DirectoryWatcher::new(
            self.staging_dir.clone(),
            Arc::clone(&self.organizer),
            Arc::clone(&self.filters),
            self.config.policy.watch_unknown,
            self.config.workers.pool_size,
        )
    }

    /// Filesystem notifications for the staging directory.
    pub fn notify_source(&self) -> SortResult<SignalSource> {
        SignalSource::notify(&self.staging_dir)
    }

    fn store_upload(&self, bytes: &[u8], filename: &str) -> SortResult<PathBuf> {
        let upload_error = |source: io::Error| SortError::UploadFailed {
            filename: filename.to_string(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(&self.staging_dir)
            .map_err(upload_error)?;
        temp.write_all(bytes).map_err(upload_error)?;
        temp.flush().map_err(upload_error)?;

        let (_file, path) = temp.keep().map_err(|e| upload_error(e.error))?;
        Ok(path)
    }
}

fn prepare_staging_dir(path: &Path) -> SortResult<PathBuf> {
    let creation_error = |source: io::Error| SortError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(path).map_err(creation_error)?;
    path.canonicalize().map_err(creation_error)
}

fn validate_filename(filename: &str) -> SortResult<()> {
    let reason = if filename.is_empty() {
        Some("name is empty")
    } else if is_hidden(filename) {
        Some("hidden names are not accepted")
    } else if filename.contains(['/', '\\', '\0']) {
        Some("name must not contain a path")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SortError::InvalidFilename {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
