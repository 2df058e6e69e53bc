//! Catalog backfill for files already sitting in category directories.
//!
//! Files can reach a category directory without a catalog row: moved by hand,
//! left over from a run whose catalog write failed, or copied in from another
//! machine. The reconciler records each of them with its current path as both
//! source and destination. It is safe to run any number of times, and
//! concurrently with the watcher, because inserts are keyed on source path.

use crate::catalog::{Catalog, NewRecord};
use crate::error::{SortError, SortResult};
use crate::file_category::{Category, is_hidden};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file found in a category directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileCandidate {
    pub path: PathBuf,
    pub filename: String,
    pub category: Category,
}

/// Walks the category directories under a staging directory.
#[derive(Debug, Clone)]
pub struct Reconciler {
    staging_dir: PathBuf,
    catalog: Catalog,
}

impl Reconciler {
    pub fn new(staging_dir: impl Into<PathBuf>, catalog: Catalog) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            catalog,
        }
    }

    /// Lists regular, non-hidden files directly inside each existing
    /// category directory. Category directories that do not exist are skipped.
    pub fn collect_candidates(&self) -> SortResult<Vec<ReconcileCandidate>> {
        let mut candidates = Vec::new();

        for category in Category::ALL {
            let dir = self.staging_dir.join(category.dir_name());
            if !dir.is_dir() {
                continue;
            }
            candidates.extend(scan_category_dir(&dir, category)?);
        }

        debug!(count = candidates.len(), "reconcile candidates collected");
        Ok(candidates)
    }

    /// Inserts a catalog row for `candidate` unless one exists.
    ///
    /// Returns `true` when a row was inserted.
    pub fn backfill(&self, candidate: &ReconcileCandidate) -> SortResult<bool> {
        let record = NewRecord::now(
            candidate.filename.clone(),
            candidate.category,
            candidate.path.clone(),
            candidate.path.clone(),
        );
        self.catalog.record_move(&record)
    }

    /// Backfills every candidate and returns the number of new rows.
    ///
    /// A failed insert is logged and skipped.
    pub fn scan_existing(&self) -> SortResult<usize> {
        self.scan_existing_with(|_, _| {})
    }

    /// Like [`Reconciler::scan_existing`], calling `on_candidate` with each
    /// candidate and the total candidate count before it is backfilled.
    pub fn scan_existing_with<F>(&self, mut on_candidate: F) -> SortResult<usize>
    where
        F: FnMut(&ReconcileCandidate, usize),
    {
        let candidates = self.collect_candidates()?;
        let total = candidates.len();
        let mut inserted = 0;
        for candidate in &candidates {
            on_candidate(candidate, total);
            match self.backfill(candidate) {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    path = %candidate.path.display(),
                    error = %e,
                    "could not backfill catalog row"
                ),
            }
        }

        info!(total, inserted, "reconcile finished");
        Ok(inserted)
    }
}

fn scan_category_dir(dir: &Path, category: Category) -> SortResult<Vec<ReconcileCandidate>> {
    let entries = fs::read_dir(dir).map_err(|e| SortError::StagingUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let Ok(filename) = entry.file_name().into_string() else {
            if is_file {
                warn!(path = %entry.path().display(), "skipping file with non-UTF-8 name");
            }
            continue;
        };
        if !is_file || is_hidden(&filename) {
            continue;
        }
        candidates.push(ReconcileCandidate {
            path: entry.path(),
            filename,
            category,
        });
    }
    candidates.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(candidates)
}
