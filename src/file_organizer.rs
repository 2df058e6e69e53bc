/// Moving staged files into their category directories.
///
/// [`FileOrganizer::move_one`] is the unit of work the watcher's workers and
/// the submission entry point run for each file: classify, pick a free name,
/// move without overwriting anything, then record the move in the catalog and
/// the undo journal.
///
/// Handling the same file twice is harmless. The second attempt finds the
/// source gone (or already inside its category directory) and does nothing.
use crate::catalog::{Catalog, NewRecord};
use crate::config::UnknownPolicy;
use crate::error::{SortError, SortResult};
use crate::file_category::{Category, CategoryRules, is_hidden};
use crate::undo::UndoJournal;
use crate::unique_name;
use std::ffi::OsString;
use std::fs::{self, DirEntry, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A file handed to the mover.
///
/// Built by each entry point: directory enumeration for the watcher, a
/// temporary upload file for explicit submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    /// Where the bytes are right now.
    pub path: PathBuf,
    /// Name used for classification and as the candidate destination name.
    /// Kept as the raw OS name; names that are not valid UTF-8 are refused
    /// by [`FileOrganizer::move_one`] rather than renamed.
    pub name: OsString,
    /// Whether the entry was a regular file when it was observed.
    pub is_regular_file: bool,
    /// Path recorded as the file's origin in the catalog and undo journal.
    pub source_path: PathBuf,
}

impl StagingEntry {
    /// Builds an entry from a staging directory listing.
    ///
    /// Symlinks are not regular files.
    pub fn from_dir_entry(entry: &DirEntry) -> Self {
        let path = entry.path();
        Self {
            name: entry.file_name(),
            is_regular_file: entry.file_type().map(|t| t.is_file()).unwrap_or(false),
            source_path: path.clone(),
            path,
        }
    }

    /// Builds an entry for a file at `path`, stat-ing it now.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.file_name().map(OsString::from).unwrap_or_default(),
            is_regular_file: path
                .symlink_metadata()
                .map(|m| m.file_type().is_file())
                .unwrap_or(false),
            source_path: path.clone(),
            path,
        }
    }

    /// Lossy view of the name, for logs and filters.
    pub fn display_name(&self) -> std::borrow::Cow<'_, str> {
        self.name.to_string_lossy()
    }

    /// Builds an entry for uploaded bytes stored at `temp_path` under a
    /// client-supplied `name`, recorded as coming from `source_path`.
    pub fn uploaded(temp_path: PathBuf, name: impl Into<String>, source_path: PathBuf) -> Self {
        Self {
            path: temp_path,
            name: OsString::from(name.into()),
            is_regular_file: true,
            source_path,
        }
    }
}

/// Why a dispatched entry was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Name starts with `.`.
    Hidden,
    /// Directory, symlink or other special file.
    NotRegularFile,
    /// The source no longer exists; another worker already moved it.
    Vanished,
    /// The file already sits in its category directory.
    AlreadySorted,
}

/// A completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedFile {
    /// Final name inside the category directory.
    pub filename: String,
    pub category: Category,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// `Some(true)` inserted, `Some(false)` a row already existed, `None` the write failed.
    pub cataloged: Option<bool>,
    /// Whether the undo journal entry was written.
    pub journaled: bool,
}

/// Result of [`FileOrganizer::move_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(MovedFile),
    Skipped(SkipReason),
}

/// Moves `source` to `destination` without ever replacing an existing file.
///
/// The destination name is claimed with an exclusive create before the
/// rename, so two movers cannot both take it. Fails with
/// `ErrorKind::AlreadyExists` if the name is taken and `ErrorKind::NotFound`
/// if the source disappeared.
///
/// Between the claim and the rename an empty placeholder sits at
/// `destination`. A failed rename removes it. If that removal fails too, a
/// 0-byte file is left behind and a warning names it; the same leftover
/// remains if the process dies between the claim and the rename.
pub fn place_no_clobber(source: &Path, destination: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    if let Err(e) = fs::rename(source, destination) {
        if let Err(cleanup) = fs::remove_file(destination) {
            warn!(
                placeholder = %destination.display(),
                error = %cleanup,
                "could not remove empty placeholder after failed move"
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Moves staged files into category directories and records each move.
#[derive(Debug)]
pub struct FileOrganizer {
    rules: Arc<CategoryRules>,
    staging_dir: PathBuf,
    catalog: Catalog,
    journal: Arc<UndoJournal>,
    max_claim_attempts: u32,
}

impl FileOrganizer {
    /// Creates a mover filing into category directories under `staging_dir`.
    pub fn new(
        rules: Arc<CategoryRules>,
        staging_dir: PathBuf,
        catalog: Catalog,
        journal: Arc<UndoJournal>,
        max_claim_attempts: u32,
    ) -> Self {
        Self {
            rules,
            staging_dir,
            catalog,
            journal,
            max_claim_attempts: max_claim_attempts.max(1),
        }
    }

    /// The category rules this mover classifies with.
    pub fn rules(&self) -> &CategoryRules {
        &self.rules
    }

    /// Directory files of `category` are moved into.
    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.staging_dir.join(category.dir_name())
    }

    /// Classifies, moves and records one staged file.
    ///
    /// Catalog and journal failures after the file has moved are logged and
    /// reported through [`MovedFile`]; the move itself is never rolled back.
    ///
    /// # Errors
    ///
    /// * `InvalidFilename` when the name or source path is not valid UTF-8
    /// * `UnknownFileType` when the extension is unrecognized and `unknown` is `Reject`
    /// * `DirectoryCreationFailed` when the category directory cannot be created
    /// * `MoveFailed` when the physical move fails or no free name could be claimed
    pub fn move_one(&self, entry: &StagingEntry, unknown: UnknownPolicy) -> SortResult<MoveOutcome> {
        if is_hidden(&entry.display_name()) {
            return Ok(MoveOutcome::Skipped(SkipReason::Hidden));
        }
        if !entry.is_regular_file {
            return Ok(MoveOutcome::Skipped(SkipReason::NotRegularFile));
        }

        // The catalog and journal store text; a lossy name would rename the
        // file and merge distinct sources.
        let name = match entry.name.to_str() {
            Some(name) if entry.source_path.to_str().is_some() => name,
            _ => {
                return Err(SortError::InvalidFilename {
                    filename: entry.display_name().into_owned(),
                    reason: "name is not valid UTF-8".to_string(),
                });
            }
        };

        match entry.path.symlink_metadata() {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => return Ok(MoveOutcome::Skipped(SkipReason::NotRegularFile)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %entry.path.display(), "source already gone");
                return Ok(MoveOutcome::Skipped(SkipReason::Vanished));
            }
            Err(e) => {
                return Err(SortError::MoveFailed {
                    source_path: entry.path.clone(),
                    destination: self.staging_dir.clone(),
                    source: e,
                });
            }
        }

        let (category, recognized) = self.rules.classify(name);
        if !recognized && unknown == UnknownPolicy::Reject {
            return Err(SortError::UnknownFileType {
                filename: name.to_string(),
            });
        }

        let category_dir = self.category_dir(category);
        fs::create_dir_all(&category_dir).map_err(|e| SortError::DirectoryCreationFailed {
            path: category_dir.clone(),
            source: e,
        })?;

        if entry.path.parent() == Some(category_dir.as_path()) {
            debug!(name, "already in destination");
            return Ok(MoveOutcome::Skipped(SkipReason::AlreadySorted));
        }

        for attempt in 1..=self.max_claim_attempts {
            let final_name = unique_name::resolve(&category_dir, name);
            let destination = category_dir.join(&final_name);

            match place_no_clobber(&entry.path, &destination) {
                Ok(()) => {
                    info!(
                        name,
                        destination = %destination.display(),
                        category = %category,
                        "moved"
                    );
                    return Ok(MoveOutcome::Moved(
                        self.record(entry, category, final_name, destination),
                    ));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(
                        name = %final_name,
                        attempt,
                        "destination claimed concurrently, resolving again"
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound && !entry.path.exists() => {
                    debug!(path = %entry.path.display(), "source moved by another worker");
                    return Ok(MoveOutcome::Skipped(SkipReason::Vanished));
                }
                Err(e) => {
                    return Err(SortError::MoveFailed {
                        source_path: entry.path.clone(),
                        destination,
                        source: e,
                    });
                }
            }
        }

        Err(SortError::MoveFailed {
            source_path: entry.path.clone(),
            destination: category_dir,
            source: io::Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "no free name after {} attempts",
                    self.max_claim_attempts
                ),
            ),
        })
    }

    fn record(
        &self,
        entry: &StagingEntry,
        category: Category,
        filename: String,
        destination: PathBuf,
    ) -> MovedFile {
        let record = NewRecord::now(
            filename.clone(),
            category,
            entry.source_path.clone(),
            destination.clone(),
        );
        let cataloged = match self.catalog.record_move(&record) {
            Ok(inserted) => Some(inserted),
            Err(e) => {
                warn!(
                    source = %entry.source_path.display(),
                    error = %e,
                    "catalog write failed; reconcile will pick the file up"
                );
                None
            }
        };

        let journaled = match self.journal.record(&entry.source_path, &destination) {
            Ok(()) => true,
            Err(e) => {
                warn!(source = %entry.source_path.display(), error = %e, "undo journal write failed");
                false
            }
        };

        MovedFile {
            filename,
            category,
            source_path: entry.source_path.clone(),
            destination_path: destination,
            cataloged,
            journaled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Setup {
        _temp_dir: TempDir,
        staging: PathBuf,
        organizer: FileOrganizer,
        catalog: Catalog,
        journal: Arc<UndoJournal>,
    }

    fn setup() -> Setup {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let staging = temp_dir.path().join("FileSorter");
        fs::create_dir(&staging).expect("Failed to create staging");
        let catalog = Catalog::open(temp_dir.path().join("files_db.db")).expect("Failed to open");
        let journal = Arc::new(UndoJournal::new(temp_dir.path().join("undo_log.json")));
        let organizer = FileOrganizer::new(
            Arc::new(CategoryRules::default()),
            staging.clone(),
            catalog.clone(),
            Arc::clone(&journal),
            8,
        );
        Setup {
            _temp_dir: temp_dir,
            staging,
            organizer,
            catalog,
            journal,
        }
    }

    #[test]
    fn test_move_creates_category_directory_and_records() {
        let s = setup();
        let file_path = s.staging.join("song.mp3");
        fs::write(&file_path, "audio").expect("Failed to write test file");

        let outcome = s
            .organizer
            .move_one(&StagingEntry::from_path(&file_path), UnknownPolicy::Bucket)
            .expect("move failed");

        let moved = match outcome {
            MoveOutcome::Moved(moved) => moved,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(moved.category, Category::Audio);
        assert_eq!(moved.destination_path, s.staging.join("Audio").join("song.mp3"));
        assert_eq!(moved.cataloged, Some(true));
        assert!(moved.journaled);
        assert!(!file_path.exists());
        assert_eq!(fs::read_to_string(&moved.destination_path).unwrap(), "audio");

        assert_eq!(s.catalog.count().unwrap(), 1);
        assert_eq!(
            s.journal.load().unwrap()[&file_path],
            s.staging.join("Audio").join("song.mp3")
        );
    }

    #[test]
    fn test_move_twice_is_noop() {
        let s = setup();
        let file_path = s.staging.join("report.pdf");
        fs::write(&file_path, "pdf").unwrap();
        let entry = StagingEntry::from_path(&file_path);

        let first = s.organizer.move_one(&entry, UnknownPolicy::Bucket).unwrap();
        let second = s.organizer.move_one(&entry, UnknownPolicy::Bucket).unwrap();

        assert!(matches!(first, MoveOutcome::Moved(_)));
        assert_eq!(second, MoveOutcome::Skipped(SkipReason::Vanished));
        assert_eq!(s.catalog.count().unwrap(), 1);
        assert_eq!(fs::read_dir(s.staging.join("Documents")).unwrap().count(), 1);
    }

    #[test]
    fn test_collision_gets_numbered_name() {
        let s = setup();
        fs::create_dir(s.staging.join("Images")).unwrap();
        fs::write(s.staging.join("Images").join("photo.png"), "old").unwrap();
        let file_path = s.staging.join("photo.png");
        fs::write(&file_path, "new").unwrap();

        let outcome = s
            .organizer
            .move_one(&StagingEntry::from_path(&file_path), UnknownPolicy::Bucket)
            .unwrap();

        let MoveOutcome::Moved(moved) = outcome else {
            panic!("expected a move");
        };
        assert_eq!(moved.filename, "photo(1).png");
        assert_eq!(fs::read_to_string(s.staging.join("Images/photo.png")).unwrap(), "old");
        assert_eq!(fs::read_to_string(s.staging.join("Images/photo(1).png")).unwrap(), "new");
    }

    #[test]
    fn test_unknown_bucket_and_reject() {
        let s = setup();
        let file_path = s.staging.join("notes.xyz");
        fs::write(&file_path, "?").unwrap();
        let entry = StagingEntry::from_path(&file_path);

        let rejected = s.organizer.move_one(&entry, UnknownPolicy::Reject);
        assert!(matches!(rejected, Err(SortError::UnknownFileType { ref filename }) if filename == "notes.xyz"));
        assert!(file_path.exists());
        assert!(!s.staging.join("Others").exists());

        let bucketed = s.organizer.move_one(&entry, UnknownPolicy::Bucket).unwrap();
        let MoveOutcome::Moved(moved) = bucketed else {
            panic!("expected a move");
        };
        assert_eq!(moved.category, Category::Unknown);
        assert!(s.staging.join("Others").join("notes.xyz").exists());

        let row = s.catalog.find_by_source(&file_path).unwrap().unwrap();
        assert_eq!(row.file_type, "Unknown");
    }

    #[test]
    fn test_hidden_and_directories_skipped() {
        let s = setup();
        fs::write(s.staging.join(".DS_Store"), "x").unwrap();
        fs::create_dir(s.staging.join("album.mp3")).unwrap();

        let hidden = s
            .organizer
            .move_one(&StagingEntry::from_path(s.staging.join(".DS_Store")), UnknownPolicy::Bucket)
            .unwrap();
        let dir = s
            .organizer
            .move_one(&StagingEntry::from_path(s.staging.join("album.mp3")), UnknownPolicy::Bucket)
            .unwrap();

        assert_eq!(hidden, MoveOutcome::Skipped(SkipReason::Hidden));
        assert_eq!(dir, MoveOutcome::Skipped(SkipReason::NotRegularFile));
        assert_eq!(s.catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_file_already_in_category_directory() {
        let s = setup();
        fs::create_dir(s.staging.join("Audio")).unwrap();
        let sorted = s.staging.join("Audio").join("song.mp3");
        fs::write(&sorted, "x").unwrap();

        let outcome = s
            .organizer
            .move_one(&StagingEntry::from_path(&sorted), UnknownPolicy::Bucket)
            .unwrap();

        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::AlreadySorted));
        assert!(sorted.exists());
        assert!(!s.staging.join("Audio").join("song(1).mp3").exists());
    }

    #[test]
    fn test_journal_failure_does_not_undo_move() {
        let s = setup();
        fs::write(s.journal.path(), "not json").unwrap();
        let file_path = s.staging.join("clip.mp4");
        fs::write(&file_path, "x").unwrap();

        let outcome = s
            .organizer
            .move_one(&StagingEntry::from_path(&file_path), UnknownPolicy::Bucket)
            .unwrap();

        let MoveOutcome::Moved(moved) = outcome else {
            panic!("expected a move");
        };
        assert!(!moved.journaled);
        assert_eq!(moved.cataloged, Some(true));
        assert!(moved.destination_path.exists());
    }

    #[test]
    fn test_catalog_failure_does_not_undo_move() {
        let s = setup();
        rusqlite::Connection::open(s.catalog.path())
            .unwrap()
            .execute_batch("DROP TABLE files_table")
            .unwrap();
        let file_path = s.staging.join("lecture.m4a");
        fs::write(&file_path, "x").unwrap();

        let outcome = s
            .organizer
            .move_one(&StagingEntry::from_path(&file_path), UnknownPolicy::Bucket)
            .unwrap();

        let MoveOutcome::Moved(moved) = outcome else {
            panic!("expected a move");
        };
        assert_eq!(moved.cataloged, None);
        assert!(moved.journaled);
        assert!(!file_path.exists());
        assert_eq!(fs::read_to_string(&moved.destination_path).unwrap(), "x");

        // Reopening restores the table; reconcile backfills the missing row.
        let catalog = Catalog::open(s.catalog.path()).unwrap();
        let reconciler = crate::reconcile::Reconciler::new(&s.staging, catalog.clone());
        assert_eq!(reconciler.scan_existing().unwrap(), 1);
        let row = catalog
            .find_by_source(&moved.destination_path)
            .unwrap()
            .expect("row missing");
        assert_eq!(row.file_type, "Audio");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_refused_not_renamed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let s = setup();
        let raw_name = OsStr::from_bytes(b"caf\xe9.mp3");
        let file_path = s.staging.join(raw_name);
        fs::write(&file_path, "x").unwrap();
        let entry = StagingEntry::from_path(&file_path);
        assert_eq!(entry.name.as_os_str(), raw_name);

        let result = s.organizer.move_one(&entry, UnknownPolicy::Bucket);

        assert!(matches!(result, Err(SortError::InvalidFilename { .. })));
        assert!(file_path.exists());
        let filed = fs::read_dir(s.staging.join("Audio"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(filed, 0);
        assert_eq!(s.catalog.count().unwrap(), 0);
        assert!(s.journal.load().unwrap().is_empty());
    }

    #[test]
    fn test_place_no_clobber_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("b.txt");
        fs::write(&source, "source").unwrap();
        fs::write(&destination, "keep").unwrap();

        let err = place_no_clobber(&source, &destination).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "keep");
        assert!(source.exists());
    }

    #[test]
    fn test_place_no_clobber_missing_source_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("b.txt");

        let err = place_no_clobber(&temp_dir.path().join("missing.txt"), &destination).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_place_no_clobber_failed_rename_removes_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("folder");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("inner.txt"), "x").unwrap();
        let destination = temp_dir.path().join("folder.txt");

        // A directory cannot be renamed over the claimed regular file.
        let err = place_no_clobber(&source, &destination).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::AlreadyExists);
        assert!(!destination.exists());
        assert!(source.join("inner.txt").exists());
    }

    #[test]
    fn test_uploaded_entry_records_given_source() {
        let s = setup();
        let temp_path = s.staging.join(".upload-abc");
        fs::write(&temp_path, "doc").unwrap();
        let origin = s.staging.join("cv.docx");

        let outcome = s
            .organizer
            .move_one(
                &StagingEntry::uploaded(temp_path.clone(), "cv.docx", origin.clone()),
                UnknownPolicy::Reject,
            )
            .unwrap();

        let MoveOutcome::Moved(moved) = outcome else {
            panic!("expected a move");
        };
        assert_eq!(moved.destination_path, s.staging.join("Documents").join("cv.docx"));
        assert_eq!(moved.source_path, origin);
        assert!(!temp_path.exists());
        assert!(s.catalog.find_by_source(&origin).unwrap().is_some());
    }
}
