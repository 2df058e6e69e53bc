//! Durable catalog of completed moves.
//!
//! Backed by a SQLite file with one `files_table` row per move. The source
//! path is the natural key: [`Catalog::record_move`] inserts only when no row
//! with that source path exists, and does the check and the insert inside a
//! single `IMMEDIATE` transaction so concurrent callers cannot both insert.
//!
//! Every call opens its own connection. Nothing is held open across a
//! physical file move.

use crate::error::{SortError, SortResult};
use crate::file_category::Category;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files_table (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT,
    file_type TEXT,
    source_path TEXT,
    destination_path TEXT,
    moved_at TEXT
)";

/// Format of the `moved_at` column.
pub const MOVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub file_type: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub moved_at: String,
}

/// A row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub filename: String,
    pub category: Category,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub moved_at: chrono::DateTime<chrono::Local>,
}

impl NewRecord {
    /// Creates a record stamped with the current local time.
    pub fn now(
        filename: impl Into<String>,
        category: Category,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            filename: filename.into(),
            category,
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            moved_at: chrono::Local::now(),
        }
    }
}

/// Handle on the catalog database file.
///
/// Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct Catalog {
    db_path: PathBuf,
}

impl Catalog {
    /// Opens (creating if needed) the catalog at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> SortResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| SortError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let catalog = Self { db_path };
        let conn = catalog.connect().map_err(SortError::CatalogReadFailed)?;
        conn.execute_batch(SCHEMA)
            .map_err(SortError::CatalogWriteFailed)?;
        Ok(catalog)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Inserts `record` unless a row with the same source path already exists.
    ///
    /// Returns `true` when a row was inserted.
    pub fn record_move(&self, record: &NewRecord) -> SortResult<bool> {
        let mut conn = self.connect().map_err(SortError::CatalogWriteFailed)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(SortError::CatalogWriteFailed)?;

        let source = record.source_path.to_string_lossy().into_owned();
        let existing: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM files_table WHERE source_path = ?1",
                params![source],
                |row| row.get(0),
            )
            .map_err(SortError::CatalogWriteFailed)?;

        if existing > 0 {
            tx.commit().map_err(SortError::CatalogWriteFailed)?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO files_table (filename, file_type, source_path, destination_path, moved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.filename,
                record.category.label(),
                source,
                record.destination_path.to_string_lossy().into_owned(),
                record.moved_at.format(MOVED_AT_FORMAT).to_string(),
            ],
        )
        .map_err(SortError::CatalogWriteFailed)?;
        tx.commit().map_err(SortError::CatalogWriteFailed)?;

        Ok(true)
    }

    /// Returns rows in insertion order, optionally restricted to one category.
    pub fn query(&self, filter: Option<Category>) -> SortResult<Vec<FileRecord>> {
        let conn = self.connect().map_err(SortError::CatalogReadFailed)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, file_type, source_path, destination_path, moved_at
                 FROM files_table
                 WHERE ?1 IS NULL OR file_type = ?1
                 ORDER BY id",
            )
            .map_err(SortError::CatalogReadFailed)?;

        let rows = stmt
            .query_map(params![filter.map(|c| c.label())], row_to_record)
            .map_err(SortError::CatalogReadFailed)?;

        let records = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(SortError::CatalogReadFailed)?;
        Ok(records)
    }

    /// Looks up the row recorded for `source_path`, if any.
    pub fn find_by_source(&self, source_path: &Path) -> SortResult<Option<FileRecord>> {
        let conn = self.connect().map_err(SortError::CatalogReadFailed)?;
        conn.query_row(
            "SELECT id, filename, file_type, source_path, destination_path, moved_at
             FROM files_table WHERE source_path = ?1 ORDER BY id LIMIT 1",
            params![source_path.to_string_lossy().into_owned()],
            row_to_record,
        )
        .optional()
        .map_err(SortError::CatalogReadFailed)
    }

    /// Total number of rows.
    pub fn count(&self) -> SortResult<usize> {
        let conn = self.connect().map_err(SortError::CatalogReadFailed)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM files_table", [], |row| row.get(0))
            .map_err(SortError::CatalogReadFailed)?;
        Ok(count as usize)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    Ok(FileRecord {
        id: row.get(0)?,
        filename: text(1)?,
        file_type: text(2)?,
        source_path: PathBuf::from(text(3)?),
        destination_path: PathBuf::from(text(4)?),
        moved_at: text(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Catalog) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let catalog = Catalog::open(temp_dir.path().join("files_db.db")).expect("Failed to open");
        (temp_dir, catalog)
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("nested").join("catalog.db");

        Catalog::open(&db_path).expect("Failed to open catalog");
        assert!(db_path.exists());
    }

    #[test]
    fn test_record_move_inserts_once() {
        let (_dir, catalog) = open_temp();
        let record = NewRecord::now("song.mp3", Category::Audio, "/in/song.mp3", "/in/Audio/song.mp3");

        assert!(catalog.record_move(&record).expect("insert failed"));
        assert!(!catalog.record_move(&record).expect("second insert failed"));
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_query_in_insertion_order_with_filter() {
        let (_dir, catalog) = open_temp();
        for (name, category) in [
            ("b.mp3", Category::Audio),
            ("a.pdf", Category::Document),
            ("c.wav", Category::Audio),
        ] {
            let record = NewRecord::now(name, category, format!("/in/{}", name), format!("/out/{}", name));
            catalog.record_move(&record).expect("insert failed");
        }

        let all = catalog.query(None).expect("query failed");
        let names: Vec<_> = all.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b.mp3", "a.pdf", "c.wav"]);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let audio = catalog.query(Some(Category::Audio)).expect("query failed");
        assert_eq!(audio.len(), 2);
        assert!(audio.iter().all(|r| r.file_type == "Audio"));

        assert!(catalog.query(Some(Category::Video)).unwrap().is_empty());
    }

    #[test]
    fn test_record_fields_round_trip() {
        let (_dir, catalog) = open_temp();
        let record = NewRecord::now("clip(1).mp4", Category::Video, "/in/clip.mp4", "/in/Videos/clip(1).mp4");
        catalog.record_move(&record).unwrap();

        let row = catalog
            .find_by_source(Path::new("/in/clip.mp4"))
            .unwrap()
            .expect("row missing");
        assert_eq!(row.filename, "clip(1).mp4");
        assert_eq!(row.file_type, "Video");
        assert_eq!(row.destination_path, PathBuf::from("/in/Videos/clip(1).mp4"));
        assert!(chrono::NaiveDateTime::parse_from_str(&row.moved_at, MOVED_AT_FORMAT).is_ok());
    }

    #[test]
    fn test_concurrent_record_move_same_source_single_row() {
        let (_dir, catalog) = open_temp();
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let catalog = catalog.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let record = NewRecord::now(
                        "dup.pdf",
                        Category::Document,
                        "/in/dup.pdf",
                        format!("/out/dup({}).pdf", i),
                    );
                    barrier.wait();
                    catalog.record_move(&record).expect("insert failed")
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(catalog.count().unwrap(), 1);
    }
}
