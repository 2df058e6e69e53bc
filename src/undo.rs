/// Undo journal for completed moves.
///
/// The journal is a JSON object mapping each original path to the newest
/// location the file was moved to. A later move from the same original path
/// replaces the earlier entry, so only the most recent relocation is kept.
///
/// The core only writes the journal. Restoring files from it is the job of a
/// separate tool, which can use [`UndoJournal::load`].
use crate::error::{SortError, SortResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Durable map of original path to newest destination path.
#[derive(Debug)]
pub struct UndoJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UndoJournal {
    /// Creates a journal backed by the JSON file at `path`.
    ///
    /// The file is created on the first [`record`](Self::record).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records that `original` now lives at `new_path`, overwriting any
    /// earlier entry for `original`.
    ///
    /// The updated journal is written to a sibling file and renamed into
    /// place, so readers never see a partially written journal.
    pub fn record(&self, original: &Path, new_path: &Path) -> SortResult<()> {
        let _guard = self.write_lock.lock();

        let mut entries = self.read_map()?;
        entries.insert(
            original.to_string_lossy().into_owned(),
            Value::String(new_path.to_string_lossy().into_owned()),
        );

        let json_string = serde_json::to_string_pretty(&Value::Object(entries))
            .map_err(|e| self.write_error(format!("JSON serialization failed: {}", e)))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e.to_string()))?;
        }

        let staged = self.staged_path();
        fs::write(&staged, json_string).map_err(|e| self.write_error(e.to_string()))?;
        fs::rename(&staged, &self.path).map_err(|e| {
            let _ = fs::remove_file(&staged);
            self.write_error(e.to_string())
        })?;

        Ok(())
    }

    /// Loads every entry. A missing journal is empty.
    pub fn load(&self) -> SortResult<BTreeMap<PathBuf, PathBuf>> {
        let map = self.read_map()?;
        Ok(map
            .into_iter()
            .filter_map(|(original, new_path)| {
                new_path
                    .as_str()
                    .map(|new_path| (PathBuf::from(original), PathBuf::from(new_path)))
            })
            .collect())
    }

    fn read_map(&self) -> SortResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let json_string =
            fs::read_to_string(&self.path).map_err(|e| self.write_error(e.to_string()))?;
        if json_string.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&json_string) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(self.write_error("journal is not a JSON object".to_string())),
            Err(e) => Err(self.write_error(format!("JSON parse error: {}", e))),
        }
    }

    fn staged_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "undo_log.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_error(&self, reason: String) -> SortError {
        SortError::JournalWriteFailed {
            path: self.path.clone(),
            reason,
        }
    }
}
