//! filesorter - watch a staging directory and file everything that lands in it
//!
//! Files dropped into the staging directory (or submitted explicitly) are
//! classified by extension, moved into a category subdirectory under a name
//! that never overwrites an existing file, recorded in a SQLite catalog and
//! noted in a JSON undo journal. A reconciler backfills catalog rows for
//! files that reached a category directory some other way.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod undo;
pub mod unique_name;
pub mod watcher;
pub mod worker_pool;

pub use catalog::{Catalog, FileRecord, NewRecord};
pub use config::{CompiledFilters, ConfigError, SorterConfig, UnknownPolicy};
pub use error::{SortError, SortResult};
pub use file_category::{Category, CategoryRules};
pub use file_organizer::{FileOrganizer, MoveOutcome, MovedFile, SkipReason, StagingEntry};
pub use pipeline::{Pipeline, Submission};
pub use reconcile::{ReconcileCandidate, Reconciler};
pub use undo::UndoJournal;
pub use watcher::{DirectoryWatcher, SignalSender, SignalSource, WatcherState, WatcherStats};

pub use cli::{SortCommand, run_cli};
