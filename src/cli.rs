//! Command handlers for the `filesorter` binary.
//!
//! Each command loads the configuration, builds a [`Pipeline`] and reports
//! the result through [`OutputFormatter`]. Errors come back as display
//! strings for `main` to print.

use crate::config::SorterConfig;
use crate::file_category::Category;
use crate::output::OutputFormatter;
use crate::pipeline::Pipeline;
use crate::watcher::WatcherStats;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How often `watch` checks for Ctrl-C and refreshes its status line.
const WATCH_TICK: Duration = Duration::from_millis(250);

/// A CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCommand {
    /// Reconcile once, then file new arrivals until interrupted.
    Watch,
    /// Backfill catalog rows for files already in category directories.
    Reconcile,
    /// File one local file through the submission path.
    Submit {
        file: PathBuf,
        /// Name to file under; defaults to the file's own name.
        name: Option<String>,
    },
    /// Print the catalog.
    List { category: Option<Category> },
}

/// Runs `command` with the configuration found from `config_path`.
pub fn run_cli(command: SortCommand, config_path: Option<&Path>) -> Result<(), String> {
    let config = SorterConfig::load(config_path)
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let pipeline = Pipeline::new(&config).map_err(|e| format!("Error: {}", e))?;

    match command {
        SortCommand::Watch => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_flag = Arc::clone(&stop);
            ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
                .map_err(|e| format!("Failed to set Ctrl-C handler: {}", e))?;
            watch(&pipeline, &stop)
        }
        SortCommand::Reconcile => reconcile(&pipeline).map(|_| ()),
        SortCommand::Submit { file, name } => submit(&pipeline, &file, name.as_deref()),
        SortCommand::List { category } => list(&pipeline, category),
    }
}

/// Reconciles, then runs the watcher until `stop` is set.
pub fn watch(pipeline: &Pipeline, stop: &AtomicBool) -> Result<(), String> {
    reconcile(pipeline)?;

    let source = pipeline
        .notify_source()
        .map_err(|e| format!("Error: {}", e))?;
    let mut watcher = pipeline.watcher();
    watcher.start(source).map_err(|e| format!("Error: {}", e))?;
    let stats = watcher.stats();

    OutputFormatter::info(&format!(
        "Watching {} (Ctrl-C to stop)",
        pipeline.staging_dir().display()
    ));

    let mut last_status = String::new();
    while !stop.load(Ordering::SeqCst) {
        let status = status_line(&stats);
        if status != last_status {
            println!("{}", status);
            last_status = status;
        }
        thread::sleep(WATCH_TICK);
    }

    OutputFormatter::warning("Stopping; waiting for in-flight moves...");
    watcher.stop();
    OutputFormatter::success(&status_line(&stats));
    Ok(())
}

/// Runs the reconciler with a progress bar. Returns the number of new rows.
pub fn reconcile(pipeline: &Pipeline) -> Result<usize, String> {
    let pb = OutputFormatter::create_progress_bar(0);
    let mut seen = 0;
    let inserted = pipeline
        .reconciler()
        .scan_existing_with(|candidate, total| {
            pb.set_length(total as u64);
            pb.set_message(candidate.filename.clone());
            pb.inc(1);
            seen += 1;
        });
    pb.finish_and_clear();
    let inserted = inserted.map_err(|e| format!("Error: {}", e))?;

    OutputFormatter::success(&format!(
        "Reconciled {} existing file(s), {} new catalog row(s)",
        seen, inserted
    ));
    Ok(inserted)
}

/// Reads `file` and submits its bytes.
pub fn submit(pipeline: &Pipeline, file: &Path, name: Option<&str>) -> Result<(), String> {
    let filename = upload_name(file, name)?;
    let bytes = fs::read(file).map_err(|e| format!("Error reading {}: {}", file.display(), e))?;

    let submission = pipeline
        .submit_file(&bytes, &filename)
        .map_err(|e| format!("Error: {}", e))?;

    OutputFormatter::success(&format!(
        "{} filed as {} at {}",
        filename,
        submission.category,
        submission.destination_path.display()
    ));
    Ok(())
}

/// Prints catalog rows and a per-category summary.
pub fn list(pipeline: &Pipeline, category: Option<Category>) -> Result<(), String> {
    let records = pipeline
        .list_catalog(category)
        .map_err(|e| format!("Error: {}", e))?;

    if records.is_empty() {
        OutputFormatter::info("Catalog is empty.");
        return Ok(());
    }

    OutputFormatter::catalog_rows(&records);
    OutputFormatter::summary_table(&records);
    Ok(())
}

fn upload_name(file: &Path, name: Option<&str>) -> Result<String, String> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("Cannot take a file name from {}", file.display())),
    }
}

fn status_line(stats: &WatcherStats) -> String {
    format!(
        "passes: {}  moved: {}  skipped: {}  failed: {}",
        stats.passes(),
        stats.moved(),
        stats.skipped(),
        stats.failed()
    )
}
