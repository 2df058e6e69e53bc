//! Terminal output for the `filesorter` binary.
//!
//! Status lines go to stdout with a colored marker; errors go to stderr.
//! Log events are separate and handled by `tracing`.

use crate::catalog::FileRecord;
use crate::file_category::Category;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Styled printing helpers for the CLI.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// A progress bar over `total` items.
    ///
    /// ```no_run
    /// use filesorter::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(3);
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        let pb = ProgressBar::new(total);
        pb.set_style(style);
        pb
    }

    /// Prints one line per catalog row.
    pub fn catalog_rows(records: &[FileRecord]) {
        for record in records {
            println!(
                "{:>5}  {:<9} {}  {} {} {}",
                record.id.to_string().dimmed(),
                record.file_type.cyan(),
                record.moved_at,
                record.source_path.display(),
                "→".dimmed(),
                record.destination_path.display()
            );
        }
    }

    /// Prints a per-category count table with a total row.
    pub fn summary_table(records: &[FileRecord]) {
        let counts = category_counts(records);
        Self::header("SUMMARY");

        let width = counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max("Category".len());

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in &counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural_files(*count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            records.len().to_string().green().bold(),
            plural_files(records.len()),
            width = width
        );
    }
}

/// Row counts keyed by category label. Labels no category knows are kept
/// as stored.
fn category_counts(records: &[FileRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let label = Category::from_label(&record.file_type)
            .map(|c| c.label().to_string())
            .unwrap_or_else(|| record.file_type.clone());
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

fn plural_files(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn row(id: i64, file_type: &str) -> FileRecord {
        FileRecord {
            id,
            filename: format!("f{}", id),
            file_type: file_type.to_string(),
            source_path: PathBuf::from(format!("/in/f{}", id)),
            destination_path: PathBuf::from(format!("/out/f{}", id)),
            moved_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_category_counts_normalizes_labels() {
        let records = vec![row(1, "Audio"), row(2, "audio"), row(3, "Image"), row(4, "Legacy")];
        let counts = category_counts(&records);

        assert_eq!(counts.get("Audio"), Some(&2));
        assert_eq!(counts.get("Image"), Some(&1));
        assert_eq!(counts.get("Legacy"), Some(&1));
    }

    #[test]
    fn test_plural_files() {
        assert_eq!(plural_files(1), "file");
        assert_eq!(plural_files(0), "files");
        assert_eq!(plural_files(7), "files");
    }
}
