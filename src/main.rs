use clap::{Parser, Subcommand};
use filesorter::cli::{SortCommand, run_cli};
use filesorter::file_category::Category;
use filesorter::logging::{LogConfig, init_logging};
use filesorter::output::OutputFormatter;
use std::path::PathBuf;
use std::process::ExitCode;

/// Watch a staging directory and file everything that lands in it.
#[derive(Debug, Parser)]
#[command(name = "filesorter", version, about)]
struct Cli {
    /// Configuration file (default: .filesorter.toml, then ~/.config/filesorter/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append log lines to this file as well as stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile, then file new arrivals until Ctrl-C
    Watch,
    /// Add catalog rows for files already in category directories
    Reconcile,
    /// File a local file as an explicit submission
    Submit {
        file: PathBuf,
        /// File under this name instead of FILE's own name
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the catalog
    List {
        /// Only rows of this category (audio, video, image, document, unknown)
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
    },
}

fn parse_category(value: &str) -> Result<Category, String> {
    Category::from_label(value).ok_or_else(|| format!("unknown category '{}'", value))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        verbose: cli.verbose,
        log_file: cli.log_file,
    };
    if let Err(e) = init_logging(&log_config) {
        OutputFormatter::warning(&format!("Logging disabled: {}", e));
    }

    let command = match cli.command {
        Command::Watch => SortCommand::Watch,
        Command::Reconcile => SortCommand::Reconcile,
        Command::Submit { file, name } => SortCommand::Submit { file, name },
        Command::List { category } => SortCommand::List { category },
    };

    match run_cli(command, cli.config.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}
