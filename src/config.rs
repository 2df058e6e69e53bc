//! Pipeline configuration.
//!
//! Configuration is stored in TOML and controls where the staging directory,
//! catalog and undo journal live, how many workers move files, how each entry
//! point treats unrecognized extensions, extra extensions per category, and
//! extra exclusion rules for the watch path.
//!
//! # Configuration File Format
//!
//! ```toml
//! [paths]
//! staging_dir = "./FileSorter"
//! catalog_db = "./files_db.db"
//! undo_journal = "./undo_log.json"
//!
//! [workers]
//! pool_size = 4
//! max_claim_attempts = 32
//!
//! [policy]
//! watch_unknown = "bucket"
//! submit_unknown = "reject"
//!
//! [categories]
//! audio = ["opus"]
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["*.part"]
//! extensions = ["crdownload", "tmp"]
//! regex = []
//! ```
//!
//! Hidden files (leading `.`) are always excluded and cannot be re-enabled.

use crate::file_category::CategoryExtras;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".filesorter.toml";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or name?.ext")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// A numeric setting is out of range.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// What an entry point does with a file whose extension matches no category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    /// File it under the `Unknown` category (`Others` directory).
    Bucket,
    /// Refuse the file with `UnknownFileType`.
    Reject,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SorterConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub categories: CategoryExtras,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Locations of the staging directory and the durable stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory under observation. Category directories are created inside it.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// SQLite catalog file.
    #[serde(default = "default_catalog_db")]
    pub catalog_db: PathBuf,
    /// JSON undo journal file.
    #[serde(default = "default_undo_journal")]
    pub undo_journal: PathBuf,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./FileSorter")
}

fn default_catalog_db() -> PathBuf {
    PathBuf::from("./files_db.db")
}

fn default_undo_journal() -> PathBuf {
    PathBuf::from("./undo_log.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            catalog_db: default_catalog_db(),
            undo_journal: default_undo_journal(),
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Number of threads moving files in parallel.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How many times a mover re-resolves a name after losing a race for it.
    #[serde(default = "default_max_claim_attempts")]
    pub max_claim_attempts: u32,
}

fn default_pool_size() -> usize {
    4
}

fn default_max_claim_attempts() -> u32 {
    32
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_claim_attempts: default_max_claim_attempts(),
        }
    }
}

/// Unknown-extension policy per entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Directory watch path. Defaults to `bucket`: nobody is there to receive an error.
    #[serde(default = "default_watch_unknown")]
    pub watch_unknown: UnknownPolicy,
    /// Explicit submission path. Defaults to `reject`.
    #[serde(default = "default_submit_unknown")]
    pub submit_unknown: UnknownPolicy,
}

fn default_watch_unknown() -> UnknownPolicy {
    UnknownPolicy::Bucket
}

fn default_submit_unknown() -> UnknownPolicy {
    UnknownPolicy::Reject
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            watch_unknown: default_watch_unknown(),
            submit_unknown: default_submit_unknown(),
        }
    }
}

/// Extra exclusion rules for the watch path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,
}

/// Rules for excluding staged files from dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the file name (e.g., "*.part").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "crdownload", "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl SorterConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.filesorter.toml` in the current directory
    /// 3. Look for `~/.config/filesorter/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any loaded file is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("filesorter")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and pattern syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.pool_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers.max_claim_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.max_claim_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        CompiledFilters::new(&self.filters).map(|_| ())
    }

    /// Compile the exclusion rules for matching.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Exclusion rules pre-compiled for matching against staged file names.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
        })
    }

    /// Returns true if a staged file with this name should be dispatched.
    ///
    /// Checks, in order: hidden name, exact filename, extension, glob, regex.
    pub fn should_include(&self, file_name: &str) -> bool {
        if crate::file_category::is_hidden(file_name) {
            return false;
        }

        if self.exclude_filenames.contains(file_name) {
            return false;
        }

        if let Some(ext) = crate::file_category::extension_of(file_name)
            && self.exclude_extensions.contains(&ext)
        {
            return false;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches(file_name))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SorterConfig::default();
        assert_eq!(config.workers.pool_size, 4);
        assert_eq!(config.policy.watch_unknown, UnknownPolicy::Bucket);
        assert_eq!(config.policy.submit_unknown, UnknownPolicy::Reject);
        assert_eq!(config.paths.staging_dir, PathBuf::from("./FileSorter"));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = SorterConfig::from_toml("").expect("empty config should parse");
        assert_eq!(config.workers.max_claim_attempts, 32);
        assert_eq!(config.paths.undo_journal, PathBuf::from("./undo_log.json"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = SorterConfig::from_toml(
            r#"
            [paths]
            staging_dir = "/data/inbox"
            catalog_db = "/data/catalog.db"

            [workers]
            pool_size = 8

            [policy]
            watch_unknown = "reject"
            submit_unknown = "bucket"

            [categories]
            audio = ["opus"]

            [filters.exclude]
            extensions = ["part"]
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.paths.staging_dir, PathBuf::from("/data/inbox"));
        assert_eq!(config.paths.undo_journal, PathBuf::from("./undo_log.json"));
        assert_eq!(config.workers.pool_size, 8);
        assert_eq!(config.policy.watch_unknown, UnknownPolicy::Reject);
        assert_eq!(config.policy.submit_unknown, UnknownPolicy::Bucket);
        assert_eq!(config.categories.audio, vec!["opus".to_string()]);
        assert_eq!(config.filters.exclude.extensions, vec!["part".to_string()]);
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let result = SorterConfig::from_toml("[workers]\npool_size = 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "workers.pool_size",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_policy_value_rejected() {
        let result = SorterConfig::from_toml("[policy]\nwatch_unknown = \"explode\"\n");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = SorterConfig::load(Some(Path::new("/non/existent/filesorter.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_hidden_files_always_excluded() {
        let compiled = SorterConfig::default().compile_filters().unwrap();

        assert!(!compiled.should_include(".DS_Store"));
        assert!(!compiled.should_include(".song.mp3"));
        assert!(compiled.should_include("song.mp3"));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let mut config = SorterConfig::default();
        config.filters.exclude.filenames = vec!["Thumbs.db".to_string()];
        let compiled = config.compile_filters().unwrap();

        assert!(!compiled.should_include("Thumbs.db"));
        assert!(compiled.should_include("image.jpg"));
    }

    #[test]
    fn test_exclude_extensions_case_insensitive() {
        let mut config = SorterConfig::default();
        config.filters.exclude.extensions = vec!["crdownload".to_string(), ".TMP".to_string()];
        let compiled = config.compile_filters().unwrap();

        assert!(!compiled.should_include("movie.mp4.crdownload"));
        assert!(!compiled.should_include("file.tmp"));
        assert!(!compiled.should_include("file.Tmp"));
        assert!(compiled.should_include("movie.mp4"));
    }

    #[test]
    fn test_exclude_glob_patterns() {
        let mut config = SorterConfig::default();
        config.filters.exclude.patterns = vec!["*.part".to_string(), "draft?.pdf".to_string()];
        let compiled = config.compile_filters().unwrap();

        assert!(!compiled.should_include("video.mp4.part"));
        assert!(!compiled.should_include("draft1.pdf"));
        assert!(compiled.should_include("draft12.pdf"));
        assert!(compiled.should_include("final.pdf"));
    }

    #[test]
    fn test_exclude_regex() {
        let mut config = SorterConfig::default();
        config.filters.exclude.regex = vec![r"^~\$".to_string()];
        let compiled = config.compile_filters().unwrap();

        assert!(!compiled.should_include("~$report.docx"));
        assert!(compiled.should_include("report.docx"));
    }

    #[test]
    fn test_invalid_patterns_return_error() {
        let mut config = SorterConfig::default();
        config.filters.exclude.regex = vec!["[invalid(".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let mut config = SorterConfig::default();
        config.filters.exclude.patterns = vec!["[invalid".to_string()];
        assert!(matches!(
            config.compile_filters(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
