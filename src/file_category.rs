/// File categorization by extension.
///
/// This module maps a filename's extension to one of the fixed categories
/// (Audio, Video, Image, Document) or to `Unknown`. Lookup is case-insensitive
/// and tables are consulted in a fixed priority order, first match wins.
///
/// # Examples
///
/// ```
/// use filesorter::file_category::{Category, CategoryRules};
///
/// let rules = CategoryRules::default();
/// assert_eq!(rules.classify("song.MP3"), (Category::Audio, true));
/// assert_eq!(rules.classify("clip.mov"), (Category::Video, true));
/// assert_eq!(rules.classify("notes.xyz"), (Category::Unknown, false));
/// ```
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Represents a destination category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Audio files (MP3, FLAC, WAV, etc.)
    Audio,
    /// Video files (MP4, MOV, AVI, etc.)
    Video,
    /// Image files (PNG, JPG, SVG, etc.)
    Image,
    /// Document files (PDF, DOCX, XLSX, etc.)
    Document,
    /// Anything not matched by an extension table
    Unknown,
}

impl Category {
    /// Every category, in lookup priority order followed by `Unknown`.
    pub const ALL: [Category; 5] = [
        Category::Audio,
        Category::Video,
        Category::Image,
        Category::Document,
        Category::Unknown,
    ];

    /// Returns the directory name for this category.
    ///
    /// # Examples
    ///
    /// ```
    /// use filesorter::file_category::Category;
    ///
    /// assert_eq!(Category::Audio.dir_name(), "Audio");
    /// assert_eq!(Category::Image.dir_name(), "Images");
    /// assert_eq!(Category::Unknown.dir_name(), "Others");
    /// ```
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Audio => "Audio",
            Category::Video => "Videos",
            Category::Image => "Images",
            Category::Document => "Documents",
            Category::Unknown => "Others",
        }
    }

    /// Returns the label stored in the catalog's `file_type` column.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Audio => "Audio",
            Category::Video => "Video",
            Category::Image => "Image",
            Category::Document => "Document",
            Category::Unknown => "Unknown",
        }
    }

    /// Parses a catalog label or directory name, ignoring case.
    ///
    /// ```
    /// use filesorter::file_category::Category;
    ///
    /// assert_eq!(Category::from_label("video"), Some(Category::Video));
    /// assert_eq!(Category::from_label("Documents"), Some(Category::Document));
    /// assert_eq!(Category::from_label("music"), None);
    /// ```
    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|category| {
            category.label().eq_ignore_ascii_case(label)
                || category.dir_name().eq_ignore_ascii_case(label)
        })
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const AUDIO_EXTENSIONS: &[&str] = &["m4a", "flac", "mp3", "wav", "wma", "aac"];

const VIDEO_EXTENSIONS: &[&str] = &[
    "webm", "mpg", "mp2", "mpeg", "mpe", "mpv", "ogg", "mp4", "mp4v", "m4v", "avi", "wmv", "mov",
    "qt", "flv", "swf", "avchd",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "jif", "jfif", "jfi", "png", "gif", "webp", "tiff", "tif", "psd", "raw",
    "arw", "cr2", "nrw", "k25", "bmp", "dib", "heif", "heic", "ind", "indd", "indt", "jp2", "j2k",
    "jpf", "jpx", "jpm", "mj2", "svg", "svgz", "ai", "eps", "ico",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["doc", "docx", "odt", "pdf", "xls", "xlsx", "ppt", "pptx"];

/// Returns true for names the pipeline never touches (leading `.`).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Returns the lower-cased substring after the last `.`, if any.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Immutable extension tables, one per category.
///
/// Built once when the pipeline is assembled and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    audio: HashSet<String>,
    video: HashSet<String>,
    image: HashSet<String>,
    document: HashSet<String>,
}

impl CategoryRules {
    /// Creates the rules with the built-in extension tables.
    pub fn new() -> Self {
        Self::with_extra(&CategoryExtras::default())
    }

    /// Creates the rules with the built-in tables plus configured additions.
    pub fn with_extra(extra: &CategoryExtras) -> Self {
        fn table(builtin: &[&str], extra: &[String]) -> HashSet<String> {
            builtin
                .iter()
                .map(|ext| ext.to_string())
                .chain(extra.iter().map(|ext| normalize_extension(ext)))
                .filter(|ext| !ext.is_empty())
                .collect()
        }

        Self {
            audio: table(AUDIO_EXTENSIONS, &extra.audio),
            video: table(VIDEO_EXTENSIONS, &extra.video),
            image: table(IMAGE_EXTENSIONS, &extra.image),
            document: table(DOCUMENT_EXTENSIONS, &extra.document),
        }
    }

    /// Maps a bare extension (with or without leading dot) to its category.
    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        let ext = normalize_extension(ext);
        [
            (Category::Audio, &self.audio),
            (Category::Video, &self.video),
            (Category::Image, &self.image),
            (Category::Document, &self.document),
        ]
        .into_iter()
        .find(|(_, table)| table.contains(&ext))
        .map(|(category, _)| category)
    }

    /// Classifies a filename.
    ///
    /// Returns the category and whether the extension was recognized.
    /// Unrecognized or missing extensions yield `(Category::Unknown, false)`;
    /// whether that is an error is decided by the caller's `UnknownPolicy`.
    pub fn classify(&self, filename: &str) -> (Category, bool) {
        match extension_of(filename).and_then(|ext| self.extension_to_category(&ext)) {
            Some(category) => (category, true),
            None => (Category::Unknown, false),
        }
    }
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Extra extensions per category, read from the `[categories]` config table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryExtras {
    #[serde(default)]
    pub audio: Vec<String>,
    #[serde(default)]
    pub video: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default)]
    pub document: Vec<String>,
}
