//! Collision-free naming inside a destination directory.
//!
//! The result of [`resolve`] is only a proposal: another worker can claim the
//! same name before our move lands. Callers must move with
//! [`crate::file_organizer::place_no_clobber`] and resolve again when it
//! reports that the destination already exists.

use std::path::Path;

/// Splits a filename into stem and extension (extension keeps its dot).
///
/// A name whose only dot is the leading one has no extension.
///
/// ```
/// use filesorter::unique_name::split_name;
///
/// assert_eq!(split_name("track.mp3"), ("track", ".mp3"));
/// assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
/// assert_eq!(split_name("README"), ("README", ""));
/// ```
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Returns the `n`-th disambiguated form of `name`: `stem(n)ext`.
pub fn numbered_name(name: &str, n: u32) -> String {
    let (stem, ext) = split_name(name);
    format!("{}({}){}", stem, n, ext)
}

/// Returns `candidate` if it is free in `dir`, otherwise the first free
/// `stem(1)ext`, `stem(2)ext`, ...
///
/// Dangling symlinks count as taken.
pub fn resolve(dir: &Path, candidate: &str) -> String {
    if !is_taken(dir, candidate) {
        return candidate.to_string();
    }

    let mut counter = 1u32;
    loop {
        let name = numbered_name(candidate, counter);
        if !is_taken(dir, &name) {
            return name;
        }
        counter += 1;
    }
}

fn is_taken(dir: &Path, name: &str) -> bool {
    dir.join(name).symlink_metadata().is_ok()
}
