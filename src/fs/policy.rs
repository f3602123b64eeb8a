//! Which listing entries become tree nodes, and in what order.

use std::cmp::Ordering;
use std::path::Path;

use crate::fs::access::DirEntryInfo;

/// Audio extensions shown by default.
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aiff", "flac", "aac", "m4a", "ogg"];

/// Sort/filter rules applied to every materialized listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPolicy {
    /// Lowercased extensions (without the dot) allowed for files.
    pub extensions: Vec<String>,
    pub show_hidden: bool,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_EXTENSIONS.iter().copied(), false)
    }
}

impl ListingPolicy {
    pub fn new<I, S>(extensions: I, show_hidden: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            extensions,
            show_hidden,
        }
    }

    /// Whether a file at `path` passes the extension allow-list.
    pub fn allows_file(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    /// Whether `entry` survives filtering.
    pub fn keeps(&self, entry: &DirEntryInfo) -> bool {
        if entry.is_hidden && !self.show_hidden {
            return false;
        }
        entry.is_dir || self.allows_file(&entry.path)
    }

    /// Filter then sort a raw listing.
    pub fn apply(&self, entries: Vec<DirEntryInfo>) -> Vec<DirEntryInfo> {
        let mut kept: Vec<DirEntryInfo> = entries.into_iter().filter(|e| self.keeps(e)).collect();
        kept.sort_by(compare_entries);
        kept
    }
}

/// Directories first, then case-insensitive natural name order, then path.
pub fn compare_entries(a: &DirEntryInfo, b: &DirEntryInfo) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| {
            alphanumeric_sort::compare_str(a.name.to_lowercase(), b.name.to_lowercase())
        })
        .then_with(|| a.path.cmp(&b.path))
}
