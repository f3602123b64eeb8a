//! Metadata reader seam: musical key and BPM for a single audio file.
//!
//! Tag parsing itself lives outside this crate. Anything that can turn a
//! path into a [`TrackTags`] plugs in through [`TagReader`].

use std::path::Path;

/// Key/BPM pair read from an audio file. Both halves are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub key: Option<String>,
    pub bpm: Option<String>,
}

impl TrackTags {
    pub fn new(key: impl Into<String>, bpm: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            bpm: Some(bpm.into()),
        }
    }

    /// Nothing could be read.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.bpm.is_none()
    }
}

/// Reads tags for one file.
///
/// Implementations may block and may be slow; they are always called from the
/// blocking pool. Unsupported or corrupt files yield [`TrackTags::absent`]
/// rather than an error.
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> TrackTags;
}

/// Reader used when no tag backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagReader for NoTags {
    fn read_tags(&self, _path: &Path) -> TrackTags {
        TrackTags::absent()
    }
}

impl<F> TagReader for F
where
    F: Fn(&Path) -> TrackTags + Send + Sync,
{
    fn read_tags(&self, path: &Path) -> TrackTags {
        self(path)
    }
}
