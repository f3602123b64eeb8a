//! Persisted bookmark for the last selected root directory.
//!
//! A bookmark pairs a path with an opaque token identifying the directory
//! that lived there when it was made. Re-opening checks the token: a
//! different directory at the same path makes the bookmark stale, which is
//! recoverable by re-creating it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    path: PathBuf,
    token: String,
}

impl Bookmark {
    /// Bookmark the directory at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let path = path.canonicalize().map_err(|e| AppError::from_io(e, path))?;
        let metadata = fs::metadata(&path).map_err(|e| AppError::from_io(e, &path))?;
        if !metadata.is_dir() {
            return Err(AppError::NotADirectory(path.display().to_string()));
        }
        Ok(Self {
            token: dir_token(&metadata),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the bookmarked directory is still the one it was made for.
    pub fn resolve(&self) -> Result<PathBuf> {
        let metadata = fs::metadata(&self.path).map_err(|e| AppError::from_io(e, &self.path))?;
        if !metadata.is_dir() {
            return Err(AppError::NotADirectory(self.path.display().to_string()));
        }
        if dir_token(&metadata) != self.token {
            return Err(AppError::StaleCredential(self.path.display().to_string()));
        }
        Ok(self.path.clone())
    }
}

#[cfg(unix)]
fn dir_token(metadata: &fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("{}:{}", metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn dir_token(metadata: &fs::Metadata) -> String {
    use std::time::UNIX_EPOCH;
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    bookmark: Bookmark,
}

/// JSON state file holding the last bookmark.
#[derive(Debug, Clone)]
pub struct BookmarkStore {
    file: PathBuf,
}

impl BookmarkStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Load the saved bookmark, if any.
    pub fn load(&self) -> Result<Option<Bookmark>> {
        let content = match fs::read_to_string(&self.file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::from_io(e, &self.file)),
        };
        let state: StateFile = serde_json::from_str(&content)?;
        if state.version != STATE_VERSION {
            warn!(file = %self.file.display(), version = state.version, "ignoring bookmark from another version");
            return Ok(None);
        }
        Ok(Some(state.bookmark))
    }

    pub fn save(&self, bookmark: &Bookmark) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        let state = StateFile {
            version: STATE_VERSION,
            bookmark: bookmark.clone(),
        };
        fs::write(&self.file, serde_json::to_string_pretty(&state)?)?;
        Ok(())
    }

    /// Bookmark `path` and save it; called once per root selection.
    pub fn remember(&self, path: &Path) -> Result<Bookmark> {
        let bookmark = Bookmark::create(path)?;
        self.save(&bookmark)?;
        Ok(bookmark)
    }

    /// Resolve the saved bookmark to a directory to open.
    ///
    /// A stale bookmark is re-created and saved when `refresh_stale` is set;
    /// otherwise `StaleCredential` is returned.
    pub fn restore(&self, refresh_stale: bool) -> Result<Option<PathBuf>> {
        let Some(bookmark) = self.load()? else {
            return Ok(None);
        };
        match bookmark.resolve() {
            Ok(path) => Ok(Some(path)),
            Err(AppError::StaleCredential(shown)) if refresh_stale => {
                info!(path = %shown, "refreshing stale bookmark");
                let fresh = self.remember(bookmark.path())?;
                Ok(Some(fresh.path().to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }
}
