//! Filesystem accessor: one-level directory listings with stat data.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{AppError, Result};

/// One directory entry as reported by the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_hidden: bool,
}

impl DirEntryInfo {
    /// Stat `path`, following symlinks where the target exists.
    pub fn from_path(path: &Path) -> Result<Self> {
        // Broken links fall back to the link itself and show up as files.
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(_) => fs::symlink_metadata(path).map_err(|e| AppError::from_io(e, path))?,
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let is_hidden = is_hidden(&name, &metadata);

        Ok(Self {
            path: path.to_path_buf(),
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_hidden,
        })
    }
}

#[cfg(windows)]
fn is_hidden(name: &str, metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    name.starts_with('.') || metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn is_hidden(name: &str, _metadata: &fs::Metadata) -> bool {
    name.starts_with('.')
}

/// Grants access to a path for the duration of one read.
///
/// Sandboxed platforms hand out scoped authorizations for user-picked
/// directories; `start_access` acquires one and `stop_access` gives it back.
pub trait AccessScope: Send + Sync {
    fn start_access(&self, path: &Path) -> Result<()>;
    fn stop_access(&self, path: &Path);
}

/// Scope for platforms without sandboxed access.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unscoped;

impl AccessScope for Unscoped {
    fn start_access(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn stop_access(&self, _path: &Path) {}
}

/// Releases a scope grant when dropped.
struct ScopeGuard<'a> {
    scope: &'a dyn AccessScope,
    path: &'a Path,
}

impl<'a> ScopeGuard<'a> {
    fn acquire(scope: &'a dyn AccessScope, path: &'a Path) -> Result<Self> {
        scope.start_access(path)?;
        Ok(Self { scope, path })
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.scope.stop_access(self.path);
    }
}

/// Lists the immediate children of a directory.
pub trait DirLister: Send + Sync {
    /// Stat a single path.
    fn stat(&self, path: &Path) -> Result<DirEntryInfo>;

    /// List `path`'s direct children, unfiltered and unsorted.
    fn list_children(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;
}

/// [`DirLister`] over the local filesystem.
pub struct LocalFs {
    scope: Box<dyn AccessScope>,
}

impl LocalFs {
    pub fn new() -> Self {
        Self::with_scope(Unscoped)
    }

    pub fn with_scope(scope: impl AccessScope + 'static) -> Self {
        Self {
            scope: Box::new(scope),
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl DirLister for LocalFs {
    fn stat(&self, path: &Path) -> Result<DirEntryInfo> {
        let _guard = ScopeGuard::acquire(self.scope.as_ref(), path)?;
        DirEntryInfo::from_path(path)
    }

    fn list_children(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let _guard = ScopeGuard::acquire(self.scope.as_ref(), path)?;

        let metadata = fs::metadata(path).map_err(|e| AppError::from_io(e, path))?;
        if !metadata.is_dir() {
            return Err(AppError::NotADirectory(path.display().to_string()));
        }

        let entries = fs::read_dir(path).map_err(|e| AppError::from_io(e, path))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(dir = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            match DirEntryInfo::from_path(&entry.path()) {
                Ok(info) => children.push(info),
                Err(e) => {
                    debug!(entry = %entry.path().display(), error = %e, "skipping entry without metadata");
                }
            }
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingScope {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl AccessScope for Arc<CountingScope> {
        fn start_access(&self, _path: &Path) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop_access(&self, _path: &Path) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct DenyingScope;

    impl AccessScope for DenyingScope {
        fn start_access(&self, path: &Path) -> Result<()> {
            Err(AppError::AccessDenied(path.display().to_string()))
        }

        fn stop_access(&self, _path: &Path) {
            panic!("stop_access without a grant");
        }
    }

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("albums")).unwrap();
        fs::write(dir.path().join("intro.mp3"), b"0123456789").unwrap();
        File::create(dir.path().join(".DS_Store")).unwrap();
        dir
    }

    #[test]
    fn lists_immediate_children_only() {
        let dir = setup_test_dir();
        File::create(dir.path().join("albums").join("deep.flac")).unwrap();

        let mut names: Vec<String> = LocalFs::new()
            .list_children(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec![".DS_Store", "albums", "intro.mp3"]);
    }

    #[test]
    fn reports_stat_fields() {
        let dir = setup_test_dir();
        let children = LocalFs::new().list_children(dir.path()).unwrap();

        let song = children.iter().find(|e| e.name == "intro.mp3").unwrap();
        assert!(!song.is_dir);
        assert_eq!(song.size, 10);
        assert!(song.modified.is_some());
        assert!(!song.is_hidden);

        let albums = children.iter().find(|e| e.name == "albums").unwrap();
        assert!(albums.is_dir);

        let hidden = children.iter().find(|e| e.name == ".DS_Store").unwrap();
        assert!(hidden.is_hidden);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = LocalFs::new()
            .list_children(&dir.path().join("vanished"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn listing_a_file_is_not_a_directory() {
        let dir = setup_test_dir();
        let err = LocalFs::new()
            .list_children(&dir.path().join("intro.mp3"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotADirectory(_)));
    }

    #[test]
    fn stat_reads_single_path() {
        let dir = setup_test_dir();
        let info = LocalFs::new().stat(&dir.path().join("albums")).unwrap();
        assert!(info.is_dir);
        assert_eq!(info.name, "albums");
    }

    #[test]
    fn scope_is_released_after_success_and_failure() {
        let dir = setup_test_dir();
        let scope = Arc::new(CountingScope::default());
        let lister = LocalFs::with_scope(scope.clone());

        lister.list_children(dir.path()).unwrap();
        lister
            .list_children(&dir.path().join("missing"))
            .unwrap_err();

        assert_eq!(scope.started.load(Ordering::SeqCst), 2);
        assert_eq!(scope.stopped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn denied_scope_surfaces_access_denied() {
        let dir = setup_test_dir();
        let err = LocalFs::with_scope(DenyingScope)
            .list_children(dir.path())
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_counts_as_directory() {
        let dir = setup_test_dir();
        std::os::unix::fs::symlink(dir.path().join("albums"), dir.path().join("link")).unwrap();
        let info = LocalFs::new().stat(&dir.path().join("link")).unwrap();
        assert!(info.is_dir);
    }
}
