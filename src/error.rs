use std::io;
use std::path::Path;

use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors that don't map onto a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// The log subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The path exists but may not be read.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The path or node no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A directory operation was attempted on a non-directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The operation makes no sense for the target (e.g. expanding a file).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A saved bookmark no longer points at the directory it was made for.
    #[error("Stale bookmark for {0}; it needs to be refreshed")]
    StaleCredential(String),

    /// Config file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Bookmark state could not be encoded or decoded.
    #[error("State file error: {0}")]
    Persist(#[from] serde_json::Error),
}

impl AppError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let shown = path.display().to_string();
        match err.kind() {
            io::ErrorKind::PermissionDenied => AppError::AccessDenied(shown),
            io::ErrorKind::NotFound => AppError::NotFound(shown),
            _ => AppError::Io(err),
        }
    }

    /// Whether the error is the expected "node vanished" outcome of a root reset.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}
