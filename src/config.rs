//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--show-hidden`, `--child-limit`, etc.)
//! 2. `$TAGTREE_CONFIG` environment variable (path to config file)
//! 3. Project-local `.tagtree.toml` in the current working directory
//! 4. Global `~/.config/tagtree/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::fs::policy::DEFAULT_AUDIO_EXTENSIONS;

// ── Section configs ──────────────────────────────────────────────────────────

/// General application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Starting directory when neither the CLI nor a bookmark names one.
    pub default_path: Option<String>,
    /// Show hidden files by default.
    pub show_hidden: Option<bool>,
}

/// Tree materialization settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Most children materialized per expansion.
    pub child_limit: Option<usize>,
    /// File extensions shown in the tree (directories are always shown).
    pub extensions: Option<Vec<String>>,
}

/// Key/BPM enrichment settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: Option<bool>,
    /// Per-file tag read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Tag reads allowed to run at once.
    pub max_concurrent_reads: Option<usize>,
}

/// Last-directory bookmark settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BookmarkConfig {
    pub enabled: Option<bool>,
    /// Re-create a stale bookmark instead of reporting it.
    pub refresh_stale: Option<bool>,
    /// State file location (defaults to the user data directory).
    pub state_file: Option<String>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path; no logging when unset.
    pub file: Option<String>,
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tree: TreeConfig,
    pub metadata: MetadataConfig,
    pub bookmark: BookmarkConfig,
    pub log: LogConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default cap on children per expansion.
pub const DEFAULT_CHILD_LIMIT: usize = 100;
/// Default per-file tag read timeout.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
/// Default number of concurrent tag reads.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 8;
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that one is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("TAGTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".tagtree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("tagtree").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning logged).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to parse config file");
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`: `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: other
                    .general
                    .default_path
                    .clone()
                    .or(self.general.default_path),
                show_hidden: other.general.show_hidden.or(self.general.show_hidden),
            },
            tree: TreeConfig {
                child_limit: other.tree.child_limit.or(self.tree.child_limit),
                extensions: other.tree.extensions.clone().or(self.tree.extensions),
            },
            metadata: MetadataConfig {
                enabled: other.metadata.enabled.or(self.metadata.enabled),
                read_timeout_ms: other
                    .metadata
                    .read_timeout_ms
                    .or(self.metadata.read_timeout_ms),
                max_concurrent_reads: other
                    .metadata
                    .max_concurrent_reads
                    .or(self.metadata.max_concurrent_reads),
            },
            bookmark: BookmarkConfig {
                enabled: other.bookmark.enabled.or(self.bookmark.enabled),
                refresh_stale: other.bookmark.refresh_stale.or(self.bookmark.refresh_stale),
                state_file: other
                    .bookmark
                    .state_file
                    .clone()
                    .or(self.bookmark.state_file),
            },
            log: LogConfig {
                file: other.log.file.clone().or(self.log.file),
                level: other.log.level.clone().or(self.log.level),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so that higher-priority files overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn default_path(&self) -> Option<&str> {
        self.general.default_path.as_deref()
    }

    pub fn show_hidden(&self) -> bool {
        self.general.show_hidden.unwrap_or(false)
    }

    /// Child cap per expansion; never below one.
    pub fn child_limit(&self) -> usize {
        self.tree.child_limit.unwrap_or(DEFAULT_CHILD_LIMIT).max(1)
    }

    /// Allowed file extensions.
    pub fn extensions(&self) -> Vec<String> {
        match &self.tree.extensions {
            Some(list) => list.clone(),
            None => DEFAULT_AUDIO_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn metadata_enabled(&self) -> bool {
        self.metadata.enabled.unwrap_or(true)
    }

    pub fn read_timeout_ms(&self) -> u64 {
        self.metadata
            .read_timeout_ms
            .unwrap_or(DEFAULT_READ_TIMEOUT_MS)
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.metadata
            .max_concurrent_reads
            .unwrap_or(DEFAULT_MAX_CONCURRENT_READS)
            .max(1)
    }

    pub fn bookmark_enabled(&self) -> bool {
        self.bookmark.enabled.unwrap_or(true)
    }

    pub fn refresh_stale_bookmark(&self) -> bool {
        self.bookmark.refresh_stale.unwrap_or(true)
    }

    /// Bookmark state file, or `None` if no data directory is known.
    pub fn bookmark_state_file(&self) -> Option<PathBuf> {
        match &self.bookmark.state_file {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::data_dir().map(|d| d.join("tagtree").join("bookmark.json")),
        }
    }

    pub fn log_file(&self) -> Option<&str> {
        self.log.file.as_deref()
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.default_path(), None);
        assert_eq!(cfg.show_hidden(), false);
        assert_eq!(cfg.child_limit(), 100);
        assert_eq!(
            cfg.extensions(),
            vec!["mp3", "wav", "aiff", "flac", "aac", "m4a", "ogg"]
        );
        assert_eq!(cfg.metadata_enabled(), true);
        assert_eq!(cfg.read_timeout_ms(), 5_000);
        assert_eq!(cfg.max_concurrent_reads(), 8);
        assert_eq!(cfg.bookmark_enabled(), true);
        assert_eq!(cfg.refresh_stale_bookmark(), true);
        assert_eq!(cfg.log_file(), None);
        assert_eq!(cfg.log_level(), "info");
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[general]
default_path = "/srv/music"
show_hidden = true

[tree]
child_limit = 250
extensions = ["flac", "opus"]

[metadata]
enabled = false
read_timeout_ms = 750
max_concurrent_reads = 2

[bookmark]
enabled = false
refresh_stale = false
state_file = "/tmp/tagtree-state.json"

[log]
file = "/tmp/tagtree.log"
level = "debug"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.default_path(), Some("/srv/music"));
        assert_eq!(cfg.show_hidden(), true);
        assert_eq!(cfg.child_limit(), 250);
        assert_eq!(cfg.extensions(), vec!["flac", "opus"]);
        assert_eq!(cfg.metadata_enabled(), false);
        assert_eq!(cfg.read_timeout_ms(), 750);
        assert_eq!(cfg.max_concurrent_reads(), 2);
        assert_eq!(cfg.bookmark_enabled(), false);
        assert_eq!(cfg.refresh_stale_bookmark(), false);
        assert_eq!(
            cfg.bookmark_state_file(),
            Some(PathBuf::from("/tmp/tagtree-state.json"))
        );
        assert_eq!(cfg.log_file(), Some("/tmp/tagtree.log"));
        assert_eq!(cfg.log_level(), "debug");
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[tree]
child_limit = 20
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.child_limit(), 20);
        // Everything else should be defaults
        assert_eq!(cfg.show_hidden(), false);
        assert_eq!(cfg.read_timeout_ms(), 5_000);
        assert_eq!(cfg.extensions().len(), 7);
    }

    #[test]
    fn test_toml_parsing_empty() {
        let cfg: AppConfig = toml::from_str("").expect("parse failed");
        assert_eq!(cfg.child_limit(), 100);
        assert_eq!(cfg.metadata_enabled(), true);
    }

    #[test]
    fn test_zero_limits_are_clamped() {
        let toml = r#"
[tree]
child_limit = 0

[metadata]
max_concurrent_reads = 0
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.child_limit(), 1);
        assert_eq!(cfg.max_concurrent_reads(), 1);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            general: GeneralConfig {
                show_hidden: Some(false),
                default_path: Some("/music".into()),
            },
            tree: TreeConfig {
                child_limit: Some(50),
                extensions: Some(vec!["mp3".into()]),
            },
            ..Default::default()
        };

        let over = AppConfig {
            general: GeneralConfig {
                show_hidden: Some(true),
                // default_path not set, keeps base
                ..Default::default()
            },
            tree: TreeConfig {
                child_limit: Some(500),
                // extensions not set, keeps base
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.show_hidden(), true); // overridden
        assert_eq!(merged.default_path(), Some("/music")); // from base
        assert_eq!(merged.child_limit(), 500); // overridden
        assert_eq!(merged.extensions(), vec!["mp3"]); // from base
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            metadata: MetadataConfig {
                enabled: Some(false),
                read_timeout_ms: Some(100),
                max_concurrent_reads: None,
            },
            ..Default::default()
        };
        let over = AppConfig::default(); // all None

        let merged = base.merge(&over);
        assert_eq!(merged.metadata_enabled(), false);
        assert_eq!(merged.read_timeout_ms(), 100);
        assert_eq!(merged.max_concurrent_reads(), 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[general]
show_hidden = true

[bookmark]
refresh_stale = false
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.show_hidden(), true);
        assert_eq!(cfg.refresh_stale_bookmark(), false);
        // Unset fields fall through to defaults
        assert_eq!(cfg.child_limit(), 100);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[general]
show_hidden = true

[tree]
child_limit = 75
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            tree: TreeConfig {
                child_limit: Some(10),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        // CLI override wins
        assert_eq!(cfg.child_limit(), 10);
        // File value preserved (not overridden by CLI)
        assert_eq!(cfg.show_hidden(), true);
    }
}
