use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use tagtree::app::App;
use tagtree::config::{AppConfig, GeneralConfig, LogConfig, TreeConfig};
use tagtree::error::{self, AppError};
use tagtree::event::{Event, EventHandler};
use tagtree::fs::access::LocalFs;
use tagtree::fs::bookmark::BookmarkStore;
use tagtree::fs::expander::{Expander, ExpanderSettings};
use tagtree::tags::NoTags;
use tagtree::tui::{install_panic_hook, Tui};
use tagtree::{handler, logging, ui};

/// Browse a music library as a lazily loaded tree with key and BPM columns.
#[derive(Parser, Debug)]
#[command(name = "tagtree", version, about)]
struct Cli {
    /// Root directory (defaults to the last opened one, then the current directory)
    path: Option<PathBuf>,

    /// Path to a config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show hidden files
    #[arg(long)]
    show_hidden: bool,

    /// Most children loaded per directory
    #[arg(long)]
    child_limit: Option<usize>,

    /// Neither read nor write the last-directory bookmark
    #[arg(long)]
    no_bookmark: bool,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Flags that override config file values.
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                show_hidden: self.show_hidden.then_some(true),
                ..Default::default()
            },
            tree: TreeConfig {
                child_limit: self.child_limit,
                ..Default::default()
            },
            log: LogConfig {
                file: self
                    .log_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Pick the starting root: CLI path, saved bookmark, configured default,
/// then the current directory. Also returns a notice worth showing.
fn resolve_root(
    cli_path: Option<&Path>,
    bookmarks: Option<&BookmarkStore>,
    refresh_stale: bool,
    default_path: Option<&str>,
) -> error::Result<(PathBuf, Option<String>)> {
    if let Some(path) = cli_path {
        let path = path.canonicalize().map_err(|_| {
            AppError::InvalidPath(format!("{} does not exist", path.display()))
        })?;
        return Ok((path, None));
    }

    let mut notice = None;
    if let Some(store) = bookmarks {
        match store.restore(refresh_stale) {
            Ok(Some(path)) => return Ok((path, None)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "ignoring saved bookmark");
                notice = Some(e.to_string());
            }
        }
    }

    if let Some(default) = default_path {
        match Path::new(default).canonicalize() {
            Ok(path) if path.is_dir() => return Ok((path, notice)),
            _ => warn!(path = default, "configured default path is not a directory"),
        }
    }

    Ok((std::env::current_dir()?, notice))
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));

    let _log_guard = match config.log_file() {
        Some(file) => Some(logging::init(Path::new(file), config.log_level())?),
        None => None,
    };

    let bookmarks = if config.bookmark_enabled() && !cli.no_bookmark {
        config.bookmark_state_file().map(BookmarkStore::new)
    } else {
        None
    };
    let (root, notice) = resolve_root(
        cli.path.as_deref(),
        bookmarks.as_ref(),
        config.refresh_stale_bookmark(),
        config.default_path(),
    )?;
    info!(root = %root.display(), "starting");

    install_panic_hook();

    let mut tui = Tui::new()?;
    let mut events = EventHandler::new(Duration::from_millis(100));
    let expander = Expander::new(
        Arc::new(LocalFs::new()),
        Arc::new(NoTags),
        ExpanderSettings::from_config(&config),
    );
    let mut app = App::new(expander, events.sender(), bookmarks);
    app.select_root(root);
    if let Some(notice) = notice {
        app.set_status_message(notice, true);
    }

    loop {
        app.sync_view();
        app.clear_expired_status();
        tui.terminal_mut().draw(|frame| {
            ui::render(&mut app, frame);
        })?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(&mut app, key),
            Event::Tick | Event::Resize(_, _) => {}
            other => app.handle_event(other),
        }

        if app.should_quit {
            break;
        }
    }

    tui.restore()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cli_path_wins() {
        let dir = TempDir::new().unwrap();
        let (root, notice) = resolve_root(Some(dir.path()), None, true, None).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
        assert!(notice.is_none());
    }

    #[test]
    fn missing_cli_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            resolve_root(Some(&missing), None, true, None),
            Err(AppError::InvalidPath(_))
        ));
    }

    #[test]
    fn bookmark_before_default_path() {
        let state = TempDir::new().unwrap();
        let saved = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        let store = BookmarkStore::new(state.path().join("bookmark.json"));
        store.remember(saved.path()).unwrap();

        let default = fallback.path().to_string_lossy().to_string();
        let (root, _) = resolve_root(None, Some(&store), true, Some(&default)).unwrap();
        assert_eq!(root, saved.path().canonicalize().unwrap());
    }

    #[test]
    fn broken_bookmark_falls_back_with_notice() {
        let state = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        let store = BookmarkStore::new(state.path().join("bookmark.json"));
        let gone = fallback.path().join("gone");
        std::fs::create_dir(&gone).unwrap();
        store.remember(&gone).unwrap();
        std::fs::remove_dir(&gone).unwrap();

        let default = fallback.path().to_string_lossy().to_string();
        let (root, notice) = resolve_root(None, Some(&store), true, Some(&default)).unwrap();
        assert_eq!(root, fallback.path().canonicalize().unwrap());
        assert!(notice.unwrap().starts_with("Not found"));
    }

    #[test]
    fn cli_flags_become_overrides() {
        let cli = Cli::parse_from(["tagtree", "--show-hidden", "--child-limit", "7"]);
        let config = AppConfig::default().merge(&cli.overrides());
        assert!(config.show_hidden());
        assert_eq!(config.child_limit(), 7);
        assert!(cli.path.is_none());
    }
}
