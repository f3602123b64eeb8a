use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::Event;
use crate::fs::bookmark::BookmarkStore;
use crate::fs::expander::{Expander, Expansion};
use crate::fs::tree::{ExpansionState, FlatItem, TreeView};

/// How long a status message stays on screen.
const STATUS_TTL_SECS: u64 = 3;

/// Main application state.
pub struct App {
    pub expander: Expander,
    pub view: TreeView,
    pub selected_index: usize,
    pub scroll_offset: usize,
    pub should_quit: bool,
    /// Message, whether it is an error, and when it was set.
    pub status_message: Option<(String, bool, Instant)>,
    changes: watch::Receiver<u64>,
    events: mpsc::UnboundedSender<Event>,
    bookmarks: Option<BookmarkStore>,
}

impl App {
    pub fn new(
        expander: Expander,
        events: mpsc::UnboundedSender<Event>,
        bookmarks: Option<BookmarkStore>,
    ) -> Self {
        let changes = expander.subscribe();
        let view = expander.snapshot();
        Self {
            expander,
            view,
            selected_index: 0,
            scroll_offset: 0,
            should_quit: false,
            status_message: None,
            changes,
            events,
            bookmarks,
        }
    }

    /// Rebuild the visible rows if the tree changed since the last call.
    pub fn sync_view(&mut self) {
        if self.changes.has_changed().unwrap_or(false) {
            self.changes.borrow_and_update();
            self.rebuild_view();
        }
    }

    /// Take a fresh snapshot, keeping the selection on the same node.
    pub fn rebuild_view(&mut self) {
        let selected_id = self.selected().map(|item| item.id);
        self.view = self.expander.snapshot();
        self.selected_index = selected_id
            .and_then(|id| self.view.index_of(id))
            .unwrap_or_else(|| self.selected_index.min(self.view.rows.len().saturating_sub(1)));
    }

    pub fn selected(&self) -> Option<&FlatItem> {
        self.view.rows.get(self.selected_index)
    }

    /// Path of the current root, if one is selected.
    pub fn root_path(&self) -> Option<PathBuf> {
        let root = self.view.root?;
        self.expander.get(root).ok().map(|item| item.path)
    }

    /// Path of the root the expander holds now, which may be newer than the view.
    fn current_root_path(&self) -> Option<PathBuf> {
        let root = self.expander.root()?;
        self.expander.get(root).ok().map(|item| item.path)
    }

    /// Path of the selected row.
    pub fn selected_path(&self) -> Option<PathBuf> {
        let id = self.selected()?.id;
        self.expander.get(id).ok().map(|item| item.path)
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::OperationFailed(message) => self.set_status_message(message, true),
            Event::RootSelected(path) => {
                // A slower selection may report after a newer one replaced it.
                if self.current_root_path().as_deref() != Some(path.as_path()) {
                    debug!(root = %path.display(), "ignoring report for a replaced root");
                    return;
                }
                self.selected_index = 0;
                self.scroll_offset = 0;
                self.rebuild_view();
                if let Some(store) = &self.bookmarks {
                    if let Err(e) = store.remember(&path) {
                        warn!(path = %path.display(), error = %e, "could not save bookmark");
                    }
                }
                self.set_status_message(format!("Opened {}", path.display()), false);
            }
            Event::Key(_) | Event::Tick | Event::Resize(_, _) => {}
        }
    }

    /// Set a status message with current timestamp.
    pub fn set_status_message(&mut self, msg: String, is_error: bool) {
        self.status_message = Some((msg, is_error, Instant::now()));
    }

    /// Clear the status message once it has been displayed long enough.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, _, ref created)) = self.status_message {
            if created.elapsed().as_secs() > STATUS_TTL_SECS {
                self.status_message = None;
            }
        }
    }

    /// Quit the application.
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Move selection down by one item.
    pub fn select_next(&mut self) {
        let len = self.view.rows.len();
        if len > 0 && self.selected_index < len - 1 {
            self.selected_index += 1;
        }
    }

    /// Move selection up by one item.
    pub fn select_previous(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        }
    }

    /// Jump to the first item.
    pub fn select_first(&mut self) {
        self.selected_index = 0;
    }

    /// Jump to the last item.
    pub fn select_last(&mut self) {
        self.selected_index = self.view.rows.len().saturating_sub(1);
    }

    /// Update the scroll offset to keep the selected row visible.
    pub fn update_scroll(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected_index - visible_height + 1;
        }
    }

    /// Expand the selected directory in the background (no-op on files).
    pub fn expand_selected(&mut self) -> Option<JoinHandle<()>> {
        let item = self.selected()?;
        if !item.is_directory {
            return None;
        }
        let id = item.id;
        let expander = self.expander.clone();
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = expander.expand(id).await {
                let _ = events.send(Event::OperationFailed(e.to_string()));
            }
        }))
    }

    /// Collapse the selected directory, or jump to its parent row.
    pub fn collapse_selected(&mut self) {
        let Some(item) = self.selected() else {
            return;
        };
        let id = item.id;
        if item.is_directory && item.state == ExpansionState::Expanded {
            if let Err(e) = self.expander.collapse(id) {
                self.set_status_message(e.to_string(), true);
            }
            self.rebuild_view();
            return;
        }

        let parent = self.expander.get(id).ok().and_then(|node| node.parent);
        if let Some(index) = parent.and_then(|p| self.view.index_of(p)) {
            self.selected_index = index;
        }
    }

    /// Re-list the selected directory, or the directory holding the selected file.
    pub fn refresh_selected(&mut self) -> Option<JoinHandle<()>> {
        let id = self.selected()?.id;
        let node = self.expander.get(id).ok()?;
        let target = if node.is_directory { id } else { node.parent? };
        let expander = self.expander.clone();
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = expander.refresh(target).await {
                let _ = events.send(Event::OperationFailed(e.to_string()));
            }
        }))
    }

    /// Make the selected directory the new root.
    pub fn reroot_selected(&mut self) -> Option<JoinHandle<()>> {
        if !self.selected()?.is_directory {
            return None;
        }
        let path = self.selected_path()?;
        Some(self.select_root(path))
    }

    /// Make the parent of the current root the new root.
    pub fn reroot_parent(&mut self) -> Option<JoinHandle<()>> {
        let parent = self.root_path()?.parent()?.to_path_buf();
        Some(self.select_root(parent))
    }

    /// Toggle hidden entries; the tree is rebuilt from the root.
    pub fn toggle_hidden(&mut self) -> JoinHandle<()> {
        let expander = self.expander.clone();
        let events = self.events.clone();
        let show = !expander.show_hidden();
        tokio::spawn(async move {
            match expander.set_show_hidden(show).await {
                Ok(Some(root)) => {
                    if let Err(e) = expander.expand(root).await {
                        let _ = events.send(Event::OperationFailed(e.to_string()));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = events.send(Event::OperationFailed(e.to_string()));
                }
            }
        })
    }

    /// Select `path` as root and expand it, reporting back through events.
    pub fn select_root(&self, path: PathBuf) -> JoinHandle<()> {
        let expander = self.expander.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let root = match expander.select_root(&path).await {
                Ok(root) => root,
                Err(e) => {
                    let _ = events.send(Event::OperationFailed(e.to_string()));
                    return;
                }
            };
            match expander.expand(root).await {
                Ok(Expansion::Ready(_)) => {
                    let _ = events.send(Event::RootSelected(path));
                }
                Ok(_) => debug!(root = %path.display(), "root replaced before it was listed"),
                Err(e) if e.is_not_found() && expander.root() != Some(root) => {
                    debug!(root = %path.display(), "root replaced before it was listed");
                }
                Err(e) => {
                    let _ = events.send(Event::OperationFailed(e.to_string()));
                }
            }
        })
    }
}
