//! Lazy expansion controller.
//!
//! Drives `Collapsed -> Expanding -> Expanded` per directory node, lists the
//! filesystem off the async threads, commits children into the shared
//! [`TreeStore`] and fans out one enrichment task per audio file. Enrichment
//! results travel back over a channel to a single task that owns all tag
//! writes, so the store only ever sees whole commits.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::fs::access::DirLister;
use crate::fs::policy::ListingPolicy;
use crate::fs::tree::{ExpansionState, FileItem, Generation, NodeId, TreeStore, TreeView};
use crate::tags::{TagReader, TrackTags};

/// Tunables for expansion and enrichment.
#[derive(Debug, Clone)]
pub struct ExpanderSettings {
    pub policy: ListingPolicy,
    /// Most children materialized by one expansion.
    pub child_limit: usize,
    /// Whether audio files get key/BPM enrichment at all.
    pub enrich: bool,
    pub read_timeout: Duration,
    pub max_concurrent_reads: usize,
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self {
            policy: ListingPolicy::default(),
            child_limit: crate::config::DEFAULT_CHILD_LIMIT,
            enrich: true,
            read_timeout: Duration::from_millis(crate::config::DEFAULT_READ_TIMEOUT_MS),
            max_concurrent_reads: crate::config::DEFAULT_MAX_CONCURRENT_READS,
        }
    }
}

impl ExpanderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy: ListingPolicy::new(config.extensions(), config.show_hidden()),
            child_limit: config.child_limit(),
            enrich: config.metadata_enabled(),
            read_timeout: Duration::from_millis(config.read_timeout_ms()),
            max_concurrent_reads: config.max_concurrent_reads(),
        }
    }
}

/// Outcome of an `expand` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// The node is expanded; these are its children in display order.
    Ready(Vec<FileItem>),
    /// Another expansion of the same node is running.
    InProgress,
    /// The tree was replaced while listing; the result was thrown away.
    Discarded,
}

/// Tag read result addressed to one node of one generation.
#[derive(Debug)]
struct Enrichment {
    generation: Generation,
    id: NodeId,
    tags: TrackTags,
}

/// State reachable from the enrichment sink task.
struct Shared {
    store: Mutex<TreeStore>,
    changes: watch::Sender<u64>,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn bump(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    fn settle_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct Inner {
    lister: Arc<dyn DirLister>,
    reader: Arc<dyn TagReader>,
    settings: RwLock<ExpanderSettings>,
    states: Mutex<HashMap<NodeId, ExpansionState>>,
    read_permits: Arc<Semaphore>,
    enrich_tx: mpsc::UnboundedSender<Enrichment>,
}

/// Handle to the expansion controller. Cheap to clone.
#[derive(Clone)]
pub struct Expander {
    inner: Arc<Inner>,
    shared: Arc<Shared>,
}

impl Expander {
    /// Create a controller with an empty tree.
    ///
    /// Must be called from within a Tokio runtime: the enrichment sink is
    /// spawned here.
    pub fn new(
        lister: Arc<dyn DirLister>,
        reader: Arc<dyn TagReader>,
        settings: ExpanderSettings,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            store: Mutex::new(TreeStore::new()),
            changes,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let (enrich_tx, enrich_rx) = mpsc::unbounded_channel();
        tokio::spawn(apply_enrichments(shared.clone(), enrich_rx));

        let read_permits = Arc::new(Semaphore::new(settings.max_concurrent_reads.max(1)));
        let inner = Arc::new(Inner {
            lister,
            reader,
            settings: RwLock::new(settings),
            states: Mutex::new(HashMap::new()),
            read_permits,
            enrich_tx,
        });

        Self { inner, shared }
    }

    /// Replace the whole tree with a fresh, unexpanded root at `path`.
    ///
    /// Every in-flight expansion or enrichment of the previous tree will be
    /// discarded when it completes.
    pub async fn select_root(&self, path: &Path) -> Result<NodeId> {
        let lister = self.inner.lister.clone();
        let target = path.to_path_buf();
        let entry = tokio::task::spawn_blocking(move || lister.stat(&target))
            .await
            .map_err(join_error)??;
        if !entry.is_dir {
            return Err(AppError::NotADirectory(path.display().to_string()));
        }

        let (id, generation) = {
            let mut states = self.inner.states.lock();
            let mut store = self.shared.store.lock();
            states.clear();
            store.set_root(entry)
        };
        info!(root = %path.display(), ?generation, "selected root");
        self.shared.bump();
        Ok(id)
    }

    /// Re-select the current root, e.g. after the listing policy changed.
    pub async fn reload_root(&self) -> Result<Option<NodeId>> {
        let path = {
            let store = self.shared.store.lock();
            match store.root() {
                Some(root) => store.get(root)?.path,
                None => return Ok(None),
            }
        };
        self.select_root(&path).await.map(Some)
    }

    /// Materialize `id`'s children.
    pub async fn expand(&self, id: NodeId) -> Result<Expansion> {
        let item = self.shared.store.lock().get(id)?;
        if !item.is_directory {
            return Err(AppError::InvalidOperation(format!(
                "cannot expand file {}",
                item.path.display()
            )));
        }

        let generation = {
            let mut states = self.inner.states.lock();
            let store = self.shared.store.lock();
            if !store.contains(id) {
                return Err(AppError::NotFound(format!("node {id}")));
            }
            match states.get(&id).copied().unwrap_or_default() {
                ExpansionState::Expanding => return Ok(Expansion::InProgress),
                ExpansionState::Expanded => {
                    return Ok(Expansion::Ready(store.children(id)?.unwrap_or_default()));
                }
                ExpansionState::Collapsed => {
                    if let Some(children) = store.children(id)? {
                        states.insert(id, ExpansionState::Expanded);
                        drop(store);
                        drop(states);
                        self.shared.bump();
                        return Ok(Expansion::Ready(children));
                    }
                }
            }
            states.insert(id, ExpansionState::Expanding);
            store.generation()
        };
        self.shared.bump();

        let lister = self.inner.lister.clone();
        let path = item.path.clone();
        let listing = tokio::task::spawn_blocking(move || lister.list_children(&path))
            .await
            .map_err(join_error)
            .and_then(|listed| listed);
        let entries = match listing {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %item.path.display(), error = %err, "expansion failed");
                self.finish(id, generation, ExpansionState::Collapsed);
                return Err(err);
            }
        };

        let (policy, limit, enrich, read_timeout) = {
            let settings = self.inner.settings.read();
            (
                settings.policy.clone(),
                settings.child_limit,
                settings.enrich,
                settings.read_timeout,
            )
        };
        let mut entries = policy.apply(entries);
        if entries.len() > limit {
            debug!(
                dir = %item.path.display(),
                dropped = entries.len() - limit,
                "child limit reached"
            );
            entries.truncate(limit);
        }

        let committed = {
            let mut store = self.shared.store.lock();
            store
                .commit_children(generation, id, entries)
                .and_then(|_| store.children(id))
        };
        let children = match committed {
            Ok(children) => children.unwrap_or_default(),
            Err(err) if err.is_not_found() => {
                debug!(dir = %item.path.display(), "tree replaced during expansion; discarding");
                self.finish(id, generation, ExpansionState::Collapsed);
                return Ok(Expansion::Discarded);
            }
            Err(err) => {
                self.finish(id, generation, ExpansionState::Collapsed);
                return Err(err);
            }
        };

        if enrich {
            for child in children.iter().filter(|c| !c.is_directory) {
                self.spawn_enrichment(generation, child.id, child.path.clone(), read_timeout);
            }
        }

        self.finish(id, generation, ExpansionState::Expanded);
        Ok(Expansion::Ready(children))
    }

    /// Hide an expanded node's children. Materialized children are kept.
    pub fn collapse(&self, id: NodeId) -> Result<()> {
        let mut states = self.inner.states.lock();
        if !self.shared.store.lock().contains(id) {
            return Err(AppError::NotFound(format!("node {id}")));
        }
        if states.get(&id) == Some(&ExpansionState::Expanded) {
            states.remove(&id);
            drop(states);
            self.shared.bump();
        }
        Ok(())
    }

    /// Throw away `id`'s materialized subtree and list it again.
    pub async fn refresh(&self, id: NodeId) -> Result<Expansion> {
        {
            let mut states = self.inner.states.lock();
            let mut store = self.shared.store.lock();
            let item = store.get(id)?;
            if !item.is_directory {
                return Err(AppError::InvalidOperation(format!(
                    "cannot refresh file {}",
                    item.path.display()
                )));
            }
            if states.get(&id) == Some(&ExpansionState::Expanding) {
                return Ok(Expansion::InProgress);
            }
            store.discard_children(id)?;
            states.remove(&id);
            states.retain(|node, _| store.contains(*node));
        }
        self.shared.bump();
        self.expand(id).await
    }

    /// Toggle hidden entries and rebuild the tree under the new policy.
    pub async fn set_show_hidden(&self, show_hidden: bool) -> Result<Option<NodeId>> {
        self.inner.settings.write().policy.show_hidden = show_hidden;
        self.reload_root().await
    }

    pub fn show_hidden(&self) -> bool {
        self.inner.settings.read().policy.show_hidden
    }

    pub fn root(&self) -> Option<NodeId> {
        self.shared.store.lock().root()
    }

    pub fn generation(&self) -> Generation {
        self.shared.store.lock().generation()
    }

    pub fn get(&self, id: NodeId) -> Result<FileItem> {
        self.shared.store.lock().get(id)
    }

    pub fn children(&self, id: NodeId) -> Result<Option<Vec<FileItem>>> {
        self.shared.store.lock().children(id)
    }

    pub fn node_count(&self) -> usize {
        self.shared.store.lock().len()
    }

    pub fn expansion_state(&self, id: NodeId) -> ExpansionState {
        self.inner
            .states
            .lock()
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    /// Render-ready snapshot of the visible tree.
    pub fn snapshot(&self) -> TreeView {
        let states = self.inner.states.lock();
        let store = self.shared.store.lock();
        store.flatten(|id| states.get(&id).copied().unwrap_or_default())
    }

    /// Change counter, bumped after every commit or state transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Enrichments spawned but not yet applied or discarded.
    pub fn pending_enrichments(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Wait until every spawned enrichment has been applied or discarded.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Leave the `Expanding` state, unless the tree moved on meanwhile.
    fn finish(&self, id: NodeId, generation: Generation, state: ExpansionState) {
        {
            let mut states = self.inner.states.lock();
            if self.shared.store.lock().generation() != generation {
                return;
            }
            match state {
                ExpansionState::Collapsed => states.remove(&id),
                other => states.insert(id, other),
            };
        }
        self.shared.bump();
    }

    fn spawn_enrichment(
        &self,
        generation: Generation,
        id: NodeId,
        path: PathBuf,
        read_timeout: Duration,
    ) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let reader = self.inner.reader.clone();
        let permits = self.inner.read_permits.clone();
        let tx = self.inner.enrich_tx.clone();
        let shared = self.shared.clone();

        tokio::spawn(async move {
            let tags = read_tags_bounded(reader, permits, path, read_timeout).await;
            if tx.send(Enrichment { generation, id, tags }).is_err() {
                shared.settle_one();
            }
        });
    }
}

/// Read tags on the blocking pool, capped by the shared semaphore and a timeout.
///
/// The permit travels with the blocking read, so a read that outlives its
/// timeout still counts against the limit until it returns.
async fn read_tags_bounded(
    reader: Arc<dyn TagReader>,
    permits: Arc<Semaphore>,
    path: PathBuf,
    read_timeout: Duration,
) -> TrackTags {
    let Ok(permit) = permits.acquire_owned().await else {
        return TrackTags::absent();
    };
    let shown = path.display().to_string();
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        reader.read_tags(&path)
    });
    match tokio::time::timeout(read_timeout, task).await {
        Ok(Ok(tags)) => tags,
        Ok(Err(err)) => {
            warn!(file = %shown, error = %err, "tag reader failed");
            TrackTags::absent()
        }
        Err(_) => {
            debug!(file = %shown, "tag read timed out");
            TrackTags::absent()
        }
    }
}

/// Single writer for enrichment results.
async fn apply_enrichments(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Enrichment>) {
    while let Some(msg) = rx.recv().await {
        let applied = shared
            .store
            .lock()
            .commit_metadata(msg.generation, msg.id, msg.tags);
        match applied {
            Ok(true) => shared.bump(),
            Ok(false) => {}
            Err(err) if err.is_not_found() => {
                debug!(node = %msg.id, "dropping tags for a node of a previous tree");
            }
            Err(err) => warn!(node = %msg.id, error = %err, "could not store tags"),
        }
        shared.settle_one();
    }
}

fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::Io(io::Error::other(err))
}
