//! Tree node store: an id-indexed arena holding the materialized tree.
//!
//! Nodes never reference each other directly. Parents keep an ordered list
//! of child ids and children keep their parent id, so a subtree can be
//! dropped without leaving dangling references behind. Every root selection
//! starts a new generation; commits carrying an older generation are refused.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::error::{AppError, Result};
use crate::fs::access::DirEntryInfo;
use crate::tags::TrackTags;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity. Never reused, even across root selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Root-selection epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Generation(u64);

/// Expansion state of a directory node as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionState {
    #[default]
    Collapsed,
    Expanding,
    Expanded,
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    depth: usize,
    path: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
    modified: Option<SystemTime>,
    tags: Option<TrackTags>,
    children: Option<Vec<NodeId>>,
}

impl Node {
    fn from_entry(entry: DirEntryInfo, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            parent,
            depth,
            path: entry.path,
            name: entry.name,
            is_dir: entry.is_dir,
            size: entry.size,
            modified: entry.modified,
            tags: None,
            children: None,
        }
    }
}

/// Read-only copy of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct FileItem {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub path: PathBuf,
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub key: Option<String>,
    pub bpm: Option<String>,
    /// Enrichment has run for this node (its tags may still be absent).
    pub enriched: bool,
    /// `None` until the node has been expanded.
    pub children: Option<Vec<NodeId>>,
}

/// A visible row of the flattened tree, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatItem {
    pub id: NodeId,
    pub name: String,
    pub depth: usize,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub key: Option<String>,
    pub bpm: Option<String>,
    pub enriched: bool,
    pub children_loaded: bool,
    pub state: ExpansionState,
    pub is_last_sibling: bool,
}

/// Snapshot of the whole visible tree.
#[derive(Debug, Clone, Default)]
pub struct TreeView {
    pub root: Option<NodeId>,
    pub generation: Generation,
    pub rows: Vec<FlatItem>,
}

impl TreeView {
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }
}

/// Owner of every node of the current tree.
#[derive(Debug, Default)]
pub struct TreeStore {
    generation: Generation,
    root: Option<NodeId>,
    nodes: HashMap<NodeId, Node>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Discard the current tree and start a new one at `entry`.
    pub fn set_root(&mut self, entry: DirEntryInfo) -> (NodeId, Generation) {
        self.nodes.clear();
        self.generation = Generation(self.generation.0 + 1);
        let id = NodeId::next();
        self.nodes.insert(id, Node::from_entry(entry, None, 0));
        self.root = Some(id);
        (id, self.generation)
    }

    pub fn get(&self, id: NodeId) -> Result<FileItem> {
        let node = self.node(id)?;
        let (key, bpm) = match &node.tags {
            Some(tags) => (tags.key.clone(), tags.bpm.clone()),
            None => (None, None),
        };
        Ok(FileItem {
            id,
            parent: node.parent,
            path: node.path.clone(),
            name: node.name.clone(),
            is_directory: node.is_dir,
            size: node.size,
            modified: node.modified,
            key,
            bpm,
            enriched: node.tags.is_some(),
            children: node.children.clone(),
        })
    }

    /// Snapshots of `id`'s children, or `None` if it was never expanded.
    pub fn children(&self, id: NodeId) -> Result<Option<Vec<FileItem>>> {
        match &self.node(id)?.children {
            Some(ids) => ids
                .iter()
                .map(|child| self.get(*child))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            None => Ok(None),
        }
    }

    /// Install `entries` as the ordered children of `id`.
    ///
    /// Refused with `NotFound` when `generation` is no longer current or the
    /// node is gone. Any previously materialized children are discarded.
    pub fn commit_children(
        &mut self,
        generation: Generation,
        id: NodeId,
        entries: Vec<DirEntryInfo>,
    ) -> Result<Vec<NodeId>> {
        self.check_generation(generation, id)?;
        let parent = self.node(id)?;
        if !parent.is_dir {
            return Err(AppError::NotADirectory(parent.path.display().to_string()));
        }
        let depth = parent.depth + 1;

        self.discard_children(id)?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = NodeId::next();
            self.nodes.insert(child, Node::from_entry(entry, Some(id), depth));
            ids.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(ids.clone());
        }
        Ok(ids)
    }

    /// Attach tags to a file node.
    ///
    /// Returns `Ok(false)` when the node was already enriched; tags are set
    /// at most once.
    pub fn commit_metadata(
        &mut self,
        generation: Generation,
        id: NodeId,
        tags: TrackTags,
    ) -> Result<bool> {
        self.check_generation(generation, id)?;
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("node {id}")))?;
        if node.is_dir {
            return Err(AppError::InvalidOperation(format!(
                "{} is a directory and carries no tags",
                node.path.display()
            )));
        }
        if node.tags.is_some() {
            return Ok(false);
        }
        node.tags = Some(tags);
        Ok(true)
    }

    /// Drop `id`'s materialized subtree and mark it unexpanded again.
    pub fn discard_children(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("node {id}")))?;
        let mut stack = node.children.take().unwrap_or_default();
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                stack.extend(removed.children.unwrap_or_default());
            }
        }
        Ok(())
    }

    /// Flatten the visible tree depth-first.
    ///
    /// `state_of` reports each directory's expansion state; only `Expanded`
    /// directories contribute their children.
    pub fn flatten<F>(&self, state_of: F) -> TreeView
    where
        F: Fn(NodeId) -> ExpansionState,
    {
        let mut rows = Vec::new();
        if let Some(root) = self.root {
            self.flatten_node(root, true, &state_of, &mut rows);
        }
        TreeView {
            root: self.root,
            generation: self.generation,
            rows,
        }
    }

    fn flatten_node<F>(&self, id: NodeId, is_last: bool, state_of: &F, rows: &mut Vec<FlatItem>)
    where
        F: Fn(NodeId) -> ExpansionState,
    {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let state = if node.is_dir {
            state_of(id)
        } else {
            ExpansionState::Collapsed
        };
        let (key, bpm) = match &node.tags {
            Some(tags) => (tags.key.clone(), tags.bpm.clone()),
            None => (None, None),
        };

        rows.push(FlatItem {
            id,
            name: node.name.clone(),
            depth: node.depth,
            is_directory: node.is_dir,
            size: node.size,
            modified: node.modified,
            key,
            bpm,
            enriched: node.tags.is_some(),
            children_loaded: node.children.is_some(),
            state,
            is_last_sibling: is_last,
        });

        if state == ExpansionState::Expanded {
            if let Some(children) = &node.children {
                for (i, child) in children.iter().enumerate() {
                    self.flatten_node(*child, i + 1 == children.len(), state_of, rows);
                }
            }
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("node {id}")))
    }

    fn check_generation(&self, generation: Generation, id: NodeId) -> Result<()> {
        if generation != self.generation {
            return Err(AppError::NotFound(format!(
                "node {id} belongs to a previous root"
            )));
        }
        Ok(())
    }
}
