//! Path tree builder
//!
//! Turns the flat record list of a recursive tree listing into a forest of
//! [`TreeNode`]s. Pure: no I/O, no state, nothing cached between calls.
//!
//! Records are processed in (depth, path) order so a parent folder is always
//! materialized before any child is attached to it. The result therefore does
//! not depend on the order of the input.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Kind of a record in a remote tree listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule commits and anything else the provider may return
    #[serde(other)]
    Other,
}

/// One record of a recursive tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Blob,
        }
    }

    pub fn tree(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Tree,
        }
    }
}

/// Node kind as presented to the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// One entry in the hierarchical listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Last path segment
    pub name: String,
    /// Full slash-separated path
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Always present for folders, even when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    /// UI-only collapse state, folders only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
}

impl TreeNode {
    fn from_entry(entry: &TreeEntry) -> Self {
        let name = entry
            .path
            .rsplit('/')
            .next()
            .unwrap_or(entry.path.as_str())
            .to_string();

        match entry.kind {
            EntryKind::Tree => Self {
                name,
                path: entry.path.clone(),
                kind: NodeKind::Folder,
                children: Some(Vec::new()),
                expanded: Some(false),
            },
            EntryKind::Blob | EntryKind::Other => Self {
                name,
                path: entry.path.clone(),
                kind: NodeKind::File,
                children: None,
                expanded: None,
            },
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Children of this node, empty for files without any
    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Forest built from one listing plus the records that could not be placed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeListing {
    pub roots: Vec<TreeNode>,
    /// Paths whose parent was absent from the input, sorted
    pub dropped: Vec<String>,
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Tie-break for duplicate paths: a folder record wins over a file record
fn kind_rank(kind: EntryKind) -> u8 {
    match kind {
        EntryKind::Tree => 0,
        EntryKind::Blob => 1,
        EntryKind::Other => 2,
    }
}

fn parent_path(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// Build the forest for a flat list of tree records.
///
/// Duplicate paths collapse to one record, preferring `tree` over `blob`.
/// A record whose parent path is not present (a truncated or inconsistent
/// listing) is left out of the forest, together with anything beneath it.
/// Those paths are reported in [`TreeListing::dropped`].
pub fn build_tree(entries: &[TreeEntry]) -> TreeListing {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        depth(&a.path)
            .cmp(&depth(&b.path))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| kind_rank(a.kind).cmp(&kind_rank(b.kind)))
    });
    sorted.dedup_by(|a, b| a.path == b.path);

    // Placement pass: decide every record's parent before assembling owned nodes.
    let mut placed: HashSet<&str> = HashSet::new();
    let mut root_order: Vec<&TreeEntry> = Vec::new();
    let mut children_of: HashMap<&str, Vec<&TreeEntry>> = HashMap::new();
    let mut dropped = Vec::new();

    for entry in sorted {
        match parent_path(&entry.path) {
            None => {
                placed.insert(entry.path.as_str());
                root_order.push(entry);
            }
            Some(parent) if placed.contains(parent) => {
                placed.insert(entry.path.as_str());
                children_of.entry(parent).or_default().push(entry);
            }
            Some(_) => dropped.push(entry.path.clone()),
        }
    }

    if !dropped.is_empty() {
        warn!(
            count = dropped.len(),
            first = %dropped[0],
            "Tree listing contained entries without a parent; dropping them"
        );
    }
    dropped.sort();

    let roots = root_order
        .into_iter()
        .map(|entry| assemble(entry, &mut children_of))
        .collect();

    TreeListing { roots, dropped }
}

fn assemble<'a>(
    entry: &'a TreeEntry,
    children_of: &mut HashMap<&'a str, Vec<&'a TreeEntry>>,
) -> TreeNode {
    let mut node = TreeNode::from_entry(entry);
    if let Some(kids) = children_of.remove(entry.path.as_str()) {
        let built: Vec<TreeNode> = kids
            .into_iter()
            .map(|kid| assemble(kid, children_of))
            .collect();
        node.children.get_or_insert_with(Vec::new).extend(built);
    }
    node
}
