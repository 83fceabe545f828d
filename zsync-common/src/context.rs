//! Metadata context tree.
//!
//! Suite metadata is stored in a directory-like tree keyed by the suite's
//! source path. Looking a path up merges the mappings of every ancestor with
//! the node's own mapping, so a directory-level `Project` or `Version` is
//! inherited by every suite below it while any subdirectory or file can
//! override individual keys:
//!
//! ```text
//! put("/home/user",       {a: 1, b: 2})
//! put("/home/user/data",  {b: 7, c: 3})
//! lookup("/home/user/data")   -> {a: 1, b: 7, c: 3}
//! lookup("/home/user/other")  -> {a: 1, b: 2}
//! ```
//!
//! The same tree also caches remote identifiers (project keys, version ids,
//! cycle ids) under dedicated namespaces so a given project/version/cycle is
//! resolved or created at most once per process.
//!
//! Nodes are shared behind `Arc` and copied on write: cloning a tree is cheap
//! and a clone never observes writes made through the original.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Value stored at a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    /// Mapping merged with ancestor mappings on lookup.
    Map(BTreeMap<String, String>),
    /// Opaque value returned as-is, never merged.
    Scalar(String),
}

impl NodeValue {
    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Map(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: BTreeMap<String, Arc<Node>>,
    value: Option<NodeValue>,
}

/// Persistent path-addressed key/value tree.
#[derive(Debug, Clone, Default)]
pub struct MetadataTree {
    root: Arc<Node>,
}

impl MetadataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `path`, creating intermediate nodes as needed.
    ///
    /// The previous value at that node, if any, is replaced.
    pub fn put(&mut self, path: &str, value: NodeValue) {
        let normalized = normalize_path(path);
        let mut node = Arc::make_mut(&mut self.root);
        for segment in segments(&normalized) {
            node = Arc::make_mut(node.children.entry(segment.to_string()).or_default());
        }
        node.value = Some(value);
    }

    /// Look up `path`, merging ancestor mappings under the node's own mapping.
    ///
    /// Missing nodes are not an error: the merge simply stops at the deepest
    /// existing ancestor. A scalar stored at the node itself is returned
    /// unmerged.
    pub fn lookup(&self, path: &str) -> NodeValue {
        let normalized = normalize_path(path);
        let mut merged = BTreeMap::new();
        let mut node: &Node = &self.root;
        merge_map(&mut merged, node);

        for segment in segments(&normalized) {
            match node.children.get(segment) {
                Some(child) => {
                    node = child.as_ref();
                    merge_map(&mut merged, node);
                }
                None => return NodeValue::Map(merged),
            }
        }

        match &node.value {
            Some(NodeValue::Scalar(value)) => NodeValue::Scalar(value.clone()),
            _ => NodeValue::Map(merged),
        }
    }
}

fn merge_map(merged: &mut BTreeMap<String, String>, node: &Node) {
    if let Some(NodeValue::Map(map)) = &node.value {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('/').filter(|segment| !segment.is_empty())
}

/// Normalize a host path into the tree's internal `/`-separated form.
///
/// Empty paths map to the root, backslashes become `/`, and a drive letter
/// prefix (`C:`) becomes a leading segment (`/C`). Surrounding whitespace,
/// repeated separators and trailing separators are dropped. The function is
/// idempotent.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    if path.is_empty() {
        return "/".to_string();
    }
    let (drive, rest) = match path.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => (Some(&path[..1]), &path[2..]),
        _ => (None, path.as_str()),
    };

    let mut normalized = String::with_capacity(path.len() + 1);
    if let Some(drive) = drive {
        normalized.push('/');
        normalized.push_str(drive);
    }
    let rooted = drive.is_some() || rest.starts_with('/');
    for segment in segments(rest) {
        if rooted || !normalized.is_empty() {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Namespaces sharing one [`ContextStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Suite metadata keyed by suite source path.
    Metadata,
    /// Project key keyed by project name.
    Project,
    /// Project id keyed by project key.
    ProjectKey,
    /// Version id keyed by version name.
    Version,
    /// Cycle id keyed by `{project_id}_{version_id}_{cycle_name}`.
    Cycle,
}

impl Namespace {
    const fn segment(self) -> &'static str {
        match self {
            Self::Metadata => "Metadata$",
            Self::Project => "Project$",
            Self::ProjectKey => "ProjectKey$",
            Self::Version => "Version$",
            Self::Cycle => "CycleKey$",
        }
    }

    fn path(self, key: &str) -> String {
        let key = normalize_path(key);
        format!("/{}/{}", self.segment(), key.trim_start_matches('/'))
    }
}

/// Metadata and remote-identifier cache for one listener.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    tree: MetadataTree,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the metadata declared by the suite at `source`.
    pub fn store_metadata(&mut self, source: &str, metadata: &BTreeMap<String, String>) {
        self.tree
            .put(&Namespace::Metadata.path(source), NodeValue::Map(metadata.clone()));
    }

    /// Metadata effective at `source`, inherited from every ancestor.
    pub fn metadata(&self, source: &str) -> BTreeMap<String, String> {
        match self.tree.lookup(&Namespace::Metadata.path(source)) {
            NodeValue::Map(map) => map,
            NodeValue::Scalar(_) => BTreeMap::new(),
        }
    }

    /// Cached remote identifier, if one was stored before.
    pub fn cached(&self, namespace: Namespace, key: &str) -> Option<String> {
        self.tree
            .lookup(&namespace.path(key))
            .as_scalar()
            .map(str::to_string)
    }

    pub fn cache(&mut self, namespace: Namespace, key: &str, value: &str) {
        self.tree
            .put(&namespace.path(key), NodeValue::Scalar(value.to_string()));
    }
}
