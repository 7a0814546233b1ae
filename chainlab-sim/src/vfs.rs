//! Persistent in-memory file tree.
//!
//! Every mutation returns a new [`Vfs`]; the receiver is never modified.
//! Directory children sit behind `Arc`, so a mutation rebuilds only the
//! directories between the root and the touched node and shares every other
//! subtree with the previous version.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::path;

/// Errors raised by VFS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VfsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Operation not permitted on the workspace root")]
    RootPath,

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// A node in the file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VfsNode {
    File {
        name: String,
        content: String,
        /// Set once the file has been written after seeding
        #[serde(default)]
        modified: bool,
    },
    Directory {
        name: String,
        #[serde(default)]
        children: BTreeMap<String, Arc<VfsNode>>,
    },
}

impl VfsNode {
    pub fn file(name: impl Into<String>, content: impl Into<String>, modified: bool) -> Self {
        VfsNode::File {
            name: name.into(),
            content: content.into(),
            modified,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        VfsNode::Directory {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VfsNode::File { name, .. } | VfsNode::Directory { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, VfsNode::Directory { .. })
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Immutable handle to a file tree. Cloning is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vfs {
    root: Arc<VfsNode>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            root: Arc::new(VfsNode::directory("")),
        }
    }

    /// Build a tree from `(path, content)` pairs. Seeded files are not
    /// marked modified.
    pub fn from_files<'a, I>(files: I) -> Result<Self, VfsError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        files
            .into_iter()
            .try_fold(Self::new(), |vfs, (path, content)| {
                vfs.write(path, content, false)
            })
    }

    pub fn root(&self) -> &Arc<VfsNode> {
        &self.root
    }

    /// Look up the node at `path`.
    pub fn node(&self, path: &str) -> Option<&VfsNode> {
        let mut current: &VfsNode = &self.root;
        for segment in path::normalize(path) {
            match current {
                VfsNode::Directory { children, .. } => {
                    current = children.get(&segment)?.as_ref();
                }
                VfsNode::File { .. } => return None,
            }
        }
        Some(current)
    }

    /// File content, or `None` when the path is missing or is a directory.
    pub fn get_file(&self, path: &str) -> Option<&str> {
        match self.node(path)? {
            VfsNode::File { content, .. } => Some(content),
            VfsNode::Directory { .. } => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.node(path).map(VfsNode::is_dir).unwrap_or(false)
    }

    /// Child names of a directory, lexicographically ordered.
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        Ok(self.entries(path)?.into_iter().map(|e| e.name).collect())
    }

    /// Children of a directory with their kinds, lexicographically ordered.
    pub fn entries(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        match self.node(path) {
            Some(VfsNode::Directory { children, .. }) => Ok(children
                .iter()
                .map(|(name, node)| DirEntry {
                    name: name.clone(),
                    is_dir: node.is_dir(),
                })
                .collect()),
            Some(VfsNode::File { .. }) => Err(VfsError::NotADirectory(path::join(
                &path::normalize(path),
            ))),
            None => Err(VfsError::NotFound(path::join(&path::normalize(path)))),
        }
    }

    /// Write a file, creating missing parent directories.
    pub fn set_file(&self, path: &str, content: &str) -> Result<Self, VfsError> {
        self.write(path, content, true)
    }

    /// Create a directory (and its parents). Existing directories are left
    /// as they are.
    pub fn create_dir(&self, path: &str) -> Result<Self, VfsError> {
        let segments = path::normalize(path);
        if segments.is_empty() || self.is_dir(path) {
            return Ok(self.clone());
        }
        let full = path::join(&segments);
        let name = segments[segments.len() - 1].clone();

        self.update(&segments, true, |existing| match existing {
            Some(node) if node.is_dir() => Ok(Some(Arc::clone(node))),
            Some(_) => Err(VfsError::AlreadyExists(full.clone())),
            None => Ok(Some(Arc::new(VfsNode::directory(name)))),
        })
    }

    /// Remove a file or a whole directory subtree.
    pub fn delete_node(&self, path: &str) -> Result<Self, VfsError> {
        let segments = path::normalize(path);
        if segments.is_empty() {
            return Err(VfsError::RootPath);
        }
        let full = path::join(&segments);

        self.update(&segments, false, |existing| match existing {
            Some(_) => Ok(None),
            None => Err(VfsError::NotFound(full.clone())),
        })
    }

    /// Every file as `(path, content)`, in lexicographic path order.
    pub fn files(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        collect_files(&self.root, "", &mut out);
        out
    }

    /// Serialize the whole tree.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.root.as_ref()).unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild a tree from [`Vfs::snapshot`] output.
    pub fn restore(value: serde_json::Value) -> Result<Self, VfsError> {
        let root: VfsNode = serde_json::from_value(value)
            .map_err(|e| VfsError::InvalidSnapshot(e.to_string()))?;
        if !root.is_dir() {
            return Err(VfsError::InvalidSnapshot("root is not a directory".into()));
        }
        check_names(&root)?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    fn write(&self, path: &str, content: &str, modified: bool) -> Result<Self, VfsError> {
        let segments = path::normalize(path);
        if segments.is_empty() {
            return Err(VfsError::RootPath);
        }
        let full = path::join(&segments);
        let name = segments[segments.len() - 1].clone();

        self.update(&segments, true, |existing| match existing {
            Some(node) if node.is_dir() => Err(VfsError::IsADirectory(full.clone())),
            _ => Ok(Some(Arc::new(VfsNode::file(name, content, modified)))),
        })
    }

    fn update<F>(&self, segments: &[String], create_parents: bool, apply: F) -> Result<Self, VfsError>
    where
        F: FnOnce(Option<&Arc<VfsNode>>) -> Result<Option<Arc<VfsNode>>, VfsError>,
    {
        let full = path::join(segments);
        let root = update_path(&self.root, segments, create_parents, &full, apply)?;
        Ok(Self {
            root: Arc::new(root),
        })
    }
}

/// Path-update combinator.
///
/// Rebuilds `dir` with the slot named by `segments` replaced by whatever
/// `apply` returns (`None` removes it). Only directories on the path are
/// copied; their other children are shared by `Arc`.
fn update_path<F>(
    dir: &VfsNode,
    segments: &[String],
    create_parents: bool,
    full: &str,
    apply: F,
) -> Result<VfsNode, VfsError>
where
    F: FnOnce(Option<&Arc<VfsNode>>) -> Result<Option<Arc<VfsNode>>, VfsError>,
{
    let VfsNode::Directory { name, children } = dir else {
        return Err(VfsError::NotADirectory(full.to_string()));
    };
    let Some((head, rest)) = segments.split_first() else {
        return Err(VfsError::RootPath);
    };

    let mut children = children.clone();

    if rest.is_empty() {
        match apply(children.get(head))? {
            Some(node) => {
                children.insert(head.clone(), node);
            }
            None => {
                children.remove(head);
            }
        }
    } else {
        let child = match children.get(head) {
            Some(child) => Arc::clone(child),
            None if create_parents => Arc::new(VfsNode::directory(head.clone())),
            None => return Err(VfsError::NotFound(full.to_string())),
        };
        let updated = update_path(&child, rest, create_parents, full, apply)?;
        children.insert(head.clone(), Arc::new(updated));
    }

    Ok(VfsNode::Directory {
        name: name.clone(),
        children,
    })
}

fn collect_files(node: &VfsNode, prefix: &str, out: &mut Vec<(String, String)>) {
    match node {
        VfsNode::File { content, .. } => out.push((prefix.to_string(), content.clone())),
        VfsNode::Directory { children, .. } => {
            for (name, child) in children {
                let child_path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                collect_files(child, &child_path, out);
            }
        }
    }
}

fn check_names(node: &VfsNode) -> Result<(), VfsError> {
    if let VfsNode::Directory { children, .. } = node {
        for (key, child) in children {
            if key.is_empty() || key.contains('/') || key != child.name() {
                return Err(VfsError::InvalidSnapshot(format!(
                    "bad entry name '{}'",
                    key
                )));
            }
            check_names(child)?;
        }
    }
    Ok(())
}
