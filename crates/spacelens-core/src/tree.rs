//! Output tree handed to callers.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::file_type::FileType;

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single file or directory in a delivered tree.
///
/// Trees are independent copies built from a session's registry; they are
/// never updated after being returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    /// File/directory name (not full path).
    pub name: CompactString,

    /// Absolute path.
    pub path: PathBuf,

    /// Size in bytes (aggregate for directories).
    pub size: u64,

    pub is_directory: bool,

    /// Children, sorted by size descending. Empty past the depth cutoff.
    pub children: Vec<FileNode>,

    pub file_type: FileType,

    /// Last modification time.
    pub modified: SystemTime,

    /// Set on directories whose children were cut off by the depth limit.
    /// Their size still includes the omitted descendants.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,

    /// Primary path when this entry is a hard link to storage counted
    /// elsewhere. Such entries have size 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_link_of: Option<PathBuf>,
}

impl FileNode {
    /// Create a new file node.
    pub fn new_file(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        file_type: FileType,
        modified: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_directory: false,
            children: Vec::new(),
            file_type,
            modified,
            truncated: false,
            hard_link_of: None,
        }
    }

    /// Create a new, empty directory node.
    pub fn new_directory(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        modified: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: 0,
            is_directory: true,
            children: Vec::new(),
            file_type: FileType::Other,
            modified,
            truncated: false,
            hard_link_of: None,
        }
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Count non-directory leaves present in this tree (aliases excluded).
    pub fn file_count(&self) -> u64 {
        if !self.is_directory {
            return u64::from(self.hard_link_of.is_none());
        }
        self.children.iter().map(FileNode::file_count).sum()
    }

    /// Sort children by size in descending order, ties by name.
    pub fn sort_children_by_size(&mut self) {
        self.children
            .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
        for child in &mut self.children {
            child.sort_children_by_size();
        }
    }

    /// Locate a node by absolute path.
    pub fn find(&self, path: &Path) -> Option<&FileNode> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// Check that every directory's size equals the sum of its children,
    /// for all directories that were not truncated.
    pub fn sizes_consistent(&self) -> bool {
        if !self.is_directory || self.truncated {
            return true;
        }
        let sum: u64 = self.children.iter().map(|c| c.size).sum();
        sum == self.size && self.children.iter().all(FileNode::sizes_consistent)
    }
}

/// Bytes a deletion of `selected` would free, according to `root`.
///
/// Selections nested inside another selection are counted once. Paths not
/// present in the tree contribute nothing.
pub fn selection_size(root: &FileNode, selected: &[PathBuf]) -> u64 {
    let mut paths: Vec<&PathBuf> = selected.iter().collect();
    paths.sort();
    paths.dedup();

    let mut total = 0;
    let mut last_counted: Option<&PathBuf> = None;
    for path in paths {
        if last_counted.is_some_and(|parent| path.starts_with(parent)) {
            continue;
        }
        if let Some(node) = root.find(path) {
            total += node.size;
            last_counted = Some(path);
        }
    }
    total
}
