//! Discovered node types, as recorded during traversal.

use std::path::PathBuf;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::file_type::FileType;

/// Inode information for hardlink detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

/// Type of file system node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link. Never followed.
    Symlink {
        /// Link target path.
        target: CompactString,
        /// Whether the link target exists.
        broken: bool,
    },
    /// Other file types (sockets, devices, etc.).
    Other,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::Symlink { .. })
    }
}

/// One entry found on disk, keyed by its absolute path.
///
/// Created once per unique (device, inode) pair. A directory's `size_bytes`
/// is always zero: its aggregate is derived from the registry when a tree is
/// built, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredNode {
    /// Absolute path; unique key within a session.
    pub path: PathBuf,
    /// Parent directory, `None` for the scan root.
    pub parent_path: Option<PathBuf>,
    /// File/directory name (not full path).
    pub name: CompactString,
    /// Node type and associated metadata.
    pub kind: NodeKind,
    /// Bytes this entry contributes on its own.
    pub size_bytes: u64,
    /// Inode info, when the platform provides one.
    pub inode: Option<InodeInfo>,
    /// Category from the extension.
    pub file_type: FileType,
    /// Last modification time.
    pub modified_at: SystemTime,
}

impl DiscoveredNode {
    pub fn is_directory(&self) -> bool {
        self.kind.is_dir()
    }

    /// Lightweight view used in discovery signals.
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            size: self.size_bytes,
            is_directory: self.is_directory(),
            file_type: self.file_type,
        }
    }
}

/// A second path to storage already counted under another path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardLinkAlias {
    /// Path of this alias.
    pub path: PathBuf,
    /// Directory containing the alias.
    pub parent_path: PathBuf,
    /// Entry name.
    pub name: CompactString,
    /// First-seen path that owns the size.
    pub primary: PathBuf,
    pub is_directory: bool,
    pub file_type: FileType,
    pub modified_at: SystemTime,
}

impl HardLinkAlias {
    /// Discovery view of the alias; it never carries size.
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            size: 0,
            is_directory: self.is_directory,
            file_type: self.file_type,
        }
    }
}

/// Node payload of a `node_discovered` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: CompactString,
    pub path: PathBuf,
    pub size: u64,
    pub is_directory: bool,
    pub file_type: FileType,
}
