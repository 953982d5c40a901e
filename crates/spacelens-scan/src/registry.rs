//! Concurrently written store of everything a session discovered.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use spacelens_core::{DiscoveredNode, HardLinkAlias, ScanWarning};

/// A child reference in the adjacency index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Node,
    Alias,
}

/// Path-keyed node store plus a parent -> children index.
///
/// Append-only for the lifetime of a session. Each map is sharded, so
/// workers writing different directories rarely touch the same lock.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<PathBuf, DiscoveredNode>,
    aliases: DashMap<PathBuf, HardLinkAlias>,
    children: DashMap<PathBuf, Vec<(PathBuf, ChildKind)>>,
    warnings: DashMap<PathBuf, ScanWarning>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node. Returns `false` if the path was already present, in
    /// which case nothing changes.
    pub fn insert(&self, node: DiscoveredNode) -> bool {
        let parent = node.parent_path.clone();
        let path = node.path.clone();
        match self.nodes.entry(path.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
        }
        if let Some(parent) = parent {
            self.link(parent, path, ChildKind::Node);
        }
        true
    }

    /// Record a hard-link alias. Returns `false` if the path was known.
    pub fn insert_alias(&self, alias: HardLinkAlias) -> bool {
        if self.nodes.contains_key(&alias.path) {
            return false;
        }
        let parent = alias.parent_path.clone();
        let path = alias.path.clone();
        match self.aliases.entry(path.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(alias);
            }
        }
        self.link(parent, path, ChildKind::Alias);
        true
    }

    /// Record a warning against a path. Later warnings for the same path win.
    pub fn record_warning(&self, warning: ScanWarning) {
        self.warnings.insert(warning.path.clone(), warning);
    }

    fn link(&self, parent: PathBuf, child: PathBuf, kind: ChildKind) {
        self.children.entry(parent).or_default().push((child, kind));
    }

    /// Copy of a node.
    pub fn get(&self, path: &Path) -> Option<DiscoveredNode> {
        self.nodes.get(path).map(|node| node.value().clone())
    }

    /// Copy of an alias.
    pub fn alias(&self, path: &Path) -> Option<HardLinkAlias> {
        self.aliases.get(path).map(|alias| alias.value().clone())
    }

    /// Own size of a node (zero for directories and unknown paths).
    pub fn size_of(&self, path: &Path) -> u64 {
        self.nodes.get(path).map(|n| n.size_bytes).unwrap_or(0)
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        self.nodes.get(path).is_some_and(|n| n.is_directory())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path) || self.aliases.contains_key(path)
    }

    /// Snapshot of a directory's children.
    pub fn children_of(&self, path: &Path) -> Vec<(PathBuf, ChildKind)> {
        self.children
            .get(path)
            .map(|children| children.value().clone())
            .unwrap_or_default()
    }

    /// Whether a directory has any recorded children.
    pub fn has_children(&self, path: &Path) -> bool {
        self.children.get(path).is_some_and(|c| !c.is_empty())
    }

    /// Number of unique nodes (aliases excluded).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// All warnings recorded so far, ordered by path.
    pub fn warnings(&self) -> Vec<ScanWarning> {
        let mut warnings: Vec<ScanWarning> =
            self.warnings.iter().map(|w| w.value().clone()).collect();
        warnings.sort_by(|a, b| a.path.cmp(&b.path));
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacelens_core::{FileType, NodeKind, WarningKind};
    use std::time::SystemTime;

    fn node(path: &str, parent: Option<&str>, kind: NodeKind, size: u64) -> DiscoveredNode {
        let path = PathBuf::from(path);
        DiscoveredNode {
            name: path.file_name().unwrap().to_string_lossy().as_ref().into(),
            parent_path: parent.map(PathBuf::from),
            path,
            kind,
            size_bytes: size,
            inode: None,
            file_type: FileType::Other,
            modified_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_insert_builds_adjacency() {
        let registry = NodeRegistry::new();
        assert!(registry.insert(node("/r", None, NodeKind::Directory, 0)));
        assert!(registry.insert(node("/r/a", Some("/r"), NodeKind::File, 10)));
        assert!(registry.insert(node("/r/b", Some("/r"), NodeKind::File, 20)));

        let mut children: Vec<PathBuf> = registry
            .children_of(Path::new("/r"))
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        children.sort();
        assert_eq!(children, [PathBuf::from("/r/a"), PathBuf::from("/r/b")]);
        assert_eq!(registry.size_of(Path::new("/r/b")), 20);
        assert!(registry.is_directory(Path::new("/r")));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_child_before_parent() {
        let registry = NodeRegistry::new();
        registry.insert(node("/r/x/y", Some("/r/x"), NodeKind::File, 5));
        registry.insert(node("/r/x", Some("/r"), NodeKind::Directory, 0));
        assert_eq!(registry.children_of(Path::new("/r/x")).len(), 1);
        assert!(registry.has_children(Path::new("/r")));
    }

    #[test]
    fn test_duplicate_path_is_ignored() {
        let registry = NodeRegistry::new();
        assert!(registry.insert(node("/r/a", Some("/r"), NodeKind::File, 10)));
        assert!(!registry.insert(node("/r/a", Some("/r"), NodeKind::File, 99)));
        assert_eq!(registry.size_of(Path::new("/r/a")), 10);
        assert_eq!(registry.children_of(Path::new("/r")).len(), 1);
    }

    #[test]
    fn test_alias_and_warnings() {
        let registry = NodeRegistry::new();
        registry.insert(node("/r/a", Some("/r"), NodeKind::File, 10));
        let alias = HardLinkAlias {
            path: PathBuf::from("/r/b"),
            parent_path: PathBuf::from("/r"),
            name: "b".into(),
            primary: PathBuf::from("/r/a"),
            is_directory: false,
            file_type: FileType::Other,
            modified_at: SystemTime::UNIX_EPOCH,
        };
        assert!(registry.insert_alias(alias));
        assert!(registry.contains(Path::new("/r/b")));
        assert_eq!(registry.alias_count(), 1);
        assert_eq!(registry.len(), 1);

        registry.record_warning(ScanWarning::new(
            "/r/locked",
            "denied",
            WarningKind::PermissionDenied,
        ));
        assert_eq!(registry.warning_count(), 1);
        assert_eq!(registry.warnings()[0].kind, WarningKind::PermissionDenied);
    }
}
