//! Lazy, depth-limited tree construction over a [`NodeRegistry`].

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use spacelens_core::FileNode;

use crate::registry::{ChildKind, NodeRegistry};

/// Memoized aggregate sizes, keyed by directory path.
///
/// Entries are only valid while the registry they were computed from does
/// not change.
#[derive(Debug, Default)]
pub struct SizeCache {
    sizes: DashMap<PathBuf, u64>,
}

impl SizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<u64> {
        self.sizes.get(path).map(|size| *size)
    }

    fn insert(&self, path: PathBuf, size: u64) {
        self.sizes.insert(path, size);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Builds presentation trees from the registry.
///
/// Sizes always cover the full subtree; only the number of levels
/// materialized as [`FileNode`]s is limited.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'a> {
    registry: &'a NodeRegistry,
    cache: &'a SizeCache,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry, cache: &'a SizeCache) -> Self {
        Self { registry, cache }
    }

    /// Total size of everything under `path`.
    ///
    /// Computed bottom-up with an explicit stack, so arbitrarily deep trees
    /// do not grow the call stack. Every directory visited is memoized.
    pub fn subtree_size(&self, path: &Path) -> u64 {
        if !self.registry.is_directory(path) {
            return self.registry.size_of(path);
        }
        if let Some(size) = self.cache.get(path) {
            return size;
        }

        let mut stack = vec![(path.to_path_buf(), false)];
        while let Some((dir, children_done)) = stack.pop() {
            if self.cache.get(&dir).is_some() {
                continue;
            }
            let children = self.registry.children_of(&dir);

            if children_done {
                let total = children
                    .iter()
                    .map(|(child, kind)| self.child_size(child, *kind))
                    .sum();
                self.cache.insert(dir, total);
                continue;
            }

            stack.push((dir, true));
            for (child, kind) in children {
                if kind == ChildKind::Node
                    && self.registry.is_directory(&child)
                    && self.cache.get(&child).is_none()
                {
                    stack.push((child, false));
                }
            }
        }

        self.cache.get(path).unwrap_or(0)
    }

    fn child_size(&self, path: &Path, kind: ChildKind) -> u64 {
        match kind {
            ChildKind::Alias => 0,
            ChildKind::Node if self.registry.is_directory(path) => {
                self.cache.get(path).unwrap_or(0)
            }
            ChildKind::Node => self.registry.size_of(path),
        }
    }

    /// Materialize `path` and `max_depth` levels below it.
    ///
    /// Directories at the cutoff keep their full size but carry no
    /// children; they are marked `truncated` if they have any. Returns
    /// `None` if `path` is not in the registry.
    pub fn build(&self, path: &Path, max_depth: u32) -> Option<FileNode> {
        let kind = if self.registry.alias(path).is_some() {
            ChildKind::Alias
        } else {
            ChildKind::Node
        };
        let mut node = self.build_node(path, kind, 0, max_depth)?;
        node.sort_children_by_size();
        Some(node)
    }

    fn build_node(
        &self,
        path: &Path,
        kind: ChildKind,
        depth: u32,
        max_depth: u32,
    ) -> Option<FileNode> {
        if kind == ChildKind::Alias {
            let alias = self.registry.alias(path)?;
            let mut node = FileNode::new_file(
                alias.name,
                alias.path,
                0,
                alias.file_type,
                alias.modified_at,
            );
            node.is_directory = alias.is_directory;
            node.hard_link_of = Some(alias.primary);
            return Some(node);
        }

        let discovered = self.registry.get(path)?;
        if !discovered.is_directory() {
            return Some(FileNode::new_file(
                discovered.name,
                discovered.path,
                discovered.size_bytes,
                discovered.file_type,
                discovered.modified_at,
            ));
        }

        let mut node =
            FileNode::new_directory(discovered.name, discovered.path, discovered.modified_at);
        node.size = self.subtree_size(path);

        if depth < max_depth {
            node.children = self
                .registry
                .children_of(path)
                .into_iter()
                .filter_map(|(child, kind)| self.build_node(&child, kind, depth + 1, max_depth))
                .collect();
        } else {
            node.truncated = self.registry.has_children(path);
        }

        Some(node)
    }
}
