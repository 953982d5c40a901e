//! State owned by one scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::Serialize;
use spacelens_core::{
    DiscoveredNode, FileNode, FileType, NodeKind, ScanConfig, ScanError, ScanWarning,
};

use crate::builder::{SizeCache, TreeBuilder};
use crate::cancel::CancellationController;
use crate::inode::InodeTracker;
use crate::limiter::ConcurrencyLimiter;
use crate::listing::{EntryFilter, get_dev, inode_info};
use crate::progress::{ProgressAggregator, ProgressStats};
use crate::registry::NodeRegistry;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    /// Whether the session will not change any more.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Completed,
            2 => Self::Cancelled,
            3 => Self::Failed,
            _ => Self::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Completed => 1,
            Self::Cancelled => 2,
            Self::Failed => 3,
        }
    }
}

/// Everything one scan reads and writes.
///
/// A new scan gets a new session; nothing is shared between sessions, so a
/// superseded scan can keep draining without touching the new one.
#[derive(Debug)]
pub struct ScanSession {
    root: PathBuf,
    config: ScanConfig,
    filter: EntryFilter,
    limiter: ConcurrencyLimiter,
    inodes: InodeTracker,
    registry: NodeRegistry,
    progress: Arc<ProgressAggregator>,
    cancel: CancellationController,
    status: AtomicU8,
    sizes: SizeCache,
}

impl ScanSession {
    /// Validate the root and set up a session with the root node recorded.
    ///
    /// Performs blocking I/O on the root. Failures here are fatal to the
    /// scan.
    pub fn create(config: ScanConfig) -> Result<Arc<Self>, ScanError> {
        Self::create_with_cancel(config, CancellationController::new())
    }

    /// Like [`create`](Self::create), but cancelled through `cancel`.
    ///
    /// Lets a caller hand out the cancel handle before the root checks run.
    pub fn create_with_cancel(
        config: ScanConfig,
        cancel: CancellationController,
    ) -> Result<Arc<Self>, ScanError> {
        config.check()?;
        let root = fs::canonicalize(&config.root).map_err(|e| ScanError::io(&config.root, e))?;
        let metadata = fs::symlink_metadata(&root).map_err(|e| ScanError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        let filter = EntryFilter::new(&config, get_dev(&metadata))?;
        let session = Self {
            limiter: ConcurrencyLimiter::new(config.concurrency_limit),
            filter,
            inodes: InodeTracker::new(),
            registry: NodeRegistry::new(),
            progress: Arc::new(ProgressAggregator::new()),
            cancel,
            status: AtomicU8::new(ScanStatus::Running.as_u8()),
            sizes: SizeCache::new(),
            root,
            config,
        };

        let inode = inode_info(&metadata);
        if let Some(info) = inode {
            session.inodes.claim(info, &session.root);
        }
        session.registry.insert(DiscoveredNode {
            name: root_name(&session.root),
            path: session.root.clone(),
            parent_path: None,
            kind: NodeKind::Directory,
            size_bytes: 0,
            inode,
            file_type: FileType::Other,
            modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
        session.progress.record_dir();
        session.progress.set_current_path(&session.root);

        tracing::debug!(root = %session.root.display(), "scan session created");
        Ok(Arc::new(session))
    }

    /// Canonical root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn inodes(&self) -> &InodeTracker {
        &self.inodes
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    pub(crate) fn progress_handle(&self) -> Arc<ProgressAggregator> {
        Arc::clone(&self.progress)
    }

    pub(crate) fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    pub fn cancellation(&self) -> &CancellationController {
        &self.cancel
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> ScanStatus {
        ScanStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: ScanStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Current totals.
    pub fn stats(&self) -> ProgressStats {
        self.progress.snapshot()
    }

    /// Entries that could not be fully inspected, ordered by path.
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.registry.warnings()
    }

    /// Tree of the root limited to `depth` levels below it.
    pub fn build_tree(&self, depth: u32) -> FileNode {
        self.build_subtree(&self.root, depth).unwrap_or_else(|| {
            FileNode::new_directory(
                root_name(&self.root),
                self.root.clone(),
                SystemTime::UNIX_EPOCH,
            )
        })
    }

    /// Tree of any recorded path, limited to `depth` levels below it.
    ///
    /// Once the session is finished the memoized sizes are kept and reused,
    /// so re-expanding never rescans or recomputes. While the scan is still
    /// running, a throwaway cache gives a best-effort snapshot.
    pub fn build_subtree(&self, path: &Path, depth: u32) -> Option<FileNode> {
        if self.status().is_terminal() {
            TreeBuilder::new(&self.registry, &self.sizes).build(path, depth)
        } else {
            let scratch = SizeCache::new();
            TreeBuilder::new(&self.registry, &scratch).build(path, depth)
        }
    }

    /// Number of directory sizes memoized so far.
    pub fn cached_sizes(&self) -> usize {
        self.sizes.len()
    }
}

fn root_name(root: &Path) -> CompactString {
    root.file_name()
        .map(|name| CompactString::new(name.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(root.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_records_root() {
        let temp = TempDir::new().unwrap();
        let session = ScanSession::create(ScanConfig::new(temp.path())).unwrap();

        assert_eq!(session.status(), ScanStatus::Running);
        assert_eq!(session.registry().len(), 1);
        assert!(session.registry().is_directory(session.root()));
        assert_eq!(session.stats().dirs_scanned, 1);
    }

    #[test]
    fn test_create_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = ScanSession::create(ScanConfig::new(temp.path().join("missing"))).unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_create_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let err = ScanSession::create(ScanConfig::new(&file)).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[test]
    fn test_create_with_shared_cancel() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationController::new();
        cancel.cancel();

        let session =
            ScanSession::create_with_cancel(ScanConfig::new(temp.path()), cancel.clone()).unwrap();
        assert!(session.is_cancelled());
    }

    #[test]
    fn test_cache_kept_only_when_terminal() {
        let temp = TempDir::new().unwrap();
        let session = ScanSession::create(ScanConfig::new(temp.path())).unwrap();

        session.build_tree(2);
        assert_eq!(session.cached_sizes(), 0);

        session.set_status(ScanStatus::Completed);
        session.build_tree(2);
        assert_eq!(session.cached_sizes(), 1);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::Cancelled,
            ScanStatus::Failed,
        ] {
            assert_eq!(ScanStatus::from_u8(status.as_u8()), status);
        }
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
    }
}
