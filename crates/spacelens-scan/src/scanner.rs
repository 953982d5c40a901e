//! Concurrent directory traversal.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use spacelens_core::{
    DiscoveredNode, FileType, HardLinkAlias, NodeSummary, ScanError, ScanSignal, ScanWarning,
    WarningKind,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::inode::InodeClaim;
use crate::listing::{EntryMeta, Listing, read_directory};
use crate::session::{ScanSession, ScanStatus};

type VisitFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Walks a session's root and fills its registry.
///
/// Every directory is read on the blocking pool while holding one permit
/// from the session's limiter. The permit is released before the
/// subdirectories are spawned, so a parent never holds capacity while
/// waiting for its children.
#[derive(Debug)]
pub struct Scanner {
    session: Arc<ScanSession>,
    signals: mpsc::Sender<ScanSignal>,
}

impl Scanner {
    /// `signals` receives one `node_discovered` per recorded entry when the
    /// session config asks for node signals.
    pub fn new(session: Arc<ScanSession>, signals: mpsc::Sender<ScanSignal>) -> Self {
        Self { session, signals }
    }

    /// Run the traversal to completion or cancellation.
    ///
    /// Only a failure to read the root itself is an error; everything below
    /// it degrades to warnings.
    pub async fn run(self) -> Result<ScanStatus, ScanError> {
        let walker = Arc::new(self);
        let root = walker.session.root().to_path_buf();

        if walker.within_depth(0) {
            let listing = match walker.list(root.clone()).await {
                None => return Ok(ScanStatus::Cancelled),
                Some(Ok(listing)) => listing,
                Some(Err(err)) => return Err(ScanError::io(&root, err)),
            };
            let subdirs = walker.record_listing(&root, listing).await;
            walker.descend(subdirs, 0).await;
        }

        let status = if walker.session.is_cancelled() {
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        };
        tracing::debug!(
            root = %root.display(),
            ?status,
            nodes = walker.session.registry().len(),
            peak_in_flight = walker.session.limiter().peak(),
            "traversal finished"
        );
        Ok(status)
    }

    /// Whether a directory at `depth` may be listed.
    fn within_depth(&self, depth: u32) -> bool {
        self.session.config().max_depth.is_none_or(|max| depth < max)
    }

    fn visit(self: Arc<Self>, dir: PathBuf, depth: u32) -> VisitFuture {
        Box::pin(async move {
            if self.session.is_cancelled() {
                return;
            }
            let listing = match self.list(dir.clone()).await {
                None => return,
                Some(Ok(listing)) => listing,
                Some(Err(err)) => {
                    tracing::debug!(
                        path = %dir.display(),
                        error = %err,
                        "failed to read directory"
                    );
                    self.warn(ScanWarning::from_io(&dir, &err, WarningKind::ReadError));
                    return;
                }
            };
            let subdirs = self.record_listing(&dir, listing).await;
            self.descend(subdirs, depth).await;
        })
    }

    /// Read one directory under a limiter permit.
    ///
    /// Returns `None` if the scan was cancelled while waiting for a permit.
    async fn list(&self, dir: PathBuf) -> Option<io::Result<Listing>> {
        let _permit = self
            .session
            .limiter()
            .acquire(self.session.cancellation())
            .await?;
        let session = Arc::clone(&self.session);
        let result =
            tokio::task::spawn_blocking(move || read_directory(&dir, session.filter())).await;
        Some(result.unwrap_or_else(|join| Err(io::Error::other(join.to_string()))))
    }

    async fn descend(self: &Arc<Self>, subdirs: Vec<PathBuf>, depth: u32) {
        if subdirs.is_empty() || !self.within_depth(depth + 1) {
            return;
        }

        let mut tasks = JoinSet::new();
        for dir in subdirs {
            if self.session.is_cancelled() {
                break;
            }
            tasks.spawn(Arc::clone(self).visit(dir, depth + 1));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "directory task failed");
            }
        }
    }

    /// Record a listing and return the subdirectories to descend into.
    async fn record_listing(&self, parent: &Path, listing: Listing) -> Vec<PathBuf> {
        for warning in listing.warnings {
            self.warn(warning);
        }

        let mut subdirs = Vec::new();
        for entry in listing.entries {
            // Results that arrive after cancellation are discarded.
            if self.session.is_cancelled() {
                break;
            }
            if let Some(dir) = self.record_entry(parent, entry).await {
                subdirs.push(dir);
            }
        }
        subdirs
    }

    async fn record_entry(&self, parent: &Path, entry: EntryMeta) -> Option<PathBuf> {
        let is_dir = entry.kind.is_dir();
        let claim = match entry.inode {
            Some(info) if is_dir || entry.nlink > 1 => {
                self.session.inodes().claim(info, &entry.path)
            }
            _ => InodeClaim::First,
        };
        let file_type = if is_dir {
            FileType::Other
        } else {
            FileType::classify(&entry.path)
        };

        if let InodeClaim::AliasOf(primary) = claim {
            let alias = HardLinkAlias {
                path: entry.path,
                parent_path: parent.to_path_buf(),
                name: entry.name,
                primary,
                is_directory: is_dir,
                file_type,
                modified_at: entry.modified,
            };
            let summary = alias.summary();
            if self.session.registry().insert_alias(alias) {
                self.session.progress().set_current_path(&summary.path);
                self.emit(summary, parent).await;
            }
            return None;
        }

        let node = DiscoveredNode {
            path: entry.path,
            parent_path: Some(parent.to_path_buf()),
            name: entry.name,
            size_bytes: entry.size,
            inode: entry.inode,
            file_type,
            modified_at: entry.modified,
            kind: entry.kind,
        };
        let summary = node.summary();
        if !self.session.registry().insert(node) {
            return None;
        }

        let progress = self.session.progress();
        if is_dir {
            progress.record_dir();
        } else {
            progress.record_file(summary.size);
        }
        progress.set_current_path(&summary.path);

        let path = summary.path.clone();
        self.emit(summary, parent).await;
        is_dir.then_some(path)
    }

    async fn emit(&self, node: NodeSummary, parent: &Path) {
        if !self.session.config().emit_node_signals {
            return;
        }
        let signal = ScanSignal::NodeDiscovered {
            node,
            parent_path: Some(parent.to_path_buf()),
        };
        // A failed send means the batcher is gone; a cancelled scan does not
        // wait for room.
        tokio::select! {
            biased;
            _ = self.signals.send(signal) => {}
            _ = self.session.cancellation().cancelled() => {}
        }
    }

    fn warn(&self, warning: ScanWarning) {
        self.session.progress().record_error();
        self.session.registry().record_warning(warning);
    }
}
