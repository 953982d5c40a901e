//! Inode tracking for hardlink deduplication.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use spacelens_core::InodeInfo;

/// Result of claiming an inode for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeClaim {
    /// First path to reach this storage; it carries the size.
    First,
    /// Storage already claimed by the contained path.
    AliasOf(PathBuf),
}

/// Tracks seen inodes to prevent double-counting hardlinks.
///
/// When a file has multiple hardlinks, we only want to count its size once.
/// The claim is an insert-if-absent on one shard of a concurrent map, so two
/// workers racing on the same (inode, device) pair get exactly one winner.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashMap<InodeInfo, PathBuf>,
}

impl InodeTracker {
    /// Create a new inode tracker.
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Claim an inode on behalf of `path`.
    pub fn claim(&self, info: InodeInfo, path: &Path) -> InodeClaim {
        match self.seen.entry(info) {
            Entry::Occupied(owner) => InodeClaim::AliasOf(owner.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(path.to_path_buf());
                InodeClaim::First
            }
        }
    }

    /// Get the number of unique inodes tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if no inodes have been tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_new_inode() {
        let tracker = InodeTracker::new();
        let info = InodeInfo::new(12345, 1);

        assert_eq!(tracker.claim(info, Path::new("/a")), InodeClaim::First);
        assert_eq!(
            tracker.claim(info, Path::new("/b")),
            InodeClaim::AliasOf(PathBuf::from("/a"))
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_different_devices() {
        let tracker = InodeTracker::new();
        let info1 = InodeInfo::new(12345, 1);
        let info2 = InodeInfo::new(12345, 2); // Same inode, different device

        assert_eq!(tracker.claim(info1, Path::new("/a")), InodeClaim::First);
        assert_eq!(tracker.claim(info2, Path::new("/b")), InodeClaim::First);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let tracker = Arc::new(InodeTracker::new());
        let info = InodeInfo::new(99, 3);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let path = PathBuf::from(format!("/link{i}"));
                    tracker.claim(info, &path) == InodeClaim::First
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(tracker.len(), 1);
    }
}
