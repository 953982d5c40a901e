//! Core types for spacelens.
//!
//! This crate provides the data structures shared by the scanning engine and
//! its callers: discovered nodes, delivered trees, stream signals, scan
//! configuration, and the shapes exchanged with the deletion subsystem.

mod config;
mod error;
mod file_type;
mod node;
mod safety;
mod signal;
mod tree;

pub use config::{
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY_LIMIT,
    DEFAULT_PROGRESS_INTERVAL_MS, DEFAULT_SIGNAL_BUFFER, DEFAULT_TREE_DEPTH, ScanConfig,
    ScanConfigBuilder,
};
pub use error::{ScanError, ScanWarning, WarningKind, is_resumable_message};
pub use file_type::{CategoryStats, FileType, category_stats};
pub use node::{DiscoveredNode, HardLinkAlias, InodeInfo, NodeKind, NodeSummary};
pub use safety::{DeletionBackend, DeletionResult, FailedDeletion, SafetyCheck};
pub use signal::{ScanSignal, SignalBatch};
pub use tree::{FileNode, selection_size};
