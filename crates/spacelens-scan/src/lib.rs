//! File system scanning engine for spacelens.
//!
//! This crate walks a directory tree concurrently, records every entry in a
//! shared registry, and streams what it finds to a consumer in bounded
//! batches.
//!
//! # Overview
//!
//! `spacelens-scan` is responsible for traversing directories and building
//! the file tree structure. Key features:
//!
//! - **Bounded concurrency** via a semaphore shared by all workers
//! - **Batched signals** over bounded tokio channels
//! - **Hardlink detection** to avoid double-counting
//! - **Lazy trees** with memoized sizes, expandable without rescanning
//! - **Cooperative cancellation** that keeps already-found results
//!
//! # Example
//!
//! ```rust,no_run
//! use spacelens_scan::ScanEngine;
//!
//! # async fn run() -> Result<(), spacelens_scan::ScanError> {
//! let engine = ScanEngine::new();
//! let outcome = engine.start_scan("/path/to/scan", None).await?;
//!
//! println!("Total size: {} bytes", outcome.stats.total_size);
//! println!("Total files: {}", outcome.stats.files_scanned);
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming
//!
//! Consume signal batches while the scan runs:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spacelens_scan::{ScanEngine, ScanSignal};
//! use tokio_stream::StreamExt;
//!
//! # async fn run() {
//! let engine = Arc::new(ScanEngine::new());
//! let (handle, mut batches) = engine.scan_stream("/path/to/scan");
//!
//! while let Some(batch) = batches.next().await {
//!     for signal in batch {
//!         if let ScanSignal::Progress { files_scanned, .. } = signal {
//!             println!("Scanned {files_scanned} files");
//!         }
//!     }
//! }
//! let outcome = handle.await;
//! # }
//! ```

mod batcher;
mod builder;
mod cancel;
mod engine;
mod inode;
mod limiter;
mod listing;
mod preflight;
mod progress;
mod registry;
mod scanner;
mod session;

pub use batcher::{BatcherStats, EventBatcher};
pub use builder::{SizeCache, TreeBuilder};
pub use cancel::CancellationController;
pub use engine::{ScanEngine, ScanOutcome, run_session};
pub use inode::{InodeClaim, InodeTracker};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use preflight::{check_path_permissions, validate_path};
pub use progress::{ProgressAggregator, ProgressStats};
pub use registry::{ChildKind, NodeRegistry};
pub use scanner::Scanner;
pub use session::{ScanSession, ScanStatus};

// Re-export core types for convenience
pub use spacelens_core::{
    FileNode, FileType, NodeKind, NodeSummary, ScanConfig, ScanError, ScanSignal, ScanWarning,
    SignalBatch, WarningKind,
};
