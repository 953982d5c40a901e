//! Scan configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Default cap on simultaneous directory inspections.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 100;
/// Default presentation depth below the root.
pub const DEFAULT_TREE_DEPTH: u32 = 2;
/// Default number of signals per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default maximum age of a pending batch.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 50;
/// Default cadence of progress snapshots.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;
/// Default capacity of the scanner -> batcher channel.
pub const DEFAULT_SIGNAL_BUFFER: usize = 1024;

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Maximum number of directory inspections in flight at once.
    #[builder(default = "DEFAULT_CONCURRENCY_LIMIT")]
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Use apparent size (logical length) instead of allocated blocks.
    #[builder(default = "false")]
    #[serde(default)]
    pub apparent_size: bool,

    /// Descend into directories that live on another device.
    #[builder(default = "false")]
    #[serde(default)]
    pub cross_filesystems: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names; matches are skipped.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Levels below the root delivered in the output tree.
    #[builder(default = "DEFAULT_TREE_DEPTH")]
    #[serde(default = "default_tree_depth")]
    pub tree_depth: u32,

    /// Flush a batch once it holds this many signals.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush a batch once its first signal is this old.
    #[builder(default = "DEFAULT_BATCH_INTERVAL_MS")]
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// Emit a progress snapshot this often.
    #[builder(default = "DEFAULT_PROGRESS_INTERVAL_MS")]
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Capacity of the bounded channel between scanner and batcher.
    #[builder(default = "DEFAULT_SIGNAL_BUFFER")]
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,

    /// Emit a `node_discovered` signal for every classified entry.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub emit_node_signals: bool,
}

fn default_true() -> bool {
    true
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_tree_depth() -> u32 {
    DEFAULT_TREE_DEPTH
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_interval_ms() -> u64 {
    DEFAULT_BATCH_INTERVAL_MS
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}

fn default_signal_buffer() -> usize {
    DEFAULT_SIGNAL_BUFFER
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.concurrency_limit == Some(0) {
            return Err("Concurrency limit must be at least 1".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.batch_interval_ms == Some(0) || self.progress_interval_ms == Some(0) {
            return Err("Flush intervals must be non-zero".to_string());
        }
        if self.signal_buffer == Some(0) {
            return Err("Signal buffer must be at least 1".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Bad ignore pattern {pattern:?}: {e}"))?;
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            apparent_size: false,
            cross_filesystems: false,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            max_depth: None,
            tree_depth: DEFAULT_TREE_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
            emit_node_signals: true,
        }
    }

    /// Same settings, different root.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    /// Re-check invariants on a config that did not come from the builder
    /// (deserialized or mutated in place).
    pub fn check(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| {
            Err(ScanError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.root.as_os_str().is_empty() {
            return invalid("Root path cannot be empty");
        }
        if self.concurrency_limit == 0 {
            return invalid("Concurrency limit must be at least 1");
        }
        if self.batch_size == 0 || self.signal_buffer == 0 {
            return invalid("Batch size and signal buffer must be at least 1");
        }
        if self.batch_interval_ms == 0 || self.progress_interval_ms == 0 {
            return invalid("Flush intervals must be non-zero");
        }
        Ok(())
    }

    /// Compile the ignore patterns into a matcher.
    pub fn ignore_matcher(&self) -> Result<GlobSet, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("Bad ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Maximum age of a pending batch.
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Cadence of progress snapshots.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
