//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use spacelens_core::ScanSignal;

/// Progress information during a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    /// Number of files scanned so far (hard-link aliases excluded).
    pub files_scanned: u64,
    /// Number of directories scanned so far.
    pub dirs_scanned: u64,
    /// Total bytes scanned so far.
    pub total_size: u64,
    /// Last path reported by a worker.
    pub current_path: PathBuf,
    /// Number of entries skipped because of errors.
    pub errors_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ProgressStats {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate scan rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.total_size as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }

    /// The `progress` signal for this snapshot.
    pub fn to_signal(&self) -> ScanSignal {
        ScanSignal::Progress {
            current_path: self.current_path.clone(),
            files_scanned: self.files_scanned,
            total_size: self.total_size,
        }
    }
}

/// Running totals shared by all workers of a session.
///
/// Counters only ever increase. The current path is a last-write-wins slot
/// meant for display.
#[derive(Debug)]
pub struct ProgressAggregator {
    start_time: Instant,
    files_scanned: AtomicU64,
    dirs_scanned: AtomicU64,
    total_size: AtomicU64,
    errors_count: AtomicU64,
    current_path: Mutex<PathBuf>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_scanned: AtomicU64::new(0),
            dirs_scanned: AtomicU64::new(0),
            total_size: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            current_path: Mutex::new(PathBuf::new()),
        }
    }

    pub fn record_file(&self, size: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.total_size.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_dir(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_current_path(&self, path: &Path) {
        let mut slot = self
            .current_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.clear();
        slot.push(path);
    }

    pub fn files_scanned(&self) -> u64 {
        self.files_scanned.load(Ordering::Relaxed)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressStats {
        let current_path = self
            .current_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ProgressStats {
            files_scanned: self.files_scanned(),
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            total_size: self.total_size(),
            current_path,
            errors_count: self.errors_count.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}
