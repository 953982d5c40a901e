//! Public scan entry points.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use spacelens_core::{FileNode, ScanConfig, ScanError, ScanSignal, ScanWarning, SignalBatch};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

use crate::batcher::EventBatcher;
use crate::cancel::CancellationController;
use crate::progress::ProgressStats;
use crate::scanner::Scanner;
use crate::session::{ScanSession, ScanStatus};

/// Capacity of the batch channel handed out by [`ScanEngine::scan_stream`].
const STREAM_CAPACITY: usize = 64;

/// How long a cancelled scan waits for room to deliver its terminal signal.
const TERMINAL_GRACE: Duration = Duration::from_secs(1);

/// Result of a finished (or cancelled) scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Tree of the root, limited to the configured presentation depth.
    pub root: FileNode,
    pub status: ScanStatus,
    /// Final totals; equal to the ones carried by the terminal signal.
    pub stats: ProgressStats,
    /// Entries that could not be fully inspected.
    pub warnings: Vec<ScanWarning>,
    pub duration: Duration,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Completed
    }
}

/// Runs scans, at most one active at a time.
///
/// Starting a scan cancels the one before it. The last session stays
/// available for lazy expansion until the next scan starts.
#[derive(Debug)]
pub struct ScanEngine {
    config: ScanConfig,
    active: Mutex<ActiveScan>,
}

/// The newest scan. Its cancel handle exists before its session does.
#[derive(Debug, Default)]
struct ActiveScan {
    generation: u64,
    cancel: CancellationController,
    session: Option<Arc<ScanSession>>,
}

impl ScanEngine {
    /// Engine with default settings. The root of `config` is replaced by
    /// the path passed to each scan.
    pub fn new() -> Self {
        Self::with_config(ScanConfig::new("."))
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            config,
            active: Mutex::new(ActiveScan::default()),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `path`, streaming signal batches to `events` if given.
    ///
    /// Fails only when the root cannot be scanned at all. After the last
    /// batch, `events` receives exactly one terminal signal: `complete` or
    /// `cancelled`.
    pub async fn start_scan(
        &self,
        path: impl Into<PathBuf>,
        events: Option<mpsc::Sender<SignalBatch>>,
    ) -> Result<ScanOutcome, ScanError> {
        let cancel = CancellationController::new();
        let generation = self.supersede(cancel.clone());

        let config = self.config.with_root(path);
        let session =
            tokio::task::spawn_blocking(move || ScanSession::create_with_cancel(config, cancel))
                .await
                .map_err(|err| ScanError::TaskFailed {
                    message: err.to_string(),
                })??;

        {
            let mut active = self.lock_active();
            // A newer scan already cancelled this one; leave its slot alone.
            if active.generation == generation {
                active.session = Some(Arc::clone(&session));
            }
        }

        run_session(session, events).await
    }

    /// Start a scan in the background and return its batches as a stream.
    ///
    /// The stream ends after the terminal signal.
    pub fn scan_stream(
        self: &Arc<Self>,
        path: impl Into<PathBuf>,
    ) -> (
        JoinHandle<Result<ScanOutcome, ScanError>>,
        ReceiverStream<SignalBatch>,
    ) {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let engine = Arc::clone(self);
        let path = path.into();
        let handle = tokio::spawn(async move { engine.start_scan(path, Some(tx)).await });
        (handle, ReceiverStream::new(rx))
    }

    /// Cancel the newest scan, including one still checking its root.
    /// Idempotent.
    pub fn cancel_scan(&self) {
        self.lock_active().cancel.cancel();
    }

    /// The most recent session.
    pub fn session(&self) -> Option<Arc<ScanSession>> {
        self.lock_active().session.clone()
    }

    /// Materialize `depth` more levels under `path` from the last scan.
    ///
    /// Never touches the file system.
    pub fn expand(&self, path: &Path, depth: u32) -> Option<FileNode> {
        self.session()?.build_subtree(path, depth)
    }

    /// Cancel the current scan and make `cancel` the newest one.
    fn supersede(&self, cancel: CancellationController) -> u64 {
        let mut active = self.lock_active();
        active.cancel.cancel();
        let running = active.session.take().filter(|s| !s.status().is_terminal());
        if let Some(previous) = running {
            tracing::info!(root = %previous.root().display(), "cancelling superseded scan");
        }
        active.generation += 1;
        active.cancel = cancel;
        active.generation
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveScan> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one session to its end.
pub async fn run_session(
    session: Arc<ScanSession>,
    events: Option<mpsc::Sender<SignalBatch>>,
) -> Result<ScanOutcome, ScanError> {
    let started = Instant::now();
    let config = session.config();

    let (signal_tx, signal_rx) = mpsc::channel(config.signal_buffer.max(1));
    let batcher = EventBatcher::new(
        signal_rx,
        events.clone(),
        session.progress_handle(),
        session.cancellation().clone(),
        config,
    );
    let batcher_task = tokio::spawn(batcher.run());

    // The scanner owns the only sender, so the batcher drains and stops
    // once the traversal is done.
    let scanned = Scanner::new(Arc::clone(&session), signal_tx).run().await;

    match batcher_task.await {
        Ok(stats) => tracing::debug!(
            batches = stats.batches,
            largest = stats.largest_batch,
            "batches delivered"
        ),
        Err(err) => tracing::warn!(error = %err, "event batcher failed"),
    }

    let status = match scanned {
        Ok(status) => status,
        Err(err) => {
            session.set_status(ScanStatus::Failed);
            tracing::warn!(root = %session.root().display(), error = %err, "scan failed");
            return Err(err);
        }
    };
    session.set_status(status);

    let stats = session.stats();
    if let Some(tx) = events {
        let terminal = match status {
            ScanStatus::Completed => ScanSignal::Complete {
                files_scanned: stats.files_scanned,
                total_size: stats.total_size,
            },
            _ => ScanSignal::Cancelled {
                files_scanned: stats.files_scanned,
                total_size: stats.total_size,
            },
        };
        let delivered = deliver_terminal(&tx, terminal, session.cancellation()).await;
        if !delivered {
            tracing::debug!("terminal signal not delivered");
        }
    }

    let tree_depth = config.tree_depth;
    let builder = Arc::clone(&session);
    let root = tokio::task::spawn_blocking(move || builder.build_tree(tree_depth))
        .await
        .map_err(|err| ScanError::TaskFailed {
            message: err.to_string(),
        })?;

    let duration = started.elapsed();
    tracing::info!(
        root = %session.root().display(),
        ?status,
        files = stats.files_scanned,
        bytes = stats.total_size,
        ?duration,
        "scan finished"
    );

    Ok(ScanOutcome {
        root,
        status,
        warnings: session.warnings(),
        stats,
        duration,
    })
}

/// Send the terminal signal. Once the session is cancelled the consumer
/// may have stopped reading, so the send only waits [`TERMINAL_GRACE`].
async fn deliver_terminal(
    tx: &mpsc::Sender<SignalBatch>,
    terminal: ScanSignal,
    cancel: &CancellationController,
) -> bool {
    let send = tx.send(vec![terminal]);
    tokio::pin!(send);
    if !cancel.is_cancelled() {
        tokio::select! {
            biased;
            sent = &mut send => return sent.is_ok(),
            _ = cancel.cancelled() => {}
        }
    }
    matches!(timeout(TERMINAL_GRACE, send).await, Ok(Ok(())))
}
