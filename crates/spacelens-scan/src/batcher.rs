//! Coalesces per-node signals into bounded batches for the consumer.

use std::sync::Arc;
use std::time::Duration;

use spacelens_core::{ScanConfig, ScanSignal, SignalBatch};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};

use crate::cancel::CancellationController;
use crate::progress::ProgressAggregator;

/// Counters reported when the batcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Batches handed to the consumer (progress snapshots included).
    pub batches: u64,
    /// Signals received from the scanner.
    pub signals: u64,
    /// Size of the largest batch delivered.
    pub largest_batch: usize,
}

/// Consumer task between the scanner and the caller.
///
/// Flush rules:
/// - a batch is sent as soon as it holds `batch_size` signals;
/// - a non-empty batch is sent once `batch_interval` has passed since its
///   first signal arrived;
/// - independently, a progress snapshot is sent every `progress_interval`;
/// - when the input closes, whatever is pending is sent and the task ends.
///
/// Input and output are bounded channels, so a slow consumer slows the
/// scanner down instead of growing memory. If the consumer goes away, the
/// batcher keeps draining its input so the scanner never blocks on it.
/// After cancellation, batches the consumer has no room for are dropped.
#[derive(Debug)]
pub struct EventBatcher {
    input: mpsc::Receiver<ScanSignal>,
    output: Option<mpsc::Sender<SignalBatch>>,
    progress: Arc<ProgressAggregator>,
    cancel: CancellationController,
    batch_size: usize,
    batch_interval: Duration,
    progress_interval: Duration,
}

impl EventBatcher {
    pub fn new(
        input: mpsc::Receiver<ScanSignal>,
        output: Option<mpsc::Sender<SignalBatch>>,
        progress: Arc<ProgressAggregator>,
        cancel: CancellationController,
        config: &ScanConfig,
    ) -> Self {
        Self {
            input,
            output,
            progress,
            cancel,
            batch_size: config.batch_size.max(1),
            batch_interval: config.batch_interval(),
            progress_interval: config.progress_interval(),
        }
    }

    /// Run until the input channel closes.
    pub async fn run(self) -> BatcherStats {
        let Self {
            mut input,
            mut output,
            progress,
            cancel,
            batch_size,
            batch_interval,
            progress_interval,
        } = self;

        let mut stats = BatcherStats::default();
        let mut batch: SignalBatch = Vec::with_capacity(batch_size);
        let mut deadline = Instant::now();
        let mut ticker = interval_at(Instant::now() + progress_interval, progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Timers are polled before the input so a flood of signals
            // cannot starve the age-based flush or the progress cadence.
            tokio::select! {
                biased;
                _ = sleep_until(deadline), if !batch.is_empty() => {
                    deliver(&mut output, &mut batch, &mut stats, &cancel).await;
                }
                _ = ticker.tick() => {
                    let mut snapshot = vec![progress.snapshot().to_signal()];
                    deliver(&mut output, &mut snapshot, &mut stats, &cancel).await;
                }
                received = input.recv() => match received {
                    Some(signal) => {
                        stats.signals += 1;
                        if batch.is_empty() {
                            deadline = Instant::now() + batch_interval;
                        }
                        batch.push(signal);
                        if batch.len() >= batch_size {
                            deliver(&mut output, &mut batch, &mut stats, &cancel).await;
                        }
                    }
                    None => break,
                },
            }
        }

        deliver(&mut output, &mut batch, &mut stats, &cancel).await;
        tracing::debug!(
            batches = stats.batches,
            signals = stats.signals,
            "event batcher drained"
        );
        stats
    }
}

async fn deliver(
    output: &mut Option<mpsc::Sender<SignalBatch>>,
    batch: &mut SignalBatch,
    stats: &mut BatcherStats,
    cancel: &CancellationController,
) {
    if batch.is_empty() {
        return;
    }
    let items = std::mem::take(batch);
    let Some(tx) = output.as_ref() else {
        return;
    };

    let len = items.len();
    let sent = if cancel.is_cancelled() {
        match tx.try_send(items) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => return,
            Err(TrySendError::Closed(_)) => false,
        }
    } else {
        tokio::select! {
            biased;
            sent = tx.send(items) => sent.is_ok(),
            _ = cancel.cancelled() => return,
        }
    };

    if !sent {
        tracing::debug!("signal consumer went away, discarding further batches");
        *output = None;
        return;
    }
    stats.batches += 1;
    stats.largest_batch = stats.largest_batch.max(len);
}
