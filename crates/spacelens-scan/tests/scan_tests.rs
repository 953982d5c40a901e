//! End-to-end scans against real temporary directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use spacelens_scan::{
    ScanConfig, ScanEngine, ScanError, ScanSignal, ScanStatus, SignalBatch, WarningKind,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0u8; len]).unwrap();
}

fn apparent_config() -> ScanConfig {
    let mut config = ScanConfig::new(".");
    config.apparent_size = true;
    config
}

/// root/a/x (100), root/a/y (200), root/b/c/z (300), root/top (50)
fn sample_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("a/x"), 100);
    write(&temp.path().join("a/y"), 200);
    write(&temp.path().join("b/c/z"), 300);
    write(&temp.path().join("top"), 50);
    temp
}

fn wide_tree(dirs: usize, files_per_dir: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for d in 0..dirs {
        for f in 0..files_per_dir {
            write(&temp.path().join(format!("d{d}/f{f}")), 1);
        }
    }
    temp
}

async fn drain(mut rx: mpsc::Receiver<SignalBatch>) -> Vec<ScanSignal> {
    let mut signals = Vec::new();
    while let Some(batch) = rx.recv().await {
        signals.extend(batch);
    }
    signals
}

#[tokio::test]
async fn test_three_files_and_subdirectory() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("small"), 100);
    write(&temp.path().join("medium"), 200);
    write(&temp.path().join("large"), 300);
    write(&temp.path().join("sub/tiny"), 50);

    let engine = ScanEngine::with_config(apparent_config());
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert_eq!(outcome.root.size, 650);
    let sub = outcome.root.find(&outcome.root.path.join("sub")).unwrap();
    assert_eq!(sub.size, 50);
    assert!(sub.is_directory);
    assert_eq!(outcome.root.children[0].name, "large");
}

#[tokio::test]
async fn test_sizes_aggregate_bottom_up() {
    let temp = sample_tree();
    let engine = ScanEngine::with_config(apparent_config());
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.root.size, 650);
    assert_eq!(outcome.stats.total_size, 650);
    assert_eq!(outcome.stats.files_scanned, 4);

    let root = &outcome.root.path;
    assert_eq!(outcome.root.find(&root.join("a")).unwrap().size, 300);
    assert_eq!(outcome.root.find(&root.join("b")).unwrap().size, 300);
    assert_eq!(outcome.root.find(&root.join("b/c")).unwrap().size, 300);
}

#[tokio::test]
async fn test_full_depth_tree_is_consistent() {
    let temp = sample_tree();
    write(&temp.path().join("b/c/d/e/f/deep"), 7);

    let mut config = apparent_config();
    config.tree_depth = 32;
    let engine = ScanEngine::with_config(config);
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert!(outcome.root.sizes_consistent());
    assert_eq!(outcome.root.size, outcome.stats.total_size);
    assert_eq!(outcome.root.file_count(), outcome.stats.files_scanned);
}

#[tokio::test]
async fn test_default_depth_truncates_and_expands() {
    let temp = sample_tree();
    let engine = ScanEngine::with_config(apparent_config());
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    // root (0) -> b (1) -> c (2): c is at the cutoff.
    let c_path = outcome.root.path.join("b/c");
    let c = outcome.root.find(&c_path).unwrap();
    assert!(c.truncated);
    assert!(c.children.is_empty());
    assert_eq!(c.size, 300);

    let expanded = engine.expand(&c_path, 1).unwrap();
    assert_eq!(expanded.size, 300);
    assert_eq!(expanded.children.len(), 1);
    assert_eq!(expanded.children[0].name, "z");
    assert!(!expanded.truncated);

    // The same expansion again comes straight from memoized sizes.
    let cached = engine.session().unwrap().cached_sizes();
    engine.expand(&c_path, 1).unwrap();
    assert_eq!(engine.session().unwrap().cached_sizes(), cached);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hard_links_counted_once() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("one/data.bin"), 4096);
    fs::create_dir(temp.path().join("two")).unwrap();
    fs::hard_link(
        temp.path().join("one/data.bin"),
        temp.path().join("two/data-link.bin"),
    )
    .unwrap();

    let mut config = apparent_config();
    config.tree_depth = 8;
    let engine = ScanEngine::with_config(config);
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert_eq!(outcome.stats.total_size, 4096);
    assert_eq!(outcome.stats.files_scanned, 1);
    assert_eq!(outcome.root.size, 4096);

    let root = &outcome.root.path;
    let first = outcome.root.find(&root.join("one/data.bin"));
    let second = outcome.root.find(&root.join("two/data-link.bin"));
    assert!(first.is_some() && second.is_some());

    // Whichever path claimed the inode first carries the size.
    let (primary, alias) = match (first, second) {
        (Some(a), Some(b)) if a.hard_link_of.is_none() => (a, b),
        (Some(a), Some(b)) => (b, a),
        _ => unreachable!(),
    };
    assert_eq!(primary.size, 4096);
    assert_eq!(alias.size, 0);
    assert_eq!(alias.hard_link_of.as_deref(), Some(primary.path.as_path()));
    assert!(outcome.root.sizes_consistent());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hard_links_across_siblings_are_stable() {
    // Eight files, each linked from every one of twelve sibling directories.
    let temp = TempDir::new().unwrap();
    for f in 0..8 {
        write(&temp.path().join(format!("d0/f{f}")), 1000 + f);
    }
    for d in 1..12 {
        fs::create_dir(temp.path().join(format!("d{d}"))).unwrap();
        for f in 0..8 {
            fs::hard_link(
                temp.path().join(format!("d0/f{f}")),
                temp.path().join(format!("d{d}/f{f}")),
            )
            .unwrap();
        }
    }
    let expected: u64 = (0..8).map(|f| 1000 + f).sum();

    let mut config = apparent_config();
    config.concurrency_limit = 12;
    let engine = ScanEngine::with_config(config);
    for _ in 0..10 {
        let outcome = engine.start_scan(temp.path(), None).await.unwrap();
        assert_eq!(outcome.stats.total_size, expected);
        assert_eq!(outcome.stats.files_scanned, 8);
        assert_eq!(outcome.root.size, expected);

        let session = engine.session().unwrap();
        assert_eq!(session.registry().alias_count(), 8 * 11);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_cycle_terminates() {
    let temp = sample_tree();
    std::os::unix::fs::symlink(temp.path(), temp.path().join("a/back-to-root")).unwrap();
    std::os::unix::fs::symlink(temp.path().join("b"), temp.path().join("b/c/up")).unwrap();

    let engine = ScanEngine::with_config(apparent_config());
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    // Symlinks are leaves with no size.
    assert_eq!(outcome.stats.total_size, 650);
    assert_eq!(outcome.stats.files_scanned, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_limit() {
    let temp = wide_tree(40, 5);
    let mut config = apparent_config();
    config.concurrency_limit = 3;
    let engine = ScanEngine::with_config(config);
    let outcome = engine.start_scan(temp.path(), None).await.unwrap();

    assert_eq!(outcome.stats.files_scanned, 200);
    let session = engine.session().unwrap();
    assert!(session.limiter().peak() <= 3);
    assert!(session.limiter().peak() >= 1);
    assert_eq!(session.limiter().in_flight(), 0);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_matches_complete() {
    let temp = wide_tree(20, 20);
    let mut config = apparent_config();
    config.progress_interval_ms = 1;
    config.batch_size = 10;
    let engine = ScanEngine::with_config(config);

    let (tx, rx) = mpsc::channel(4);
    let consumer = tokio::spawn(drain(rx));
    let outcome = engine.start_scan(temp.path(), Some(tx)).await.unwrap();
    let signals = consumer.await.unwrap();

    let mut last = (0, 0);
    for signal in &signals {
        if let ScanSignal::Progress {
            files_scanned,
            total_size,
            ..
        } = signal
        {
            assert!(*files_scanned >= last.0);
            assert!(*total_size >= last.1);
            last = (*files_scanned, *total_size);
        }
    }

    match signals.last() {
        Some(ScanSignal::Complete {
            files_scanned,
            total_size,
        }) => {
            assert_eq!(*files_scanned, 400);
            assert_eq!(*total_size, 400);
            assert!(last.0 <= *files_scanned);
            assert_eq!(*files_scanned, outcome.stats.files_scanned);
        }
        other => panic!("expected complete, got {other:?}"),
    }

    let discovered = signals
        .iter()
        .filter(|s| matches!(s, ScanSignal::NodeDiscovered { .. }))
        .count();
    // 20 directories and 400 files.
    assert_eq!(discovered, 420);
}

#[tokio::test]
async fn test_cancel_after_first_batch() {
    let temp = wide_tree(30, 30);
    let mut config = apparent_config();
    config.batch_size = 1;
    config.signal_buffer = 1;
    config.concurrency_limit = 1;
    let engine = Arc::new(ScanEngine::with_config(config));

    let (tx, mut rx) = mpsc::channel(1);
    let scan = {
        let engine = Arc::clone(&engine);
        let root = temp.path().to_path_buf();
        tokio::spawn(async move { engine.start_scan(root, Some(tx)).await })
    };

    let first = rx.recv().await.unwrap();
    assert!(!first.is_empty());
    engine.cancel_scan();
    engine.cancel_scan();

    let rest = drain(rx).await;
    let outcome = scan.await.unwrap().unwrap();

    assert_eq!(outcome.status, ScanStatus::Cancelled);
    assert!(matches!(rest.last(), Some(ScanSignal::Cancelled { .. })));
    assert!(rest.iter().all(|s| !matches!(s, ScanSignal::Complete { .. })));

    let session = engine.session().unwrap();
    // 1 root + 30 directories + 900 files.
    assert!(session.registry().len() < 931);
    // A partial tree is still available.
    assert!(outcome.root.is_directory);
}

#[tokio::test]
async fn test_new_scan_cancels_previous() {
    let first_tree = wide_tree(30, 30);
    let second_tree = sample_tree();
    let mut config = apparent_config();
    config.batch_size = 1;
    config.signal_buffer = 1;
    config.concurrency_limit = 1;
    let engine = Arc::new(ScanEngine::with_config(config));

    // Nobody reads the first scan's batches, so it stalls until cancelled.
    let (stalled_tx, _stalled_rx) = mpsc::channel(1);
    let first = {
        let engine = Arc::clone(&engine);
        let root = first_tree.path().to_path_buf();
        tokio::spawn(async move { engine.start_scan(root, Some(stalled_tx)).await })
    };
    while engine.session().is_none() {
        tokio::task::yield_now().await;
    }

    let second = engine.start_scan(second_tree.path(), None).await.unwrap();
    assert_eq!(second.status, ScanStatus::Completed);
    assert_eq!(second.stats.total_size, 650);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, ScanStatus::Cancelled);
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::new();
    let err = engine
        .start_scan(temp.path().join("missing"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::NotFound { .. }));
    assert!(!err.is_resumable());
    assert!(engine.session().is_none());
}

#[tokio::test]
async fn test_file_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("plain.txt");
    write(&file, 3);

    let engine = ScanEngine::new();
    let err = engine.start_scan(&file, None).await.unwrap_err();
    assert!(matches!(err, ScanError::NotADirectory { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp = sample_tree();
    let locked = temp.path().join("locked");
    write(&locked.join("secret"), 10);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    // Permission bits do not apply to root.
    let enforced = fs::read_dir(&locked).is_err();

    let engine = ScanEngine::with_config(apparent_config());
    let outcome = engine.start_scan(temp.path(), None).await;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let outcome = outcome.unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    if enforced {
        assert_eq!(outcome.stats.total_size, 650);
        assert_eq!(outcome.stats.errors_count, 1);
        let warning = &outcome.warnings[0];
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.is_resumable());
        // The directory itself is still in the tree.
        assert!(outcome.root.find(&outcome.root.path.join("locked")).is_some());
    }
}

#[tokio::test]
async fn test_scan_stream_ends_with_terminal() {
    use tokio_stream::StreamExt;

    let temp = sample_tree();
    let engine = Arc::new(ScanEngine::with_config(apparent_config()));
    let (handle, stream) = engine.scan_stream(temp.path());

    let batches: Vec<SignalBatch> = stream.collect().await;
    let outcome = handle.await.unwrap().unwrap();

    let last = batches.last().and_then(|b| b.last()).unwrap();
    assert!(matches!(last, ScanSignal::Complete { total_size: 650, .. }));
    assert!(batches.iter().all(|b| b.len() <= 100));
    assert!(outcome.is_complete());
}
