//! spacelens - Concurrent disk usage scanner.
//!
//! Usage:
//!   spacelens scan [PATH]      Scan with live progress and show a size tree
//!   spacelens export [PATH]    Export scan to JSON
//!   spacelens types [PATH]     Show space used per file category
//!   spacelens check [PATH]     Check that a path can be scanned
//!   spacelens --help           Show help

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use itertools::Itertools;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use spacelens_core::{FileNode, ScanConfig, ScanSignal, category_stats};
use spacelens_scan::{ScanEngine, ScanOutcome, check_path_permissions, validate_path};

#[derive(Parser)]
#[command(
    name = "spacelens",
    version,
    about = "Concurrent disk usage scanner",
    long_about = "spacelens walks a directory tree with bounded concurrency, \
                  streams progress while it runs, and reports where the space goes."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan with live progress and show a size tree
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Levels below the root to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Export scan results to JSON
    Export {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Levels below the root to include (defaults to everything)
        #[arg(short, long)]
        depth: Option<u32>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show space used per file category
    Types {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Check that a path exists and can be read
    Check {
        /// Path to check
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Traversal options shared by the scanning subcommands.
#[derive(Args)]
struct ScanArgs {
    /// Maximum simultaneous directory reads
    #[arg(short = 'j', long, default_value_t = spacelens_core::DEFAULT_CONCURRENCY_LIMIT)]
    concurrency: usize,

    /// Report logical file length instead of allocated blocks
    #[arg(long)]
    apparent_size: bool,

    /// Descend into other file systems
    #[arg(long)]
    cross_filesystems: bool,

    /// Skip entries whose name starts with a dot
    #[arg(long)]
    no_hidden: bool,

    /// Glob for entry names to skip (repeatable)
    #[arg(short, long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Stop traversing below this depth
    #[arg(long)]
    max_depth: Option<u32>,
}

impl ScanArgs {
    fn config(&self, root: &Path, tree_depth: u32) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder();
        builder
            .root(root)
            .concurrency_limit(self.concurrency)
            .apparent_size(self.apparent_size)
            .cross_filesystems(self.cross_filesystems)
            .include_hidden(!self.no_hidden)
            .ignore_patterns(self.ignore.clone())
            .max_depth(self.max_depth)
            .tree_depth(tree_depth);
        builder.build().context("Invalid scan options")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spacelens=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            path,
            depth,
            top,
            scan,
        } => run_scan(&path, depth, top, &scan).await,
        Command::Export {
            path,
            output,
            depth,
            scan,
        } => run_export(&path, output, depth.unwrap_or(u32::MAX), &scan).await,
        Command::Types { path, scan } => run_types(&path, &scan).await,
        Command::Check { path } => run_check(&path),
    }
}

/// Run a scan with live progress and display the tree.
async fn run_scan(path: &Path, depth: u32, top_n: usize, args: &ScanArgs) -> Result<()> {
    let config = args.config(path, depth)?;
    let engine = Arc::new(ScanEngine::with_config(config));

    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.cancel_scan();
            }
        })
    };

    let (handle, mut batches) = engine.scan_stream(path);
    while let Some(batch) = batches.next().await {
        for signal in batch {
            match signal {
                ScanSignal::Progress {
                    files_scanned,
                    total_size,
                    current_path,
                } => {
                    eprint!(
                        "\r\x1b[2KScanning... {} files, {}  {}",
                        files_scanned,
                        format_size(total_size),
                        truncate(&current_path.display().to_string(), 50)
                    );
                    let _ = std::io::stderr().flush();
                }
                ScanSignal::Cancelled { .. } => eprint!("\r\x1b[2KScan cancelled.\n"),
                ScanSignal::Complete { .. } => eprint!("\r\x1b[2K"),
                ScanSignal::NodeDiscovered { .. } => {}
            }
        }
    }
    interrupt.abort();

    let outcome = handle.await?.context("Scan failed")?;
    print_summary(&outcome);
    print_node(&outcome.root, 0, depth, top_n, outcome.root.size);
    print_warnings(&outcome);
    Ok(())
}

/// Export scan results to JSON.
async fn run_export(
    path: &Path,
    output: Option<PathBuf>,
    depth: u32,
    args: &ScanArgs,
) -> Result<()> {
    let mut config = args.config(path, depth)?;
    config.emit_node_signals = false;

    eprintln!("Scanning {}...", path.display());
    let outcome = ScanEngine::with_config(config)
        .start_scan(path, None)
        .await
        .context("Scan failed")?;

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "status": outcome.status,
        "stats": outcome.stats,
        "warnings": outcome.warnings,
        "root": outcome.root,
    }))?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Show per-category totals.
async fn run_types(path: &Path, args: &ScanArgs) -> Result<()> {
    let mut config = args.config(path, u32::MAX)?;
    config.emit_node_signals = false;

    eprintln!("Scanning {}...", path.display());
    let outcome = ScanEngine::with_config(config)
        .start_scan(path, None)
        .await
        .context("Scan failed")?;

    let stats = category_stats(&outcome.root);
    let max_size = stats.first().map(|s| s.total_size).unwrap_or(0);

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", outcome.root.path.display(), format_size(outcome.root.size));
    println!("{}", "─".repeat(60));
    for category in &stats {
        let ratio = if max_size > 0 {
            category.total_size as f64 / max_size as f64
        } else {
            0.0
        };
        println!(
            "   {:<12} {:>10} {:>8} files  {}",
            category.category.to_string(),
            format_size(category.total_size),
            category.file_count,
            make_bar(ratio, 20)
        );
    }
    print_warnings(&outcome);
    Ok(())
}

/// Report whether a path can be scanned.
fn run_check(path: &Path) -> Result<()> {
    match validate_path(path) {
        Ok(_) => println!(" {}: exists", path.display()),
        Err(err) => {
            println!(" {}: {}", path.display(), err);
            if err.is_resumable() {
                println!(" Grant access and try again.");
            }
            return Ok(());
        }
    }

    match check_path_permissions(path) {
        Ok(true) => println!(" {}: readable", path.display()),
        Ok(false) => println!(" {}: access denied, grant access and try again", path.display()),
        Err(err) => println!(" {}: {}", path.display(), err),
    }
    Ok(())
}

fn print_summary(outcome: &ScanOutcome) {
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        outcome.root.path.display(),
        format_size(outcome.stats.total_size)
    );
    println!(
        " {} files, {} directories",
        outcome.stats.files_scanned, outcome.stats.dirs_scanned
    );
    println!(
        " Scanned in {:.2}s ({:?})",
        outcome.duration.as_secs_f64(),
        outcome.status
    );
    println!("{}", "─".repeat(60));
    println!();
}

fn print_warnings(outcome: &ScanOutcome) {
    if outcome.warnings.is_empty() {
        return;
    }
    let by_kind = outcome
        .warnings
        .iter()
        .counts_by(|w| w.kind)
        .into_iter()
        .sorted_by_key(|(_, count)| std::cmp::Reverse(*count))
        .map(|(kind, count)| format!("{count} {kind:?}"))
        .join(", ");
    println!();
    println!(
        "{} warning(s) during scan: {}",
        outcome.warnings.len(),
        by_kind
    );
}

/// Print a node and its children.
fn print_node(node: &FileNode, depth: u32, max_depth: u32, top_n: usize, root_size: u64) {
    let indent = "  ".repeat(depth as usize);
    let ratio = if root_size > 0 {
        node.size as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let bar = make_bar(ratio / 100.0, 10);

    let name = if depth == 0 {
        node.path.display().to_string()
    } else {
        node.name.to_string()
    };

    let marker = match (node.is_directory, node.truncated) {
        (true, true) => "/…",
        (true, false) => "/",
        _ if node.hard_link_of.is_some() => " (link)",
        _ => "",
    };

    println!(
        "{}{}{:<40} {:>10} {:>5.1}% {}",
        indent,
        if node.is_directory { "▼ " } else { "  " },
        truncate(&format!("{}{}", name, marker), 40),
        format_size(node.size),
        ratio,
        bar
    );

    if node.is_directory && depth < max_depth {
        for child in node.children.iter().take(top_n) {
            print_node(child, depth + 1, max_depth, top_n, root_size);
        }

        let remaining = node.children.len().saturating_sub(top_n);
        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length in characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
