//! Error types for scanning operations.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors: the scan never starts or cannot continue as a whole.
///
/// Problems with individual entries are [`ScanWarning`]s instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A worker task panicked or was aborted.
    #[error("Scan task failed: {message}")]
    TaskFailed { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether retrying the scan could plausibly succeed (after the user
    /// grants access or a busy resource frees up).
    pub fn is_resumable(&self) -> bool {
        match self {
            Self::PermissionDenied { .. } => true,
            Self::Io { source, .. } => {
                is_transient(source.kind()) || is_resumable_message(&source.to_string())
            }
            _ => false,
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::PermissionDenied
            | ErrorKind::ResourceBusy
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
    )
}

/// Classify a free-form error message as resumable.
///
/// Access denial and transient unavailability are resumable; anything else
/// is not.
pub fn is_resumable_message(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "permission denied",
        "access denied",
        "access is denied",
        "operation not permitted",
        "not permitted",
        "resource busy",
        "device or resource busy",
        "temporarily unavailable",
        "resource unavailable",
        "busy",
    ];

    let lower = message.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Resource was busy or temporarily unavailable.
    Busy,
}

/// Non-fatal problem with a single entry; the entry is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<PathBuf>, target: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {} -> {target}", path.display()),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a warning from an I/O error, picking the kind from the error.
    ///
    /// `fallback` is used when the error is neither a denial nor a busy
    /// resource.
    pub fn from_io(
        path: impl Into<PathBuf>,
        error: &std::io::Error,
        fallback: WarningKind,
    ) -> Self {
        let path = path.into();
        match error.kind() {
            ErrorKind::PermissionDenied => Self::permission_denied(path),
            ErrorKind::ResourceBusy | ErrorKind::WouldBlock => Self {
                message: format!("Resource busy: {error}"),
                path,
                kind: WarningKind::Busy,
            },
            _ => Self {
                message: format!("{}: {error}", path.display()),
                path,
                kind: fallback,
            },
        }
    }

    /// Whether the entry might be readable on a later attempt.
    pub fn is_resumable(&self) -> bool {
        matches!(self.kind, WarningKind::PermissionDenied | WarningKind::Busy)
    }
}
