//! Data exchanged with the deletion subsystem.
//!
//! Scans feed deletion: selected paths reference nodes of the last delivered
//! tree. Classification and the actual removal live behind
//! [`DeletionBackend`], which this workspace does not implement.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Verdict on deleting one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SafetyCheck {
    Safe,
    Protected { message: String },
    InUse { message: String },
    RequiresConfirmation { message: String },
}

impl SafetyCheck {
    /// Whether the path may be deleted without asking the user.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Whether the path may never be deleted.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Protected { .. } | Self::InUse { .. })
    }
}

/// A path that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub path: String,
    pub error: String,
}

/// Outcome of a bulk deletion. Partial failure is reported per path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDeletion>,
    pub space_freed: u64,
}

impl DeletionResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Collaborator that classifies and performs deletions.
pub trait DeletionBackend: Send + Sync {
    /// One verdict per input path, in input order.
    fn check_deletion_safety(&self, paths: &[PathBuf]) -> Vec<SafetyCheck>;

    /// Delete what can be deleted; never all-or-nothing.
    fn delete_items(&self, paths: &[PathBuf]) -> DeletionResult;
}
