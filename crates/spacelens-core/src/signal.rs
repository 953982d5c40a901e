//! Signals streamed to the consuming layer while a scan runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::node::NodeSummary;

/// One message on the scan signal stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanSignal {
    /// Running totals, emitted on a fixed cadence.
    Progress {
        current_path: PathBuf,
        files_scanned: u64,
        total_size: u64,
    },
    /// A classified entry. Arrival order between siblings is unspecified.
    NodeDiscovered {
        node: NodeSummary,
        parent_path: Option<PathBuf>,
    },
    /// Traversal finished; always the last signal of a completed scan.
    Complete { files_scanned: u64, total_size: u64 },
    /// Traversal was cancelled; always the last signal of a cancelled scan.
    Cancelled { files_scanned: u64, total_size: u64 },
}

impl ScanSignal {
    /// Whether this signal ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Cancelled { .. })
    }
}

/// Signals flushed together by the batcher.
pub type SignalBatch = Vec<ScanSignal>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileType;

    #[test]
    fn test_signal_json_shape() {
        let signal = ScanSignal::Complete {
            files_scanned: 3,
            total_size: 650,
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["total_size"], 650);
        assert!(signal.is_terminal());
    }

    #[test]
    fn test_node_discovered_json_shape() {
        let signal = ScanSignal::NodeDiscovered {
            node: NodeSummary {
                name: "a.mp3".into(),
                path: PathBuf::from("/m/a.mp3"),
                size: 10,
                is_directory: false,
                file_type: FileType::Audio,
            },
            parent_path: Some(PathBuf::from("/m")),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "node_discovered");
        assert_eq!(json["node"]["file_type"], "Audio");
        assert_eq!(json["parent_path"], "/m");
        assert!(!signal.is_terminal());
    }
}
