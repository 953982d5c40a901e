//! Extension-based file categories.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::tree::FileNode;

/// Broad category of a file, derived from its extension.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum FileType {
    Document,
    Image,
    Video,
    Audio,
    Archive,
    Executable,
    SystemFile,
    Code,
    #[default]
    Other,
}

impl FileType {
    /// Classify a path by its (case-insensitive) extension.
    ///
    /// Files inside a photo library bundle are images regardless of their
    /// database or plist extensions.
    pub fn classify(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_ascii_lowercase());

        let lossy = path.to_string_lossy().to_lowercase();
        let in_photo_library = lossy.contains(".photoslibrary") || lossy.contains("photo booth");

        match extension.as_deref() {
            Some("pdf" | "doc" | "docx" | "txt" | "rtf" | "odt") => Self::Document,
            Some(
                "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" | "heic" | "heif"
                | "raw" | "cr2" | "nef" | "dng" | "tiff" | "tif",
            ) => Self::Image,
            Some(
                "photos" | "photoslibrary" | "db" | "sqlite" | "sqlite-shm" | "sqlite-wal"
                | "plist",
            ) if in_photo_library =>
            {
                Self::Image
            }
            Some("mp4" | "avi" | "mov" | "mkv" | "flv" | "wmv" | "webm" | "m4v") => Self::Video,
            Some("mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma") => Self::Audio,
            Some("zip" | "tar" | "gz" | "rar" | "7z" | "bz2" | "xz") => Self::Archive,
            Some("exe" | "app" | "bin" | "dll" | "so" | "dylib") => Self::Executable,
            Some(
                "rs" | "ts" | "tsx" | "js" | "jsx" | "py" | "java" | "c" | "cpp" | "h" | "hpp"
                | "go" | "rb" | "php" | "swift" | "kt" | "cs",
            ) => Self::Code,
            Some("sys" | "ini" | "cfg" | "conf" | "log") => Self::SystemFile,
            _ => Self::Other,
        }
    }
}

/// Size and count of the files in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: FileType,
    pub total_size: u64,
    pub file_count: u64,
}

/// Aggregate file leaves of an output tree by category.
///
/// Only files present in the tree are visited, so a depth-limited tree
/// yields partial numbers. Result is ordered by total size, largest first.
pub fn category_stats(root: &FileNode) -> Vec<CategoryStats> {
    let mut totals: HashMap<FileType, (u64, u64)> = HashMap::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_directory {
            stack.extend(node.children.iter());
        } else if node.hard_link_of.is_none() {
            let entry = totals.entry(node.file_type).or_insert((0, 0));
            entry.0 += node.size;
            entry.1 += 1;
        }
    }

    let mut stats: Vec<CategoryStats> = totals
        .into_iter()
        .map(|(category, (total_size, file_count))| CategoryStats {
            category,
            total_size,
            file_count,
        })
        .collect();
    stats.sort_by(|a, b| b.total_size.cmp(&a.total_size).then(a.file_count.cmp(&b.file_count)));
    stats
}
