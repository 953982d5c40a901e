//! Blocking directory inspection. Runs on the blocking pool, one call per
//! directory, under a single limiter permit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use globset::GlobSet;
use spacelens_core::{InodeInfo, NodeKind, ScanConfig, ScanError, ScanWarning, WarningKind};

/// Metadata of one directory entry, read without following symlinks.
#[derive(Debug, Clone)]
pub(crate) struct EntryMeta {
    pub path: PathBuf,
    pub name: CompactString,
    pub kind: NodeKind,
    pub size: u64,
    pub inode: Option<InodeInfo>,
    pub nlink: u64,
    pub modified: SystemTime,
}

/// Everything read from one directory.
#[derive(Debug, Default)]
pub(crate) struct Listing {
    pub entries: Vec<EntryMeta>,
    pub warnings: Vec<ScanWarning>,
}

/// Per-session rules deciding which entries are listed and how they are sized.
#[derive(Debug)]
pub(crate) struct EntryFilter {
    include_hidden: bool,
    ignore: GlobSet,
    cross_filesystems: bool,
    root_device: u64,
    apparent_size: bool,
}

impl EntryFilter {
    pub fn new(config: &ScanConfig, root_device: u64) -> Result<Self, ScanError> {
        Ok(Self {
            include_hidden: config.include_hidden,
            ignore: config.ignore_matcher()?,
            cross_filesystems: config.cross_filesystems,
            root_device,
            apparent_size: config.apparent_size,
        })
    }

    fn skips_name(&self, name: &str) -> bool {
        (!self.include_hidden && name.starts_with('.')) || self.ignore.is_match(name)
    }

    fn size_of(&self, metadata: &fs::Metadata) -> u64 {
        if self.apparent_size {
            metadata.len()
        } else {
            allocated_size(metadata)
        }
    }
}

/// List `dir` and read metadata for each entry.
///
/// Failing to open the directory is returned as an error; problems with
/// single entries become warnings and the entry is left out.
pub(crate) fn read_directory(dir: &Path, filter: &EntryFilter) -> io::Result<Listing> {
    let mut listing = Listing::default();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                listing
                    .warnings
                    .push(ScanWarning::from_io(dir, &err, WarningKind::ReadError));
                continue;
            }
        };

        let name = CompactString::new(entry.file_name().to_string_lossy());
        if filter.skips_name(&name) {
            continue;
        }

        let path = entry.path();
        // Does not traverse symlinks.
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                listing
                    .warnings
                    .push(ScanWarning::from_io(&path, &err, WarningKind::MetadataError));
                continue;
            }
        };

        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            let target = fs::read_link(&path)
                .map(|p| CompactString::new(p.to_string_lossy()))
                .unwrap_or_default();
            let broken = fs::metadata(&path).is_err();
            if broken {
                listing
                    .warnings
                    .push(ScanWarning::broken_symlink(&path, &target));
            }
            NodeKind::Symlink { target, broken }
        } else if file_type.is_dir() {
            if !filter.cross_filesystems && get_dev(&metadata) != filter.root_device {
                tracing::debug!(path = %path.display(), "skipping directory on another device");
                continue;
            }
            NodeKind::Directory
        } else if file_type.is_file() {
            NodeKind::File
        } else {
            NodeKind::Other
        };

        let size = match kind {
            NodeKind::File | NodeKind::Other => filter.size_of(&metadata),
            _ => 0,
        };
        let inode = match kind {
            NodeKind::Symlink { .. } => None,
            _ => inode_info(&metadata),
        };

        listing.entries.push(EntryMeta {
            path,
            name,
            kind,
            size,
            inode,
            nlink: get_nlink(&metadata),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    Ok(listing)
}

// Cross-platform metadata helpers

/// Get the device ID from metadata.
#[cfg(unix)]
pub(crate) fn get_dev(metadata: &fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
pub(crate) fn get_dev(_metadata: &fs::Metadata) -> u64 {
    0 // Windows doesn't have device IDs in the same way
}

/// Device/inode identity, where the platform has one.
#[cfg(unix)]
pub(crate) fn inode_info(metadata: &fs::Metadata) -> Option<InodeInfo> {
    Some(InodeInfo::new(metadata.ino(), metadata.dev()))
}

#[cfg(not(unix))]
pub(crate) fn inode_info(_metadata: &fs::Metadata) -> Option<InodeInfo> {
    None
}

/// Get the number of hard links from metadata.
#[cfg(unix)]
fn get_nlink(metadata: &fs::Metadata) -> u64 {
    metadata.nlink()
}

#[cfg(not(unix))]
fn get_nlink(_metadata: &fs::Metadata) -> u64 {
    1 // Assume single link on Windows
}

/// Bytes actually allocated: 512-byte blocks on Unix.
#[cfg(unix)]
fn allocated_size(metadata: &fs::Metadata) -> u64 {
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_size(metadata: &fs::Metadata) -> u64 {
    metadata.len()
}
