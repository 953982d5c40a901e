//! Checks run before a scan is started.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use spacelens_core::ScanError;

/// Check that `path` exists and its metadata can be read.
pub fn validate_path(path: impl AsRef<Path>) -> Result<bool, ScanError> {
    let path = path.as_ref();
    fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
    Ok(true)
}

/// Check whether `path` can actually be read.
///
/// Returns `Ok(false)` when access is denied, so callers can ask the user
/// to grant it. Other failures are errors.
pub fn check_path_permissions(path: impl AsRef<Path>) -> Result<bool, ScanError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|e| ScanError::io(path, e))?;

    #[cfg(target_os = "macos")]
    {
        if is_protected_system_path(path) {
            return Ok(has_full_disk_access());
        }
    }

    if !metadata.is_dir() {
        return Ok(true);
    }

    match fs::read_dir(path) {
        // Reading one entry catches directories that open but refuse listing.
        Ok(mut entries) => match entries.next() {
            Some(Err(e)) if e.kind() == ErrorKind::PermissionDenied => Ok(false),
            _ => Ok(true),
        },
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(false),
        Err(e) => Err(ScanError::io(path, e)),
    }
}

#[cfg(target_os = "macos")]
fn is_protected_system_path(path: &Path) -> bool {
    const PREFIXES: &[&str] = &["/System", "/Library", "/private", "/usr"];

    path == Path::new("/")
        || path == Path::new("/Volumes/Macintosh HD")
        || PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// The TCC database is only readable with Full Disk Access.
#[cfg(target_os = "macos")]
fn has_full_disk_access() -> bool {
    fs::File::open("/Library/Application Support/com.apple.TCC/TCC.db").is_ok()
}
