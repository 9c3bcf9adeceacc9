//! Filesystem operations module.
//!
//! Low-level helpers used by the transform pipeline:
//! - Creating parent directories
//! - Moving an existing destination aside for versioning
//! - Preserving modification times

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info};

use crate::attributes::split_extension;
use crate::error::TransferError;

/// Format of the timestamp inserted into versioned file names.
pub const VERSION_TIMESTAMP_FORMAT: &str = "_%Y%m%d_%H%M%S";

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns TransferError if the parent exists but is not a directory, or if
/// creating it fails.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), TransferError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Empty parent means a bare relative file name
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(TransferError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| TransferError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(TransferError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Name an existing file would be renamed to when versioned at `stamp`.
///
/// `b.txt` becomes `b_20240102_030405.txt`; a name without an extension
/// just gets the suffix.
pub fn versioned_name(file_name: &str, stamp: DateTime<Local>) -> String {
    let timestamp = stamp.format(VERSION_TIMESTAMP_FORMAT);
    match split_extension(file_name) {
        (stem, "") => format!("{stem}{timestamp}"),
        (stem, ext) => format!("{stem}{timestamp}.{ext}"),
    }
}

/// Move an existing file at `path` out of the way.
///
/// The new name carries the file's own modification time (or now, if that
/// cannot be read). If that name is taken, `_1`, `_2`, ... is appended to
/// the stem. Returns the new path, or `None` when nothing existed or the
/// rename failed; failure is logged and not fatal.
pub fn version_existing(path: &Path) -> Option<PathBuf> {
    let metadata = fs::metadata(path).ok()?;
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let stamp: DateTime<Local> = metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Local::now());
    let base = versioned_name(&file_name, stamp);
    let mut versioned = path.with_file_name(&base);
    let mut counter = 1u32;
    while fs::symlink_metadata(&versioned).is_ok() {
        versioned = path.with_file_name(numbered_name(&base, counter));
        counter += 1;
    }

    info!(from = %path.display(), to = %versioned.display(), "Renaming existing file for versioning");
    match fs::rename(path, &versioned) {
        Ok(()) => Some(versioned),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to rename existing file for versioning");
            None
        }
    }
}

fn numbered_name(file_name: &str, counter: u32) -> String {
    match split_extension(file_name) {
        (stem, "") => format!("{stem}_{counter}"),
        (stem, ext) => format!("{stem}_{counter}.{ext}"),
    }
}

/// Copy a modification time onto `path`. Best effort.
pub fn preserve_mtime(path: &Path, mtime: SystemTime) {
    let _ = filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime));
}
