//! Snapshot of the file attributes filters and records care about.

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::Path;

/// Owner name reported when the platform cannot resolve one.
pub const UNKNOWN_OWNER: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Size in bytes
    pub size: u64,
    /// Creation time; falls back to modification time where the
    /// filesystem does not record birth time
    pub created: DateTime<Local>,
    pub modified: DateTime<Local>,
    pub owner: String,
}

impl FileAttributes {
    /// Read attributes for `path`, following symlinks.
    pub fn read(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified: DateTime<Local> = metadata.modified()?.into();
        let created = metadata
            .created()
            .map(DateTime::<Local>::from)
            .unwrap_or(modified);

        Ok(FileAttributes {
            size: metadata.len(),
            created,
            modified,
            owner: owner_name(&metadata),
        })
    }

    /// Size in whole kilobytes (rounded down).
    pub fn size_kb(&self) -> u64 {
        self.size / 1024
    }
}

#[cfg(unix)]
fn owner_name(metadata: &fs::Metadata) -> String {
    use nix::unistd::{Uid, User};
    use std::os::unix::fs::MetadataExt;

    match User::from_uid(Uid::from_raw(metadata.uid())) {
        Ok(Some(user)) => user.name,
        _ => UNKNOWN_OWNER.to_string(),
    }
}

#[cfg(not(unix))]
fn owner_name(_metadata: &fs::Metadata) -> String {
    UNKNOWN_OWNER.to_string()
}

/// Split a file name into (stem, extension) at the last dot.
///
/// A leading dot (`.profile`) or a trailing dot (`name.`) means the name
/// has no extension.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx < file_name.len() - 1 => {
            (&file_name[..idx], &file_name[idx + 1..])
        }
        _ => (file_name, ""),
    }
}
