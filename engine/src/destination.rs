//! Destination path derivation.

use std::path::{Component, Path, PathBuf};

use crate::error::TransferError;

/// Folder name used when the source root has no named components.
const BARE_ROOT_FOLDER: &str = "root";

/// Compute where `source` lands under `destination_root`.
///
/// With `preserve_source_root`, the absolute source root is flattened into a
/// single folder (see [`sanitize_root`]) between the destination root and the
/// relative path, so `/src/a/b.txt` copied from `/src` to `/dst` lands at
/// `/dst/src/a/b.txt`. Otherwise it lands at `/dst/a/b.txt`.
pub fn resolve_destination(
    source: &Path,
    source_root: &Path,
    destination_root: &Path,
    preserve_source_root: bool,
) -> Result<PathBuf, TransferError> {
    let relative = source
        .strip_prefix(source_root)
        .map_err(|_| TransferError::OutsideSourceRoot {
            path: source.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;

    let mut destination = destination_root.to_path_buf();
    if preserve_source_root {
        destination.push(sanitize_root(source_root));
    }
    destination.push(relative);
    Ok(normalize(&destination))
}

/// Flatten an absolute path into one folder name.
///
/// Drive prefixes and the root marker are dropped and the remaining
/// components are joined with `_`: `/home/user/src` becomes
/// `home_user_src`, `C:\data` becomes `data`.
pub fn sanitize_root(root: &Path) -> String {
    let parts: Vec<String> = root
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        BARE_ROOT_FOLDER.to_string()
    } else {
        parts.join("_")
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` against earlier
/// components. Rebuilding from components also yields host separators.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_preserving_root() {
        let dest = resolve_destination(
            Path::new("/src/a/b.txt"),
            Path::new("/src"),
            Path::new("/dst"),
            false,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/a/b.txt"));
    }

    #[test]
    fn test_resolve_preserving_root() {
        let dest = resolve_destination(
            Path::new("/src/a/b.txt"),
            Path::new("/src"),
            Path::new("/dst"),
            true,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/src/a/b.txt"));
    }

    #[test]
    fn test_resolve_nested_root_flattens_to_one_segment() {
        let dest = resolve_destination(
            Path::new("/data/in/x.log"),
            Path::new("/data/in"),
            Path::new("/dst"),
            true,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/data_in/x.log"));
    }

    #[test]
    fn test_resolve_outside_root_fails() {
        let result = resolve_destination(
            Path::new("/other/b.txt"),
            Path::new("/src"),
            Path::new("/dst"),
            false,
        );
        assert!(matches!(result, Err(TransferError::OutsideSourceRoot { .. })));
    }

    #[test]
    fn test_sanitize_root() {
        assert_eq!(sanitize_root(Path::new("/src")), "src");
        assert_eq!(sanitize_root(Path::new("/home/user/src/")), "home_user_src");
        assert_eq!(sanitize_root(Path::new("/")), "root");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/dst/./a/../b.txt")), PathBuf::from("/dst/b.txt"));
    }
}
