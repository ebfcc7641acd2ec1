// src/watch/path_utils.rs

use std::path::Path;

/// Convert `path` into a string relative to `root`, with forward slashes.
///
/// Tries a plain `strip_prefix` first, then again on canonicalized paths
/// (macOS reports `/private/var/...` for `/var/...`). Returns `None` if the
/// path is not under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slashes(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    let path_canon = path.canonicalize().ok()?;
    path_canon
        .strip_prefix(&root_canon)
        .ok()
        .map(to_slashes)
}

fn to_slashes(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
