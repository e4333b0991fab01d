//! Path helpers.
//!
//! Paths are plain `std::path` values. Equality and ordering are
//! component-wise, so `/a//b/` and `/a/b` compare equal. Nothing here touches
//! a filesystem or follows symlinks; see [`crate::resolve`] for that.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// The root path, `/`.
pub fn root() -> PathBuf {
    PathBuf::from("/")
}

/// True if `path` is exactly the root.
pub fn is_root(path: &Path) -> bool {
    path.has_root()
        && path
            .components()
            .all(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
}

/// Structural parent of `path`. The root is its own parent, and a single
/// relative component has the empty path as parent.
pub fn parent_path(path: &Path) -> PathBuf {
    if is_root(path) {
        return path.to_path_buf();
    }
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Parse a raw path argument from the kernel.
pub fn from_raw(raw: &OsStr) -> PathBuf {
    PathBuf::from(raw)
}

/// Lossy string form of a path, for messages.
pub fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Last component of `path` as a string, or the whole path if it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display(path))
}
