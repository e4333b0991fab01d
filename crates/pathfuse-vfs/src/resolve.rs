//! Path resolution on top of a [`FileSystem`]'s primitives.
//!
//! Only `symlink_status`, `read_symlink`, `status` and `create_directory` are
//! used, so the same algorithms work for in-memory, network and passthrough
//! filesystems alike.

use std::path::{Component, Path, PathBuf};

use crate::error::{VfsError, VfsResult};
use crate::ops::FileSystem;
use crate::path::{parent_path, root};

/// Upper bound on symlink expansions during one resolution.
pub const MAX_SYMLINK_EXPANSIONS: usize = 32;

/// Lexically absolutize `path` against `current`.
///
/// `.` is dropped and `..` pops the last component, never past `/`.
pub fn absolute(current: &Path, path: &Path) -> PathBuf {
    let mut output = PathBuf::new();
    if path.is_relative() {
        output.push(current);
    }
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => output = parent_path(&output),
            other => output.push(other.as_os_str()),
        }
    }
    output
}

/// Resolve `path` to an absolute path free of `.`, `..` and symlinks.
///
/// Fails with an I/O error once more than [`MAX_SYMLINK_EXPANSIONS`] links
/// have been followed, which is how cycles surface.
pub fn canonical<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> VfsResult<PathBuf> {
    let mut expansions = 0;
    canonicalize(fs, path, &mut expansions)
}

fn canonicalize<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    expansions: &mut usize,
) -> VfsResult<PathBuf> {
    let mut output = if path.is_relative() {
        fs.current_path()
    } else {
        PathBuf::new()
    };

    for component in path.components() {
        match component {
            Component::Prefix(_) => {}
            Component::RootDir => output = root(),
            Component::CurDir => {}
            Component::ParentDir => output = parent_path(&output),
            Component::Normal(name) => {
                output.push(name);
                if !is_link(fs, &output)? {
                    continue;
                }

                *expansions += 1;
                if *expansions > MAX_SYMLINK_EXPANSIONS {
                    return Err(VfsError::io(format!(
                        "too many levels of symbolic links: {}",
                        path.display()
                    )));
                }

                let target = link_target(fs, &output)?;
                tracing::trace!(
                    link = %output.display(),
                    target = %target.display(),
                    "expanding symlink"
                );
                output = canonicalize(fs, &target, expansions)?;
            }
        }
    }
    Ok(output)
}

/// A missing entry is simply not a link.
fn is_link<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> VfsResult<bool> {
    match fs.symlink_status(path) {
        Ok(status) => Ok(status.is_symlink()),
        Err(VfsError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read a link's target; relative targets are taken from the link's directory.
fn link_target<F: FileSystem + ?Sized>(fs: &F, link: &Path) -> VfsResult<PathBuf> {
    let target = fs.read_symlink(link)?;
    if target.is_relative() {
        Ok(parent_path(link).join(target))
    } else {
        Ok(target)
    }
}

/// True if both paths name the same entry after one level of link following.
///
/// Entries of "other" type (devices, fifos, sockets) are never equivalent.
pub fn equivalent<F: FileSystem + ?Sized>(fs: &F, p1: &Path, p2: &Path) -> VfsResult<bool> {
    let stat1 = fs.symlink_status(p1)?;
    let stat2 = fs.symlink_status(p2)?;
    let path1 = if stat1.is_symlink() {
        link_target(fs, &fs.absolute(p1))?
    } else {
        p1.to_path_buf()
    };
    let path2 = if stat2.is_symlink() {
        link_target(fs, &fs.absolute(p2))?
    } else {
        p2.to_path_buf()
    };
    Ok(fs.absolute(&path1) == fs.absolute(&path2) && !stat1.is_other() && !stat2.is_other())
}

/// Walk `path` from the root, creating each missing prefix.
pub fn create_directories<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> VfsResult<()> {
    let full = fs.absolute(path);
    let mut prefix = PathBuf::new();
    for component in full.components() {
        prefix.push(component.as_os_str());
        if !fs.exists(&prefix)? {
            tracing::trace!(path = %prefix.display(), "creating directory");
            fs.create_directory(&prefix)?;
        }
    }
    if !fs.exists(&full)? {
        return Err(VfsError::io(format!(
            "create_directories({}) failed",
            path.display()
        )));
    }
    Ok(())
}
