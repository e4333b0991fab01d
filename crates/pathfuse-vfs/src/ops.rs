//! The filesystem capability trait.
//!
//! Every operation a pluggable filesystem may implement, each with a default
//! body that fails with `function_not_supported`. Implementations override the
//! subset they actually support. Path resolution (`absolute`, `canonical`,
//! `equivalent`) and the composite `create_directories` are provided on top of
//! `status`/`symlink_status`/`read_symlink`/`create_directory`.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::mode::{AccessMode, FileStatus, Permissions};
use crate::resolve;
use crate::types::{CopyOptions, DirEntry, FileLock, LockCommand, OpenFlags, StatFs};

/// The current-directory cell every filesystem instance owns.
///
/// Holds an already-canonical absolute path. Shared by all calls on the
/// instance; writes are serialized by the lock.
#[derive(Debug)]
pub struct CurrentDir {
    path: RwLock<PathBuf>,
}

impl CurrentDir {
    pub fn new(initial: impl Into<PathBuf>) -> Self {
        Self {
            path: RwLock::new(initial.into()),
        }
    }

    pub fn get(&self) -> PathBuf {
        self.path.read().clone()
    }

    pub fn set(&self, path: PathBuf) {
        *self.path.write() = path;
    }
}

impl Default for CurrentDir {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Core filesystem operations trait.
///
/// All operations are path-based. Calls may arrive concurrently from several
/// kernel worker threads, so implementations synchronize their own state.
/// Buffers handed to `read`/`write` are only valid for the duration of the
/// call.
pub trait FileSystem: Send + Sync {
    /// The instance's current-directory cell.
    fn current_dir(&self) -> &CurrentDir;

    // ========================================================================
    // Path resolution (provided)
    // ========================================================================

    /// Make `path` absolute against the current path and drop `.`/`..`
    /// components lexically. Never touches the filesystem.
    fn absolute(&self, path: &Path) -> PathBuf {
        resolve::absolute(&self.current_path(), path)
    }

    /// Resolve `path` to its simplest absolute form, expanding symlinks
    /// (POSIX `realpath`).
    fn canonical(&self, path: &Path) -> VfsResult<PathBuf> {
        resolve::canonical(self, path)
    }

    /// The current path, ala POSIX `getcwd`.
    fn current_path(&self) -> PathBuf {
        self.current_dir().get()
    }

    /// Set the current path, ala POSIX `chdir`. Stores the canonical form.
    fn set_current_path(&self, path: &Path) -> VfsResult<()> {
        let next = self.canonical(path)?;
        tracing::debug!(path = %next.display(), "current path changed");
        self.current_dir().set(next);
        Ok(())
    }

    /// True if `p1` and `p2` name the same entry.
    fn equivalent(&self, p1: &Path, p2: &Path) -> VfsResult<bool> {
        resolve::equivalent(self, p1, p2)
    }

    /// Create `path` and every missing ancestor.
    fn create_directories(&self, path: &Path) -> VfsResult<()> {
        resolve::create_directories(self, path)
    }

    // ========================================================================
    // Classification (provided)
    // ========================================================================

    /// Determine whether a path exists.
    fn exists(&self, path: &Path) -> VfsResult<bool> {
        match self.status(path) {
            Ok(status) => Ok(status.exists()),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True when `status` gives a definite answer for the path, even if that
    /// answer is "not found". Any other failure leaves the status unknown.
    fn status_known(&self, path: &Path) -> bool {
        matches!(self.status(path), Ok(_) | Err(VfsError::NotFound(_)))
    }

    fn is_directory(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_directory())
    }

    fn is_regular_file(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_regular_file())
    }

    /// Uses `symlink_status`, since `status` follows links.
    fn is_symlink(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.symlink_status(path)?.is_symlink())
    }

    fn is_fifo(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_fifo())
    }

    fn is_block_file(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_block_file())
    }

    fn is_character_file(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_character_file())
    }

    fn is_socket(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_socket())
    }

    fn is_other(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.status(path)?.is_other())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Get file attributes, following symlinks.
    ///
    /// A missing path should report a `NotFound` status rather than an error.
    fn status(&self, _path: &Path) -> VfsResult<FileStatus> {
        Err(VfsError::unsupported("status"))
    }

    /// Get file attributes without following symlinks.
    fn symlink_status(&self, path: &Path) -> VfsResult<FileStatus> {
        self.status(path)
    }

    /// Get the size of a file.
    fn file_size(&self, _path: &Path) -> VfsResult<u64> {
        Err(VfsError::unsupported("file_size"))
    }

    /// True if the path is an empty file or a directory without entries.
    fn is_empty(&self, _path: &Path) -> VfsResult<bool> {
        Err(VfsError::unsupported("is_empty"))
    }

    /// Read the target of a symbolic link.
    fn read_symlink(&self, _path: &Path) -> VfsResult<PathBuf> {
        Err(VfsError::unsupported("read_symlink"))
    }

    /// Change the permission bits of a file.
    fn set_permissions(&self, _path: &Path, _perm: Permissions) -> VfsResult<()> {
        Err(VfsError::unsupported("set_permissions"))
    }

    /// Change the owner and group of a file.
    fn chown(&self, _path: &Path, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(VfsError::unsupported("chown"))
    }

    fn last_read_time(&self, _path: &Path) -> VfsResult<SystemTime> {
        Err(VfsError::unsupported("last_read_time"))
    }

    fn set_last_read_time(&self, _path: &Path, _time: SystemTime) -> VfsResult<()> {
        Err(VfsError::unsupported("set_last_read_time"))
    }

    fn last_write_time(&self, _path: &Path) -> VfsResult<SystemTime> {
        Err(VfsError::unsupported("last_write_time"))
    }

    fn set_last_write_time(&self, _path: &Path, _time: SystemTime) -> VfsResult<()> {
        Err(VfsError::unsupported("set_last_write_time"))
    }

    /// Check access permissions. Empty `mode` checks existence only.
    fn access(&self, _path: &Path, _mode: AccessMode) -> VfsResult<()> {
        Err(VfsError::unsupported("access"))
    }

    /// Get filesystem statistics.
    fn statfs(&self, _path: &Path) -> VfsResult<StatFs> {
        Err(VfsError::unsupported("statfs"))
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Create a single directory. The parent must exist.
    fn create_directory(&self, _path: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("create_directory"))
    }

    /// Create an empty regular file.
    fn create_file(&self, _path: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("create_file"))
    }

    /// Create a special or regular file node.
    fn mknod(&self, _path: &Path, _status: FileStatus, _device: u64) -> VfsResult<()> {
        Err(VfsError::unsupported("mknod"))
    }

    /// Remove a file or empty directory. Returns whether anything was removed.
    fn remove(&self, _path: &Path) -> VfsResult<bool> {
        Err(VfsError::unsupported("remove"))
    }

    /// Create a symbolic link at `link` pointing to `target`.
    fn create_symlink(&self, _target: &Path, _link: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("create_symlink"))
    }

    /// Rename a file or directory.
    fn rename(&self, _from: &Path, _to: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("rename"))
    }

    /// Create a hard link at `to` for the file at `from`.
    fn link(&self, _from: &Path, _to: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("link"))
    }

    /// Copy a file or directory.
    fn copy(&self, _from: &Path, _to: &Path, _options: CopyOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("copy"))
    }

    /// Copy a symbolic link (the link, not its target).
    fn copy_symlink(&self, _from: &Path, _to: &Path, _options: CopyOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("copy_symlink"))
    }

    /// List a directory. `.` and `..` are not included.
    fn read_directory(&self, _path: &Path) -> VfsResult<Vec<DirEntry>> {
        Err(VfsError::unsupported("read_directory"))
    }

    // ========================================================================
    // File contents
    // ========================================================================

    /// Check whether `path` may be opened with `flags`.
    fn open(&self, _path: &Path, _flags: OpenFlags) -> VfsResult<()> {
        Err(VfsError::unsupported("open"))
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes written to the front of `buf`. Anything
    /// short of `buf.len()` means end of file; the caller zero-fills the rest.
    fn read(&self, _path: &Path, _buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::unsupported("read"))
    }

    /// Write `data` at `offset`. Returns the number of bytes written, which
    /// should be all of them unless an error is reported.
    fn write(&self, _path: &Path, _data: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::unsupported("write"))
    }

    /// Change the size of a file.
    fn truncate(&self, _path: &Path, _size: u64) -> VfsResult<()> {
        Err(VfsError::unsupported("truncate"))
    }

    /// Reserve space so later writes to the range cannot fail for lack of it.
    fn fallocate(&self, _path: &Path, _mode: i32, _offset: u64, _length: u64) -> VfsResult<()> {
        Err(VfsError::unsupported("fallocate"))
    }

    /// Called on each `close()` of a descriptor. Not a request to sync.
    fn flush(&self, _path: &Path) -> VfsResult<()> {
        Err(VfsError::unsupported("flush"))
    }

    /// Called once per `open` when the last reference is dropped.
    fn release(&self, _path: &Path, _flags: OpenFlags) -> VfsResult<()> {
        Err(VfsError::unsupported("release"))
    }

    /// Synchronize file contents; with `datasync` only user data.
    fn fsync(&self, _path: &Path, _datasync: bool) -> VfsResult<()> {
        Err(VfsError::unsupported("fsync"))
    }

    /// Synchronize directory contents.
    fn fsyncdir(&self, _path: &Path, _datasync: bool) -> VfsResult<()> {
        Err(VfsError::unsupported("fsyncdir"))
    }

    /// Map a block index within the file to a block index on the device.
    fn bmap(&self, _path: &Path, _blocksize: u32, _index: u64) -> VfsResult<u64> {
        Err(VfsError::unsupported("bmap"))
    }

    /// Device-specific control. Returns up to `out_size` bytes of output.
    fn ioctl(
        &self,
        _path: &Path,
        _cmd: u32,
        _flags: u32,
        _input: &[u8],
        _out_size: u32,
    ) -> VfsResult<Vec<u8>> {
        Err(VfsError::unsupported("ioctl"))
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// POSIX record lock request. For `GetLock` the returned lock describes a
    /// conflicting lock, or has type `F_UNLCK` if there is none.
    fn lock(&self, _path: &Path, _cmd: LockCommand, _lock: FileLock) -> VfsResult<FileLock> {
        Err(VfsError::unsupported("lock"))
    }

    /// BSD `flock` request (`LOCK_SH`, `LOCK_EX`, `LOCK_UN`, optionally `LOCK_NB`).
    fn flock(&self, _path: &Path, _op: i32) -> VfsResult<()> {
        Err(VfsError::unsupported("flock"))
    }

    // ========================================================================
    // Extended attributes
    // ========================================================================

    fn setxattr(&self, _path: &Path, _name: &str, _value: &[u8], _flags: i32) -> VfsResult<()> {
        Err(VfsError::unsupported("setxattr"))
    }

    fn getxattr(&self, _path: &Path, _name: &str) -> VfsResult<Vec<u8>> {
        Err(VfsError::unsupported("getxattr"))
    }

    /// Attribute names, in the order they should be reported.
    fn listxattr(&self, _path: &Path) -> VfsResult<Vec<String>> {
        Err(VfsError::unsupported("listxattr"))
    }

    fn removexattr(&self, _path: &Path, _name: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("removexattr"))
    }
}
