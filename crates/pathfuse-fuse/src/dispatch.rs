//! Status-code dispatch onto a [`FileSystem`].
//!
//! Every kernel-facing entry point follows the same shape: parse the raw path,
//! call the filesystem, and collapse the outcome into an `i32`. Zero or a
//! positive count means success, `-errno` means failure. Outputs go through
//! `&mut` parameters. No error or panic escapes a dispatch call.

use std::ffi::OsStr;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use pathfuse_vfs::path::{display, from_raw};
use pathfuse_vfs::{
    AccessMode, DirEntry, FileLock, FileStatus, FileSystem, FileType, LockCommand, OpenFlags,
    Permissions, StatFs, VfsError, VfsResult,
};

/// The attribute subset reported by `getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Encoded mode word (type bits and permissions).
    pub mode: u32,
    pub size: u64,
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            mode: 0,
            size: 0,
            nlink: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
        }
    }
}

impl Stat {
    /// The decoded mode word.
    pub fn status(&self) -> FileStatus {
        FileStatus::decode(self.mode)
    }
}

/// Map `function_not_supported` to `None`, keeping every other outcome.
fn optional<T>(result: VfsResult<T>) -> VfsResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(VfsError::Unsupported(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Routes kernel requests to a shared filesystem instance.
///
/// Cheap to clone; all clones share the same filesystem.
pub struct Dispatcher<F: FileSystem + ?Sized> {
    fs: Arc<F>,
}

impl<F: FileSystem + ?Sized> Clone for Dispatcher<F> {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
        }
    }
}

impl<F: FileSystem + ?Sized> Dispatcher<F> {
    pub fn new(fs: Arc<F>) -> Self {
        Self { fs }
    }

    pub fn filesystem(&self) -> &Arc<F> {
        &self.fs
    }

    /// Run one operation, converting its outcome to a status code.
    fn call(&self, op: &'static str, path: &Path, f: impl FnOnce(&F) -> VfsResult<i32>) -> i32 {
        tracing::trace!(op, path = %path.display(), "dispatch");
        match panic::catch_unwind(AssertUnwindSafe(|| f(&self.fs))) {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                tracing::debug!(
                    op,
                    path = %path.display(),
                    errno = e.errno(),
                    error = %e,
                    "operation failed"
                );
                -e.errno()
            }
            Err(_) => {
                tracing::error!(op, path = %path.display(), "filesystem panicked");
                -libc::EIO
            }
        }
    }

    fn stat(fs: &F, path: &Path) -> VfsResult<Stat> {
        let status = fs.symlink_status(path)?;
        if !status.exists() {
            return Err(VfsError::not_found(display(path)));
        }
        let size = match status.kind() {
            FileType::Regular => fs.file_size(path)?,
            FileType::Symlink => fs.read_symlink(path)?.as_os_str().len() as u64,
            _ => 0,
        };
        Ok(Stat {
            mode: status.encode(),
            size,
            nlink: if status.is_directory() { 2 } else { 1 },
            atime: optional(fs.last_read_time(path))?.unwrap_or(UNIX_EPOCH),
            mtime: optional(fs.last_write_time(path))?.unwrap_or(UNIX_EPOCH),
        })
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Fill `stat` for `path` without following a final symlink.
    pub fn getattr(&self, path: impl AsRef<OsStr>, stat: &mut Stat) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("getattr", &path, |fs| {
            *stat = Self::stat(fs, &path)?;
            Ok(0)
        })
    }

    /// `getattr` on an open file.
    pub fn fgetattr(&self, path: impl AsRef<OsStr>, stat: &mut Stat) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("fgetattr", &path, |fs| {
            *stat = Self::stat(fs, &path)?;
            Ok(0)
        })
    }

    /// Copy the link target into `buf` with `strncpy` semantics: truncated
    /// when too long, NUL padded otherwise.
    pub fn readlink(&self, path: impl AsRef<OsStr>, buf: &mut [u8]) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("readlink", &path, |fs| {
            let target = fs.read_symlink(&path)?;
            let bytes = target.as_os_str().as_encoded_bytes();
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            buf[n..].fill(0);
            Ok(0)
        })
    }

    pub fn chmod(&self, path: impl AsRef<OsStr>, mode: u32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("chmod", &path, |fs| {
            fs.set_permissions(&path, Permissions::from_mode(mode))?;
            Ok(0)
        })
    }

    /// `u32::MAX` for either id leaves it unchanged.
    pub fn chown(&self, path: impl AsRef<OsStr>, uid: u32, gid: u32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("chown", &path, |fs| {
            fs.chown(&path, uid, gid)?;
            Ok(0)
        })
    }

    pub fn truncate(&self, path: impl AsRef<OsStr>, size: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("truncate", &path, |fs| {
            fs.truncate(&path, size)?;
            Ok(0)
        })
    }

    pub fn ftruncate(&self, path: impl AsRef<OsStr>, size: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("ftruncate", &path, |fs| {
            fs.truncate(&path, size)?;
            Ok(0)
        })
    }

    /// Set access and modification times. `None` leaves a time unchanged.
    pub fn utimens(
        &self,
        path: impl AsRef<OsStr>,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("utimens", &path, |fs| {
            if let Some(atime) = atime {
                fs.set_last_read_time(&path, atime)?;
            }
            if let Some(mtime) = mtime {
                fs.set_last_write_time(&path, mtime)?;
            }
            Ok(0)
        })
    }

    /// `mask` is the `R_OK | W_OK | X_OK` word; `F_OK` checks existence.
    pub fn access(&self, path: impl AsRef<OsStr>, mask: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("access", &path, |fs| {
            fs.access(&path, AccessMode::from_bits_truncate(mask as u32))?;
            Ok(0)
        })
    }

    pub fn statfs(&self, path: impl AsRef<OsStr>, out: &mut StatFs) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("statfs", &path, |fs| {
            *out = fs.statfs(&path)?;
            Ok(0)
        })
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    pub fn mknod(&self, path: impl AsRef<OsStr>, mode: u32, rdev: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("mknod", &path, |fs| {
            fs.mknod(&path, FileStatus::decode(mode), rdev)?;
            Ok(0)
        })
    }

    /// Create a directory, then apply `mode` if the filesystem supports it.
    pub fn mkdir(&self, path: impl AsRef<OsStr>, mode: u32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("mkdir", &path, |fs| {
            fs.create_directory(&path)?;
            optional(fs.set_permissions(&path, Permissions::from_mode(mode)))?;
            Ok(0)
        })
    }

    /// Remove a non-directory.
    pub fn unlink(&self, path: impl AsRef<OsStr>) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("unlink", &path, |fs| {
            if let Some(status) = optional(fs.symlink_status(&path))? {
                if status.is_directory() {
                    return Err(VfsError::is_a_directory(display(&path)));
                }
            }
            if !fs.remove(&path)? {
                return Err(VfsError::not_found(display(&path)));
            }
            Ok(0)
        })
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: impl AsRef<OsStr>) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("rmdir", &path, |fs| {
            if let Some(status) = optional(fs.symlink_status(&path))? {
                if status.exists() && !status.is_directory() {
                    return Err(VfsError::not_a_directory(display(&path)));
                }
            }
            if !fs.remove(&path)? {
                return Err(VfsError::not_found(display(&path)));
            }
            Ok(0)
        })
    }

    /// Create `link` pointing at `target`.
    pub fn symlink(&self, target: impl AsRef<OsStr>, link: impl AsRef<OsStr>) -> i32 {
        let target = from_raw(target.as_ref());
        let link = from_raw(link.as_ref());
        self.call("symlink", &link, |fs| {
            fs.create_symlink(&target, &link)?;
            Ok(0)
        })
    }

    pub fn rename(&self, from: impl AsRef<OsStr>, to: impl AsRef<OsStr>) -> i32 {
        let from = from_raw(from.as_ref());
        let to = from_raw(to.as_ref());
        self.call("rename", &from, |fs| {
            fs.rename(&from, &to)?;
            Ok(0)
        })
    }

    pub fn link(&self, from: impl AsRef<OsStr>, to: impl AsRef<OsStr>) -> i32 {
        let from = from_raw(from.as_ref());
        let to = from_raw(to.as_ref());
        self.call("link", &from, |fs| {
            fs.link(&from, &to)?;
            Ok(0)
        })
    }

    /// Create and open a regular file. An existing file is opened instead
    /// unless `O_EXCL` is set.
    pub fn create(&self, path: impl AsRef<OsStr>, mode: u32, flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("create", &path, |fs| {
            let flags = OpenFlags::from_raw(flags);
            match fs.create_file(&path) {
                Ok(()) => {
                    optional(fs.set_permissions(&path, Permissions::from_mode(mode)))?;
                }
                Err(VfsError::AlreadyExists(_)) if !flags.exclusive => {
                    fs.open(&path, flags)?;
                }
                Err(e) => return Err(e),
            }
            Ok(0)
        })
    }

    // ========================================================================
    // File contents
    // ========================================================================

    pub fn open(&self, path: impl AsRef<OsStr>, flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("open", &path, |fs| {
            fs.open(&path, OpenFlags::from_raw(flags))?;
            Ok(0)
        })
    }

    /// Read into `buf`, zero-filling whatever the filesystem did not produce.
    /// Returns the number of bytes read.
    pub fn read(&self, path: impl AsRef<OsStr>, buf: &mut [u8], offset: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("read", &path, |fs| {
            let n = fs.read(&path, buf, offset)?.min(buf.len());
            buf[n..].fill(0);
            Ok(count(n))
        })
    }

    /// Returns the number of bytes written.
    pub fn write(&self, path: impl AsRef<OsStr>, data: &[u8], offset: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("write", &path, |fs| Ok(count(fs.write(&path, data, offset)?)))
    }

    pub fn flush(&self, path: impl AsRef<OsStr>) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("flush", &path, |fs| {
            fs.flush(&path)?;
            Ok(0)
        })
    }

    pub fn release(&self, path: impl AsRef<OsStr>, flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("release", &path, |fs| {
            fs.release(&path, OpenFlags::from_raw(flags))?;
            Ok(0)
        })
    }

    pub fn fsync(&self, path: impl AsRef<OsStr>, datasync: bool) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("fsync", &path, |fs| {
            fs.fsync(&path, datasync)?;
            Ok(0)
        })
    }

    pub fn fallocate(&self, path: impl AsRef<OsStr>, mode: i32, offset: u64, length: u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("fallocate", &path, |fs| {
            fs.fallocate(&path, mode, offset, length)?;
            Ok(0)
        })
    }

    /// Map `*index` in place.
    pub fn bmap(&self, path: impl AsRef<OsStr>, blocksize: u32, index: &mut u64) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("bmap", &path, |fs| {
            *index = fs.bmap(&path, blocksize, *index)?;
            Ok(0)
        })
    }

    /// Output longer than `out_size` is cut off.
    pub fn ioctl(
        &self,
        path: impl AsRef<OsStr>,
        cmd: u32,
        flags: u32,
        input: &[u8],
        out_size: u32,
        out: &mut Vec<u8>,
    ) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("ioctl", &path, |fs| {
            let mut data = fs.ioctl(&path, cmd, flags, input, out_size)?;
            data.truncate(out_size as usize);
            *out = data;
            Ok(0)
        })
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// For `GetLock`, `lock` is overwritten with the conflicting lock.
    pub fn lock(&self, path: impl AsRef<OsStr>, cmd: LockCommand, lock: &mut FileLock) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("lock", &path, |fs| {
            *lock = fs.lock(&path, cmd, *lock)?;
            Ok(0)
        })
    }

    pub fn flock(&self, path: impl AsRef<OsStr>, op: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("flock", &path, |fs| {
            fs.flock(&path, op)?;
            Ok(0)
        })
    }

    // ========================================================================
    // Directories
    // ========================================================================

    pub fn opendir(&self, path: impl AsRef<OsStr>, flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("opendir", &path, |fs| {
            if !fs.is_directory(&path)? {
                return Err(VfsError::not_a_directory(display(&path)));
            }
            fs.open(&path, OpenFlags::from_raw(flags))?;
            Ok(0)
        })
    }

    /// Hand each entry to `filler` until it reports a full buffer by
    /// returning `true`.
    pub fn readdir(
        &self,
        path: impl AsRef<OsStr>,
        mut filler: impl FnMut(&DirEntry) -> bool,
    ) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("readdir", &path, |fs| {
            for entry in fs.read_directory(&path)? {
                if filler(&entry) {
                    break;
                }
            }
            Ok(0)
        })
    }

    pub fn releasedir(&self, path: impl AsRef<OsStr>, flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("releasedir", &path, |fs| {
            if !fs.is_directory(&path)? {
                return Err(VfsError::not_a_directory(display(&path)));
            }
            fs.release(&path, OpenFlags::from_raw(flags))?;
            Ok(0)
        })
    }

    pub fn fsyncdir(&self, path: impl AsRef<OsStr>, datasync: bool) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("fsyncdir", &path, |fs| {
            fs.fsyncdir(&path, datasync)?;
            Ok(0)
        })
    }

    // ========================================================================
    // Extended attributes
    // ========================================================================

    pub fn setxattr(&self, path: impl AsRef<OsStr>, name: &str, value: &[u8], flags: i32) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("setxattr", &path, |fs| {
            fs.setxattr(&path, name, value, flags)?;
            Ok(0)
        })
    }

    /// With an empty `out`, returns the value size. Otherwise copies the value
    /// and returns its size, or `-ERANGE` when `out` is too small.
    pub fn getxattr(&self, path: impl AsRef<OsStr>, name: &str, out: &mut [u8]) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("getxattr", &path, |fs| {
            let value = fs.getxattr(&path, name)?;
            if out.is_empty() {
                return Ok(count(value.len()));
            }
            if out.len() < value.len() {
                return Ok(-libc::ERANGE);
            }
            out[..value.len()].copy_from_slice(&value);
            Ok(count(value.len()))
        })
    }

    /// Names are written NUL-terminated, back to back. Size probing works as
    /// for [`Dispatcher::getxattr`].
    pub fn listxattr(&self, path: impl AsRef<OsStr>, out: &mut [u8]) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("listxattr", &path, |fs| {
            let names = fs.listxattr(&path)?;
            let total: usize = names.iter().map(|name| name.len() + 1).sum();
            if out.is_empty() {
                return Ok(count(total));
            }
            if out.len() < total {
                return Ok(-libc::ERANGE);
            }
            let mut at = 0;
            for name in &names {
                out[at..at + name.len()].copy_from_slice(name.as_bytes());
                at += name.len();
                out[at] = 0;
                at += 1;
            }
            Ok(count(total))
        })
    }

    pub fn removexattr(&self, path: impl AsRef<OsStr>, name: &str) -> i32 {
        let path = from_raw(path.as_ref());
        self.call("removexattr", &path, |fs| {
            fs.removexattr(&path, name)?;
            Ok(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfuse_vfs::{CurrentDir, MemoryBackend};

    fn dispatcher() -> Dispatcher<MemoryBackend> {
        Dispatcher::new(Arc::new(
            MemoryBackend::new()
                .with_file("/hello", "Hello, world!\n")
                .with_symlink("/link", "/hello"),
        ))
    }

    #[derive(Default)]
    struct Panicky {
        cwd: CurrentDir,
    }

    impl FileSystem for Panicky {
        fn current_dir(&self) -> &CurrentDir {
            &self.cwd
        }

        fn status(&self, _path: &Path) -> VfsResult<FileStatus> {
            panic!("backend bug");
        }
    }

    #[test]
    fn test_getattr_regular_file() {
        let d = dispatcher();
        let mut stat = Stat::default();
        assert_eq!(d.getattr("/hello", &mut stat), 0);
        assert!(stat.status().is_regular_file());
        assert_eq!(stat.size, 14);
        assert_eq!(stat.nlink, 1);
    }

    #[test]
    fn test_getattr_directory_and_symlink() {
        let d = dispatcher();
        let mut stat = Stat::default();
        assert_eq!(d.getattr("/", &mut stat), 0);
        assert!(stat.status().is_directory());
        assert_eq!(stat.nlink, 2);
        assert_eq!(stat.size, 0);

        assert_eq!(d.getattr("/link", &mut stat), 0);
        assert!(stat.status().is_symlink());
        assert_eq!(stat.size, "/hello".len() as u64);
    }

    #[test]
    fn test_getattr_missing() {
        let d = dispatcher();
        let mut stat = Stat::default();
        assert_eq!(d.getattr("/nope", &mut stat), -libc::ENOENT);
        assert_eq!(stat, Stat::default());
    }

    #[test]
    fn test_read_zero_fills_tail() {
        let d = dispatcher();
        let mut buf = [0xAAu8; 32];
        assert_eq!(d.read("/hello", &mut buf, 7), 7);
        assert_eq!(&buf[..7], b"world!\n");
        assert!(buf[7..].iter().all(|&b| b == 0));

        assert_eq!(d.read("/hello", &mut buf, 100), 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_readlink_strncpy() {
        let d = dispatcher();
        let mut buf = [0xAAu8; 10];
        assert_eq!(d.readlink("/link", &mut buf), 0);
        assert_eq!(&buf[..6], b"/hello");
        assert!(buf[6..].iter().all(|&b| b == 0));

        let mut short = [0u8; 3];
        assert_eq!(d.readlink("/link", &mut short), 0);
        assert_eq!(&short, b"/he");

        assert_eq!(d.readlink("/hello", &mut buf), -libc::EIO);
    }

    #[test]
    fn test_unsupported_maps_to_enosys() {
        let d = dispatcher();
        assert_eq!(d.link("/hello", "/hard"), -libc::ENOSYS);
        assert_eq!(d.flock("/hello", libc::LOCK_EX), -libc::ENOSYS);
        let mut index = 3;
        assert_eq!(d.bmap("/hello", 512, &mut index), -libc::ENOSYS);
        assert_eq!(index, 3);
    }

    #[test]
    fn test_panic_becomes_eio() {
        let d = Dispatcher::new(Arc::new(Panicky::default()));
        let mut stat = Stat::default();
        assert_eq!(d.getattr("/x", &mut stat), -libc::EIO);
        // The dispatcher stays usable afterwards
        assert_eq!(d.getattr("/y", &mut stat), -libc::EIO);
    }

    #[test]
    fn test_mkdir_applies_mode() {
        let d = dispatcher();
        assert_eq!(d.mkdir("/dir", 0o750), 0);
        let mut stat = Stat::default();
        assert_eq!(d.getattr("/dir", &mut stat), 0);
        assert_eq!(stat.mode, 0o040750);
        assert_eq!(d.mkdir("/dir", 0o750), -libc::EEXIST);
    }

    #[test]
    fn test_unlink_and_rmdir_check_kind() {
        let d = dispatcher();
        assert_eq!(d.mkdir("/dir", 0o755), 0);
        assert_eq!(d.unlink("/dir"), -libc::EISDIR);
        assert_eq!(d.rmdir("/hello"), -libc::ENOTDIR);
        assert_eq!(d.unlink("/missing"), -libc::ENOENT);
        assert_eq!(d.rmdir("/dir"), 0);
        assert_eq!(d.unlink("/hello"), 0);
    }

    #[test]
    fn test_create_then_write_and_read() {
        let d = dispatcher();
        let flags = libc::O_RDWR | libc::O_CREAT;
        assert_eq!(d.create("/new", 0o600, flags), 0);
        assert_eq!(d.write("/new", b"abc", 0), 3);

        let mut buf = [0u8; 3];
        assert_eq!(d.read("/new", &mut buf, 0), 3);
        assert_eq!(&buf, b"abc");

        // Existing file: opened unless O_EXCL
        assert_eq!(d.create("/new", 0o600, flags), 0);
        assert_eq!(d.create("/new", 0o600, flags | libc::O_EXCL), -libc::EEXIST);
    }

    #[test]
    fn test_opendir_rejects_files() {
        let d = dispatcher();
        assert_eq!(d.opendir("/", libc::O_RDONLY), 0);
        assert_eq!(d.opendir("/hello", libc::O_RDONLY), -libc::ENOTDIR);
        assert_eq!(d.releasedir("/hello", libc::O_RDONLY), -libc::ENOTDIR);
    }

    #[test]
    fn test_readdir_stops_when_full() {
        let d = dispatcher();
        let mut all = Vec::new();
        assert_eq!(d.readdir("/", |e| {
            all.push(e.name.clone());
            false
        }), 0);
        assert_eq!(all, vec!["hello".to_string(), "link".to_string()]);

        let mut first = Vec::new();
        assert_eq!(d.readdir("/", |e| {
            first.push(e.name.clone());
            true
        }), 0);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_xattr_size_query() {
        let d = dispatcher();
        assert_eq!(d.setxattr("/hello", "user.color", b"blue", 0), 0);
        assert_eq!(d.setxattr("/hello", "user.n", b"1", 0), 0);

        assert_eq!(d.getxattr("/hello", "user.color", &mut []), 4);
        let mut small = [0u8; 2];
        assert_eq!(d.getxattr("/hello", "user.color", &mut small), -libc::ERANGE);
        let mut value = [0u8; 8];
        assert_eq!(d.getxattr("/hello", "user.color", &mut value), 4);
        assert_eq!(&value[..4], b"blue");

        let expected = b"user.color\0user.n\0";
        assert_eq!(d.listxattr("/hello", &mut []), expected.len() as i32);
        let mut names = [0u8; 32];
        assert_eq!(d.listxattr("/hello", &mut names), expected.len() as i32);
        assert_eq!(&names[..expected.len()], expected);
        let mut tight = [0u8; 4];
        assert_eq!(d.listxattr("/hello", &mut tight), -libc::ERANGE);

        assert_eq!(d.removexattr("/hello", "user.n"), 0);
        assert_eq!(d.getxattr("/hello", "user.n", &mut []), -libc::ENOENT);
    }

    #[test]
    fn test_utimens_and_chmod() {
        let d = dispatcher();
        let when = UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        assert_eq!(d.utimens("/hello", Some(when), None), 0);
        assert_eq!(d.chmod("/hello", 0o600), 0);

        let mut stat = Stat::default();
        assert_eq!(d.getattr("/hello", &mut stat), 0);
        assert_eq!(stat.atime, when);
        assert_eq!(stat.mode, 0o100600);
    }

    #[test]
    fn test_trait_object_filesystem() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryBackend::new().with_file("/a", "x"));
        let d = Dispatcher::new(fs);
        let mut out = StatFs::default();
        assert_eq!(d.statfs("/", &mut out), 0);
        assert_eq!(d.access("/a", libc::R_OK), 0);
    }
}
