//! `fuser::Filesystem` implementation over a [`Dispatcher`].
//!
//! Translates inode-addressed kernel requests into path-addressed dispatch
//! calls and replies with whatever status the dispatcher produced. File
//! handles are not tracked; every open replies with handle 0.

use std::ffi::{OsStr, c_int};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, Filesystem, KernelConfig, ReplyAttr, ReplyBmap, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyIoctl, ReplyLock, ReplyOpen, ReplyStatfs,
    ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use pathfuse_vfs::path::parent_path;
use pathfuse_vfs::{DirEntry, FileLock, FileSystem, FileType, LockCommand, StatFs};

use crate::config::MountConfig;
use crate::constants::{BLOCK_SIZE, PATH_MAX, SECTOR_SIZE};
use crate::dispatch::{Dispatcher, Stat};
use crate::inode::InodeTable;

fn kind(kind: FileType) -> fuser::FileType {
    match kind {
        FileType::Directory => fuser::FileType::Directory,
        FileType::Symlink => fuser::FileType::Symlink,
        FileType::Block => fuser::FileType::BlockDevice,
        FileType::Character => fuser::FileType::CharDevice,
        FileType::Fifo => fuser::FileType::NamedPipe,
        FileType::Socket => fuser::FileType::Socket,
        FileType::Regular | FileType::NotFound => fuser::FileType::RegularFile,
    }
}

fn time(value: TimeOrNow) -> SystemTime {
    match value {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn reply_empty(code: i32, reply: ReplyEmpty) {
    if code < 0 {
        reply.error(-code);
    } else {
        reply.ok();
    }
}

/// Adapter handed to `fuser::Session`.
pub struct FuseBridge<F: FileSystem + ?Sized> {
    dispatcher: Dispatcher<F>,
    inodes: InodeTable,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl<F: FileSystem + ?Sized> FuseBridge<F> {
    pub fn new(fs: Arc<F>, config: &MountConfig) -> Self {
        // SAFETY: getuid/getgid always succeed and touch no memory
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            dispatcher: Dispatcher::new(fs),
            inodes: InodeTable::new(),
            ttl: config.attr_ttl(),
            uid,
            gid,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<F> {
        &self.dispatcher
    }

    fn attr(&self, ino: u64, stat: &Stat) -> FileAttr {
        let status = stat.status();
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(SECTOR_SIZE),
            atime: stat.atime,
            mtime: stat.mtime,
            ctime: stat.mtime,
            crtime: stat.mtime,
            kind: kind(status.kind()),
            perm: (stat.mode & 0o7777) as u16,
            nlink: stat.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Stat `path` and reply with a counted entry for it.
    fn reply_entry(&mut self, path: &Path, reply: ReplyEntry) {
        let mut stat = Stat::default();
        let code = self.dispatcher.getattr(path, &mut stat);
        if code < 0 {
            reply.error(-code);
            return;
        }
        let ino = self.inodes.lookup(path);
        reply.entry(&self.ttl, &self.attr(ino, &stat), 0);
    }

    fn reply_attr(&self, ino: u64, path: &Path, reply: ReplyAttr) {
        let mut stat = Stat::default();
        let code = self.dispatcher.getattr(path, &mut stat);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.attr(&self.ttl, &self.attr(ino, &stat));
    }

    fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.inodes.child(parent, name)
    }
}

impl<F: FileSystem + ?Sized> Filesystem for FuseBridge<F> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        tracing::info!(uid = self.uid, gid = self.gid, "filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!(inodes = self.inodes.len(), "filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.reply_entry(&path, reply);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut stat = Stat::default();
        let code = if fh.is_some() {
            self.dispatcher.fgetattr(&path, &mut stat)
        } else {
            self.dispatcher.getattr(&path, &mut stat)
        };
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.attr(&self.ttl, &self.attr(ino, &stat));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(mode) = mode {
            let code = self.dispatcher.chmod(&path, mode);
            if code < 0 {
                reply.error(-code);
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            let code = self
                .dispatcher
                .chown(&path, uid.unwrap_or(u32::MAX), gid.unwrap_or(u32::MAX));
            if code < 0 {
                reply.error(-code);
                return;
            }
        }
        if let Some(size) = size {
            let code = if fh.is_some() {
                self.dispatcher.ftruncate(&path, size)
            } else {
                self.dispatcher.truncate(&path, size)
            };
            if code < 0 {
                reply.error(-code);
                return;
            }
        }
        if atime.is_some() || mtime.is_some() {
            let code = self
                .dispatcher
                .utimens(&path, atime.map(time), mtime.map(time));
            if code < 0 {
                reply.error(-code);
                return;
            }
        }

        self.reply_attr(ino, &path, reply);
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; PATH_MAX];
        let code = self.dispatcher.readlink(&path, &mut buf);
        if code < 0 {
            reply.error(-code);
            return;
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        reply.data(&buf[..len]);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.mknod(&path, mode & !umask, u64::from(rdev));
        if code < 0 {
            reply.error(-code);
            return;
        }
        self.reply_entry(&path, reply);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.mkdir(&path, mode & !umask);
        if code < 0 {
            reply.error(-code);
            return;
        }
        self.reply_entry(&path, reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.unlink(&path);
        if code == 0 {
            self.inodes.unlink(&path);
        }
        reply_empty(code, reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.rmdir(&path);
        if code == 0 {
            self.inodes.unlink(&path);
        }
        reply_empty(code, reply);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child(parent, link_name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.symlink(target, &path);
        if code < 0 {
            reply.error(-code);
            return;
        }
        self.reply_entry(&path, reply);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // RENAME_NOREPLACE and RENAME_EXCHANGE have no path-level equivalent
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let (Some(from), Some(to)) = (self.child(parent, name), self.child(newparent, newname))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.rename(&from, &to);
        if code == 0 {
            self.inodes.rename(&from, &to);
        }
        reply_empty(code, reply);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(from), Some(to)) = (self.inodes.path(ino), self.child(newparent, newname)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.link(&from, &to);
        if code < 0 {
            reply.error(-code);
            return;
        }
        self.reply_entry(&to, reply);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.open(&path, flags);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let code = self.dispatcher.read(&path, &mut buf, offset);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.data(&buf[..code as usize]);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let code = self.dispatcher.write(&path, data, offset);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.written(code as u32);
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.flush(&path), reply);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.release(&path, flags), reply);
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, datasync: bool, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.fsync(&path, datasync), reply);
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.opendir(&path, flags);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let mut listing = vec![
            (ino, DirEntry::directory(".")),
            (self.inodes.ino(&parent_path(&path)), DirEntry::directory("..")),
        ];
        let mut entries = Vec::new();
        let code = self.dispatcher.readdir(&path, |entry| {
            entries.push(entry.clone());
            false
        });
        if code < 0 {
            reply.error(-code);
            return;
        }
        for entry in entries {
            let child = self.inodes.ino(&path.join(&entry.name));
            listing.push((child, entry));
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child, entry)) in listing.iter().enumerate().skip(skip) {
            if reply.add(*child, (i + 1) as i64, kind(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        flags: i32,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.releasedir(&path, flags), reply);
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.fsyncdir(&path, datasync), reply);
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.inodes.path(ino).unwrap_or_else(pathfuse_vfs::path::root);
        let mut st = StatFs::default();
        let code = self.dispatcher.statfs(&path, &mut st);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.statfs(
            st.blocks,
            st.bfree,
            st.bavail,
            st.files,
            st.ffree,
            st.bsize,
            st.namelen,
            st.frsize,
        );
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(path), Some(name)) = (self.inodes.path(ino), name.to_str()) else {
            reply.error(libc::EINVAL);
            return;
        };
        reply_empty(self.dispatcher.setxattr(&path, name, value, flags), reply);
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let (Some(path), Some(name)) = (self.inodes.path(ino), name.to_str()) else {
            reply.error(libc::EINVAL);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let code = self.dispatcher.getxattr(&path, name, &mut buf);
        if code < 0 {
            reply.error(-code);
        } else if size == 0 {
            reply.size(code as u32);
        } else {
            reply.data(&buf[..code as usize]);
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let code = self.dispatcher.listxattr(&path, &mut buf);
        if code < 0 {
            reply.error(-code);
        } else if size == 0 {
            reply.size(code as u32);
        } else {
            reply.data(&buf[..code as usize]);
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let (Some(path), Some(name)) = (self.inodes.path(ino), name.to_str()) else {
            reply.error(libc::EINVAL);
            return;
        };
        reply_empty(self.dispatcher.removexattr(&path, name), reply);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply_empty(self.dispatcher.access(&path, mask), reply);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let code = self.dispatcher.create(&path, mode & !umask, flags);
        if code < 0 {
            reply.error(-code);
            return;
        }
        let mut stat = Stat::default();
        let code = self.dispatcher.getattr(&path, &mut stat);
        if code < 0 {
            reply.error(-code);
            return;
        }
        let ino = self.inodes.lookup(&path);
        reply.created(&self.ttl, &self.attr(ino, &stat), 0, 0, 0);
    }

    fn getlk(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        reply: ReplyLock,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut lock = FileLock { start, end, typ, pid };
        let code = self.dispatcher.lock(&path, LockCommand::GetLock, &mut lock);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.locked(lock.start, lock.end, lock.typ, lock.pid);
    }

    fn setlk(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        sleep: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let cmd = if sleep {
            LockCommand::SetLockWait
        } else {
            LockCommand::SetLock
        };
        let mut lock = FileLock { start, end, typ, pid };
        reply_empty(self.dispatcher.lock(&path, cmd, &mut lock), reply);
    }

    fn bmap(&mut self, _req: &Request<'_>, ino: u64, blocksize: u32, idx: u64, reply: ReplyBmap) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut index = idx;
        let code = self.dispatcher.bmap(&path, blocksize, &mut index);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.bmap(index);
    }

    fn ioctl(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        flags: u32,
        cmd: u32,
        in_data: &[u8],
        out_size: u32,
        reply: ReplyIoctl,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut out = Vec::new();
        let code = self
            .dispatcher
            .ioctl(&path, cmd, flags, in_data, out_size, &mut out);
        if code < 0 {
            reply.error(-code);
            return;
        }
        reply.ioctl(0, &out);
    }

    fn fallocate(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let (Ok(offset), Ok(length)) = (u64::try_from(offset), u64::try_from(length)) else {
            reply.error(libc::EINVAL);
            return;
        };
        reply_empty(self.dispatcher.fallocate(&path, mode, offset, length), reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfuse_vfs::MemoryBackend;

    #[test]
    fn test_attr_from_stat() {
        let fs = Arc::new(MemoryBackend::new().with_file("/hello", "Hello, world!\n"));
        let bridge = FuseBridge::new(fs, &MountConfig::default());

        let mut stat = Stat::default();
        assert_eq!(bridge.dispatcher().getattr("/hello", &mut stat), 0);
        let attr = bridge.attr(7, &stat);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, fuser::FileType::RegularFile);
        assert_eq!(attr.size, 14);
        assert_eq!(attr.blocks, 1);
        assert_eq!(u32::from(attr.perm), stat.mode & 0o777);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(kind(FileType::Directory), fuser::FileType::Directory);
        assert_eq!(kind(FileType::Fifo), fuser::FileType::NamedPipe);
        assert_eq!(kind(FileType::Character), fuser::FileType::CharDevice);
        assert_eq!(kind(FileType::Symlink), fuser::FileType::Symlink);
    }
}
