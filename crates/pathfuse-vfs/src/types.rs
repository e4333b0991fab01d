//! Value types passed across the filesystem interface.

use serde::{Deserialize, Serialize};

use crate::mode::FileType;

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Regular)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

impl Default for StatFs {
    fn default() -> Self {
        Self {
            blocks: 1024 * 1024,
            bfree: 512 * 1024,
            bavail: 512 * 1024,
            files: 1024 * 1024,
            ffree: 512 * 1024,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        }
    }
}

/// Open file flags, decoded from the raw `O_*` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
    /// The undecoded flags as the kernel sent them.
    pub raw: i32,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::from_raw(libc::O_RDONLY)
    }
}

impl OpenFlags {
    /// Decode a raw flags word.
    pub fn from_raw(raw: i32) -> Self {
        let access = raw & libc::O_ACCMODE;
        Self {
            read: access != libc::O_WRONLY,
            write: access != libc::O_RDONLY,
            append: raw & libc::O_APPEND != 0,
            create: raw & libc::O_CREAT != 0,
            truncate: raw & libc::O_TRUNC != 0,
            exclusive: raw & libc::O_EXCL != 0,
            raw,
        }
    }

    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write-only access.
    pub fn write_only() -> Self {
        Self::from_raw(libc::O_WRONLY)
    }

    /// Read and write access.
    pub fn read_write() -> Self {
        Self::from_raw(libc::O_RDWR)
    }

    /// True if the open may modify the file.
    pub fn wants_write(&self) -> bool {
        self.write || self.append || self.truncate
    }
}

/// How `copy` treats an existing destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopyOptions {
    #[default]
    FailIfExists,
    OverwriteIfExists,
}

/// POSIX record-lock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCommand {
    /// `F_GETLK`: report a conflicting lock, if any.
    GetLock,
    /// `F_SETLK`: acquire or release without waiting.
    SetLock,
    /// `F_SETLKW`: acquire, waiting for conflicts to clear.
    SetLockWait,
}

/// A byte-range lock as described by `struct flock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLock {
    pub start: u64,
    pub end: u64,
    /// `F_RDLCK`, `F_WRLCK` or `F_UNLCK`.
    pub typ: i32,
    pub pid: u32,
}

impl FileLock {
    /// A lock reporting no conflict.
    pub fn unlocked() -> Self {
        Self {
            start: 0,
            end: 0,
            typ: libc::F_UNLCK,
            pid: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry() {
        let file = DirEntry::file("test.txt");
        assert_eq!(file.name, "test.txt");
        assert_eq!(file.kind, FileType::Regular);

        let dir = DirEntry::directory("subdir");
        assert_eq!(dir.kind, FileType::Directory);
    }

    #[test]
    fn test_open_flags() {
        let read = OpenFlags::read();
        assert!(read.read);
        assert!(!read.write);
        assert!(!read.wants_write());

        let wo = OpenFlags::write_only();
        assert!(!wo.read);
        assert!(wo.write);

        let create = OpenFlags::from_raw(libc::O_RDWR | libc::O_CREAT | libc::O_EXCL);
        assert!(create.read && create.write);
        assert!(create.create);
        assert!(create.exclusive);
        assert!(!create.truncate);

        let append = OpenFlags::from_raw(libc::O_RDONLY | libc::O_APPEND);
        assert!(append.wants_write());
    }
}
