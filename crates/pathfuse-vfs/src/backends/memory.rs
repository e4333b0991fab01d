//! In-memory filesystem backend.
//!
//! Used by the `pathfuse` binary and for testing. All data is ephemeral.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{ErrorCode, VfsError, VfsResult};
use crate::mode::{AccessMode, FileStatus, FileType, Permissions};
use crate::ops::{CurrentDir, FileSystem};
use crate::path::{display, is_root, parent_path, root};
use crate::resolve;
use crate::types::{CopyOptions, DirEntry, OpenFlags, StatFs};

/// Largest file this backend will hold.
const MAX_FILE_SIZE: u64 = 1 << 32;

const DIRECTORY_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8> },
    Directory,
    Symlink { target: PathBuf },
    Special { kind: FileType },
}

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    perm: Permissions,
    uid: u32,
    gid: u32,
    atime: SystemTime,
    mtime: SystemTime,
    xattrs: BTreeMap<String, Vec<u8>>,
}

impl Entry {
    fn new(node: Node, perm: Permissions, (uid, gid): (u32, u32)) -> Self {
        let now = SystemTime::now();
        Self {
            node,
            perm,
            uid,
            gid,
            atime: now,
            mtime: now,
            xattrs: BTreeMap::new(),
        }
    }

    fn kind(&self) -> FileType {
        match &self.node {
            Node::File { .. } => FileType::Regular,
            Node::Directory => FileType::Directory,
            Node::Symlink { .. } => FileType::Symlink,
            Node::Special { kind, .. } => *kind,
        }
    }

    fn status(&self) -> FileStatus {
        FileStatus::new(self.kind(), self.perm)
    }

    fn size(&self) -> u64 {
        match &self.node {
            Node::File { data } => data.len() as u64,
            Node::Symlink { target } => target.as_os_str().len() as u64,
            Node::Directory | Node::Special { .. } => 0,
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self.node, Node::Directory)
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. Entries are keyed by canonical absolute
/// path; the root directory always exists. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    cwd: CurrentDir,
    entries: RwLock<HashMap<PathBuf, Entry>>,
    read_only: bool,
    owner: (u32, u32),
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty, writable in-memory filesystem owned by root.
    pub fn new() -> Self {
        let owner = (0, 0);
        let mut entries = HashMap::new();
        entries.insert(
            root(),
            Entry::new(Node::Directory, Permissions::from_mode(DIRECTORY_MODE), owner),
        );
        Self {
            cwd: CurrentDir::default(),
            entries: RwLock::new(entries),
            read_only: false,
            owner,
        }
    }

    /// Reject every modification with `permission_denied`.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Owner recorded on entries created from now on.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = (uid, gid);
        self
    }

    /// Seed a regular file, creating missing parent directories.
    ///
    /// Bypasses the read-only flag, so read-only trees can be populated.
    pub fn with_file(self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Self {
        let node = Node::File { data: data.into() };
        self.seed(path.as_ref(), node, Permissions::from_mode(FILE_MODE));
        self
    }

    /// Seed a symlink at `link` pointing to `target`.
    pub fn with_symlink(self, link: impl AsRef<Path>, target: impl Into<PathBuf>) -> Self {
        let node = Node::Symlink {
            target: target.into(),
        };
        self.seed(link.as_ref(), node, Permissions::all());
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Owning `(uid, gid)` of the entry at `path`, following symlinks.
    pub fn owner_of(&self, path: &Path) -> VfsResult<(u32, u32)> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| Ok((entry.uid, entry.gid)))
    }

    fn seed(&self, path: &Path, node: Node, perm: Permissions) {
        let key = resolve::absolute(&root(), path);
        let mut entries = self.entries.write();
        let mut prefix = PathBuf::new();
        for component in parent_path(&key).components() {
            prefix.push(component.as_os_str());
            entries.entry(prefix.clone()).or_insert_with(|| {
                Entry::new(Node::Directory, Permissions::from_mode(DIRECTORY_MODE), self.owner)
            });
        }
        entries.insert(key, Entry::new(node, perm, self.owner));
    }

    /// Key for `path` with every component but the last resolved.
    fn locate(&self, path: &Path) -> VfsResult<PathBuf> {
        let abs = self.absolute(path);
        if is_root(&abs) {
            return Ok(abs);
        }
        match abs.file_name() {
            Some(name) => Ok(self.canonical(&parent_path(&abs))?.join(name)),
            None => Ok(abs),
        }
    }

    fn check_writable(&self, path: &Path) -> VfsResult<()> {
        if self.read_only {
            return Err(VfsError::permission_denied(format!(
                "read-only filesystem: {}",
                display(path)
            )));
        }
        Ok(())
    }

    fn with_entry<T>(&self, key: &Path, f: impl FnOnce(&Entry) -> VfsResult<T>) -> VfsResult<T> {
        let entries = self.entries.read();
        let entry = entries
            .get(key)
            .ok_or_else(|| VfsError::not_found(display(key)))?;
        f(entry)
    }

    fn with_entry_mut<T>(
        &self,
        key: &Path,
        f: impl FnOnce(&mut Entry) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| VfsError::not_found(display(key)))?;
        f(entry)
    }

    /// Insert `entry` at `key`. The parent must be an existing directory.
    fn place(&self, key: PathBuf, entry: Entry, replace: bool) -> VfsResult<()> {
        if is_root(&key) {
            return Err(VfsError::already_exists(display(&key)));
        }

        let mut entries = self.entries.write();
        let parent = parent_path(&key);
        match entries.get_mut(&parent) {
            Some(dir) if dir.is_directory() => dir.mtime = SystemTime::now(),
            Some(_) => return Err(VfsError::not_a_directory(display(&parent))),
            None => return Err(VfsError::not_found(display(&parent))),
        }

        if let Some(existing) = entries.get(&key) {
            if !replace {
                return Err(VfsError::already_exists(display(&key)));
            }
            if existing.is_directory() {
                return Err(VfsError::is_a_directory(display(&key)));
            }
        }

        entries.insert(key, entry);
        Ok(())
    }

    fn create_node(&self, path: &Path, node: Node, perm: Permissions) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.locate(path)?;
        self.place(key, Entry::new(node, perm, self.owner), false)
    }

    fn has_children(entries: &HashMap<PathBuf, Entry>, key: &Path) -> bool {
        entries.keys().any(|k| k.parent() == Some(key))
    }
}

impl FileSystem for MemoryBackend {
    fn current_dir(&self) -> &CurrentDir {
        &self.cwd
    }

    fn status(&self, path: &Path) -> VfsResult<FileStatus> {
        let key = self.canonical(path)?;
        let entries = self.entries.read();
        Ok(entries
            .get(&key)
            .map(Entry::status)
            .unwrap_or_else(FileStatus::not_found))
    }

    fn symlink_status(&self, path: &Path) -> VfsResult<FileStatus> {
        let key = self.locate(path)?;
        let entries = self.entries.read();
        Ok(entries
            .get(&key)
            .map(Entry::status)
            .unwrap_or_else(FileStatus::not_found))
    }

    fn file_size(&self, path: &Path) -> VfsResult<u64> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| match entry.node {
            Node::Directory => Err(VfsError::is_a_directory(display(&key))),
            _ => Ok(entry.size()),
        })
    }

    fn is_empty(&self, path: &Path) -> VfsResult<bool> {
        let key = self.canonical(path)?;
        let entries = self.entries.read();
        match entries.get(&key) {
            Some(entry) if entry.is_directory() => Ok(!Self::has_children(&entries, &key)),
            Some(entry) => Ok(entry.size() == 0),
            None => Err(VfsError::not_found(display(&key))),
        }
    }

    fn read_symlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let key = self.locate(path)?;
        self.with_entry(&key, |entry| match &entry.node {
            Node::Symlink { target } => Ok(target.clone()),
            _ => Err(VfsError::io(format!("not a symlink: {}", display(&key)))),
        })
    }

    fn set_permissions(&self, path: &Path, perm: Permissions) -> VfsResult<()> {
        self.check_writable(path)?;
        if !perm.is_known() {
            return Ok(());
        }
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            entry.perm = Permissions::from_mode(perm.bits());
            Ok(())
        })
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            // u32::MAX is chown(2)'s "leave unchanged"
            if uid != u32::MAX {
                entry.uid = uid;
            }
            if gid != u32::MAX {
                entry.gid = gid;
            }
            Ok(())
        })
    }

    fn last_read_time(&self, path: &Path) -> VfsResult<SystemTime> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| Ok(entry.atime))
    }

    fn set_last_read_time(&self, path: &Path, time: SystemTime) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            entry.atime = time;
            Ok(())
        })
    }

    fn last_write_time(&self, path: &Path) -> VfsResult<SystemTime> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| Ok(entry.mtime))
    }

    fn set_last_write_time(&self, path: &Path, time: SystemTime) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            entry.mtime = time;
            Ok(())
        })
    }

    fn access(&self, path: &Path, mode: AccessMode) -> VfsResult<()> {
        let key = self.canonical(path)?;
        let perm = self.with_entry(&key, |entry| Ok(entry.perm))?;

        if mode.contains(AccessMode::WRITE) {
            self.check_writable(path)?;
        }
        let required = [
            (AccessMode::READ, Permissions::OWNER_READ),
            (AccessMode::WRITE, Permissions::OWNER_WRITE),
            (AccessMode::EXECUTE, Permissions::OWNER_EXEC),
        ];
        for (wanted, bit) in required {
            if mode.contains(wanted) && !perm.contains(bit) {
                return Err(VfsError::permission_denied(display(&key)));
            }
        }
        Ok(())
    }

    fn statfs(&self, _path: &Path) -> VfsResult<StatFs> {
        let entries = self.entries.read();
        let defaults = StatFs::default();
        let used_bytes: u64 = entries.values().map(Entry::size).sum();
        let used_blocks = used_bytes.div_ceil(u64::from(defaults.bsize));
        let free_blocks = defaults.blocks.saturating_sub(used_blocks);
        Ok(StatFs {
            bfree: free_blocks,
            bavail: free_blocks,
            ffree: defaults.files.saturating_sub(entries.len() as u64),
            ..defaults
        })
    }

    fn create_directory(&self, path: &Path) -> VfsResult<()> {
        self.create_node(path, Node::Directory, Permissions::from_mode(DIRECTORY_MODE))
    }

    fn create_file(&self, path: &Path) -> VfsResult<()> {
        let node = Node::File { data: Vec::new() };
        self.create_node(path, node, Permissions::from_mode(FILE_MODE))
    }

    fn mknod(&self, path: &Path, status: FileStatus, device: u64) -> VfsResult<()> {
        let node = match status.kind() {
            FileType::Regular => Node::File { data: Vec::new() },
            FileType::Directory => Node::Directory,
            kind @ (FileType::Block | FileType::Character | FileType::Fifo | FileType::Socket) => {
                tracing::trace!(path = %path.display(), ?kind, device, "mknod");
                Node::Special { kind }
            }
            FileType::Symlink | FileType::NotFound => {
                return Err(VfsError::io(format!(
                    "mknod cannot create {:?} at {}",
                    status.kind(),
                    display(path)
                )));
            }
        };
        let perm = if status.permissions().is_known() {
            status.permissions()
        } else {
            Permissions::from_mode(FILE_MODE)
        };
        self.create_node(path, node, perm)
    }

    fn remove(&self, path: &Path) -> VfsResult<bool> {
        self.check_writable(path)?;
        let key = self.locate(path)?;
        if is_root(&key) {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write();
        match entries.get(&key) {
            None => return Ok(false),
            Some(entry) if entry.is_directory() && Self::has_children(&entries, &key) => {
                return Err(VfsError::directory_not_empty(display(&key)));
            }
            Some(_) => {}
        }
        entries.remove(&key);
        if let Some(parent) = entries.get_mut(&parent_path(&key)) {
            parent.mtime = SystemTime::now();
        }
        Ok(true)
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        let node = Node::Symlink {
            target: target.to_path_buf(),
        };
        self.create_node(link, node, Permissions::all())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_writable(from)?;
        let from_key = self.locate(from)?;
        let to_key = self.locate(to)?;
        if from_key == to_key {
            return Ok(());
        }
        if is_root(&from_key) || is_root(&to_key) {
            return Err(VfsError::permission_denied("cannot rename root"));
        }
        if to_key.starts_with(&from_key) {
            return Err(VfsError::io(format!(
                "cannot move {} into itself",
                display(&from_key)
            )));
        }

        let mut entries = self.entries.write();
        let source_is_dir = match entries.get(&from_key) {
            Some(entry) => entry.is_directory(),
            None => return Err(VfsError::not_found(display(&from_key))),
        };
        let to_parent = parent_path(&to_key);
        match entries.get(&to_parent) {
            Some(dir) if dir.is_directory() => {}
            Some(_) => return Err(VfsError::not_a_directory(display(&to_parent))),
            None => return Err(VfsError::not_found(display(&to_parent))),
        }
        if let Some(existing) = entries.get(&to_key) {
            match (source_is_dir, existing.is_directory()) {
                (true, false) => return Err(VfsError::not_a_directory(display(&to_key))),
                (false, true) => return Err(VfsError::is_a_directory(display(&to_key))),
                (true, true) if Self::has_children(&entries, &to_key) => {
                    return Err(VfsError::directory_not_empty(display(&to_key)));
                }
                _ => {}
            }
        }

        let Some(entry) = entries.remove(&from_key) else {
            return Err(VfsError::not_found(display(&from_key)));
        };
        if source_is_dir {
            let children: Vec<PathBuf> = entries
                .keys()
                .filter(|k| k.starts_with(&from_key))
                .cloned()
                .collect();
            for child in children {
                if let (Some(child_entry), Ok(relative)) =
                    (entries.remove(&child), child.strip_prefix(&from_key))
                {
                    entries.insert(to_key.join(relative), child_entry);
                }
            }
        }
        entries.insert(to_key, entry);

        let now = SystemTime::now();
        for dir in [parent_path(&from_key), to_parent] {
            if let Some(parent) = entries.get_mut(&dir) {
                parent.mtime = now;
            }
        }
        tracing::trace!(from = %from_key.display(), to = %to.display(), "renamed");
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path, options: CopyOptions) -> VfsResult<()> {
        self.check_writable(to)?;
        let source_key = self.canonical(from)?;
        let mut entry = self.with_entry(&source_key, |entry| Ok(entry.clone()))?;
        let now = SystemTime::now();
        entry.atime = now;
        entry.mtime = now;
        (entry.uid, entry.gid) = self.owner;

        let target_key = self.canonical(to)?;
        if entry.is_directory() {
            // Non-recursive, like copy(2) without a recursive flag
            return match self.place(target_key, entry, false) {
                Err(VfsError::AlreadyExists(_)) if options == CopyOptions::OverwriteIfExists => {
                    Ok(())
                }
                other => other,
            };
        }
        self.place(target_key, entry, options == CopyOptions::OverwriteIfExists)
    }

    fn copy_symlink(&self, from: &Path, to: &Path, options: CopyOptions) -> VfsResult<()> {
        self.check_writable(to)?;
        let target = self.read_symlink(from)?;
        let key = self.locate(to)?;
        let entry = Entry::new(Node::Symlink { target }, Permissions::all(), self.owner);
        self.place(key, entry, options == CopyOptions::OverwriteIfExists)
    }

    fn read_directory(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let key = self.canonical(path)?;
        let entries = self.entries.read();
        match entries.get(&key) {
            Some(entry) if entry.is_directory() => {}
            Some(_) => return Err(VfsError::not_a_directory(display(&key))),
            None => return Err(VfsError::not_found(display(&key))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(k, _)| k.parent() == Some(key.as_path()))
            .filter_map(|(k, entry)| {
                let name = k.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry::new(name, entry.kind()))
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()> {
        let key = self.canonical(path)?;
        let is_dir = self.with_entry(&key, |entry| Ok(entry.is_directory()))?;
        if flags.wants_write() {
            if is_dir {
                return Err(VfsError::is_a_directory(display(&key)));
            }
            self.check_writable(path)?;
        }
        if flags.truncate && flags.write {
            self.truncate(&key, 0)?;
        }
        Ok(())
    }

    fn read(&self, path: &Path, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| match &entry.node {
            Node::File { data } => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let n = (data.len() - start).min(buf.len());
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Node::Directory => Err(VfsError::is_a_directory(display(&key))),
            _ => Err(VfsError::io(format!("cannot read {}", display(&key)))),
        })
    }

    fn write(&self, path: &Path, data: &[u8], offset: u64) -> VfsResult<usize> {
        self.check_writable(path)?;
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or_else(|| VfsError::new(ErrorCode::FileTooLarge, display(path)))?;

        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| match &mut entry.node {
            Node::File { data: file_data } => {
                // Both bounds fit: end <= MAX_FILE_SIZE
                let (start, end) = (offset as usize, end as usize);
                if end > file_data.len() {
                    file_data.resize(end, 0);
                }
                file_data[start..end].copy_from_slice(data);
                entry.mtime = SystemTime::now();
                Ok(data.len())
            }
            Node::Directory => Err(VfsError::is_a_directory(display(&key))),
            _ => Err(VfsError::io(format!("cannot write {}", display(&key)))),
        })
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        self.check_writable(path)?;
        if size > MAX_FILE_SIZE {
            return Err(VfsError::new(ErrorCode::FileTooLarge, display(path)));
        }
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| match &mut entry.node {
            Node::File { data } => {
                data.resize(size as usize, 0);
                entry.mtime = SystemTime::now();
                Ok(())
            }
            Node::Directory => Err(VfsError::is_a_directory(display(&key))),
            _ => Err(VfsError::io(format!("cannot truncate {}", display(&key)))),
        })
    }

    fn fallocate(&self, path: &Path, mode: i32, offset: u64, length: u64) -> VfsResult<()> {
        self.check_writable(path)?;
        let keep_size = match mode {
            0 => false,
            libc::FALLOC_FL_KEEP_SIZE => true,
            _ => return Err(VfsError::unsupported(format!("fallocate mode {mode:#x}"))),
        };
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or_else(|| VfsError::new(ErrorCode::FileTooLarge, display(path)))?;

        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| match &mut entry.node {
            Node::File { data } => {
                if !keep_size && end as usize > data.len() {
                    data.resize(end as usize, 0);
                }
                Ok(())
            }
            Node::Directory => Err(VfsError::is_a_directory(display(&key))),
            _ => Err(VfsError::io(format!("cannot allocate {}", display(&key)))),
        })
    }

    // Nothing is buffered, so close and sync have nothing to do.

    fn flush(&self, _path: &Path) -> VfsResult<()> {
        Ok(())
    }

    fn release(&self, _path: &Path, _flags: OpenFlags) -> VfsResult<()> {
        Ok(())
    }

    fn fsync(&self, _path: &Path, _datasync: bool) -> VfsResult<()> {
        Ok(())
    }

    fn fsyncdir(&self, _path: &Path, _datasync: bool) -> VfsResult<()> {
        Ok(())
    }

    fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: i32) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            let exists = entry.xattrs.contains_key(name);
            if flags & libc::XATTR_CREATE != 0 && exists {
                return Err(VfsError::already_exists(format!("{}: {name}", display(&key))));
            }
            if flags & libc::XATTR_REPLACE != 0 && !exists {
                return Err(VfsError::not_found(format!("{}: {name}", display(&key))));
            }
            entry.xattrs.insert(name.to_string(), value.to_vec());
            Ok(())
        })
    }

    fn getxattr(&self, path: &Path, name: &str) -> VfsResult<Vec<u8>> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| {
            entry
                .xattrs
                .get(name)
                .cloned()
                .ok_or_else(|| VfsError::not_found(format!("{}: {name}", display(&key))))
        })
    }

    fn listxattr(&self, path: &Path) -> VfsResult<Vec<String>> {
        let key = self.canonical(path)?;
        self.with_entry(&key, |entry| Ok(entry.xattrs.keys().cloned().collect()))
    }

    fn removexattr(&self, path: &Path, name: &str) -> VfsResult<()> {
        self.check_writable(path)?;
        let key = self.canonical(path)?;
        self.with_entry_mut(&key, |entry| {
            entry
                .xattrs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| VfsError::not_found(format!("{}: {name}", display(&key))))
        })
    }
}
