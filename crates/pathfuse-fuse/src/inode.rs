//! Inode number to path mapping.
//!
//! The kernel addresses everything by inode number while the filesystem works
//! on paths. The table hands out a number per path on first sight and keeps it
//! until the kernel forgets it. The root is always [`ROOT_INO`].
//!
//! Removing or replacing a path detaches its inode. A detached inode nobody
//! looked up is dropped at once; one the kernel still holds stops resolving
//! and lingers until `forget`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use pathfuse_vfs::path::root;

use crate::constants::ROOT_INO;

#[derive(Debug)]
struct Node {
    path: PathBuf,
    lookups: u64,
    detached: bool,
}

/// Bidirectional inode ↔ path table.
#[derive(Debug)]
pub struct InodeTable {
    nodes: HashMap<u64, Node>,
    inodes: HashMap<PathBuf, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            nodes: HashMap::new(),
            inodes: HashMap::new(),
            next: ROOT_INO + 1,
        };
        table.nodes.insert(
            ROOT_INO,
            Node {
                path: root(),
                lookups: 1,
                detached: false,
            },
        );
        table.inodes.insert(root(), ROOT_INO);
        table
    }

    /// Path for `ino`, if it is still attached to one.
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.attached(ino).map(|node| node.path.clone())
    }

    /// Path of `name` inside directory `parent`.
    pub fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.attached(parent).map(|node| node.path.join(name))
    }

    fn attached(&self, ino: u64) -> Option<&Node> {
        self.nodes.get(&ino).filter(|node| !node.detached)
    }

    /// Inode for `path`, allocating one if needed, without counting a lookup.
    pub fn ino(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.nodes.insert(
            ino,
            Node {
                path: path.to_path_buf(),
                lookups: 0,
                detached: false,
            },
        );
        self.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// Inode for `path`, counting one kernel reference to it.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        let ino = self.ino(path);
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.lookups += 1;
        }
        ino
    }

    /// Drop `nlookup` kernel references; the inode is released at zero.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(nlookup);
        if node.lookups > 0 {
            return;
        }
        if let Some(node) = self.nodes.remove(&ino) {
            if self.inodes.get(&node.path) == Some(&ino) {
                self.inodes.remove(&node.path);
            }
        }
    }

    /// Detach `path` and everything below it from their inodes.
    pub fn unlink(&mut self, path: &Path) {
        let gone: Vec<u64> = self
            .inodes
            .iter()
            .filter(|(p, _)| p.starts_with(path))
            .map(|(_, &ino)| ino)
            .collect();
        for ino in gone {
            self.detach(ino);
        }
    }

    fn detach(&mut self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        if self.inodes.get(&node.path) == Some(&ino) {
            self.inodes.remove(&node.path);
        }
        if node.lookups == 0 {
            self.nodes.remove(&ino);
        } else {
            node.detached = true;
        }
    }

    /// Move `from` and everything below it to `to`, detaching whatever `to`
    /// named before.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        self.unlink(to);
        let moved: Vec<(PathBuf, u64)> = self
            .inodes
            .iter()
            .filter(|(path, _)| path.starts_with(from))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (old, ino) in moved {
            self.inodes.remove(&old);
            let new = match old.strip_prefix(from) {
                Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                Ok(rest) => to.join(rest),
                Err(_) => continue,
            };
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.path = new.clone();
            }
            self.inodes.insert(new, ino);
        }
    }

    /// Number of live inodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some(PathBuf::from("/")));
        assert_eq!(table.child(ROOT_INO, OsStr::new("a")), Some(PathBuf::from("/a")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_is_stable() {
        let mut table = InodeTable::new();
        let a = table.lookup(Path::new("/a"));
        let b = table.lookup(Path::new("/b"));
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
        assert_eq!(table.lookup(Path::new("/a")), a);
        assert_eq!(table.path(a), Some(PathBuf::from("/a")));
    }

    #[test]
    fn test_forget_releases_at_zero() {
        let mut table = InodeTable::new();
        let a = table.lookup(Path::new("/a"));
        table.lookup(Path::new("/a"));

        table.forget(a, 1);
        assert!(table.path(a).is_some());
        table.forget(a, 1);
        assert!(table.path(a).is_none());

        // The root is never released
        table.forget(ROOT_INO, 100);
        assert!(table.path(ROOT_INO).is_some());
    }

    #[test]
    fn test_rename_moves_descendants() {
        let mut table = InodeTable::new();
        let dir = table.lookup(Path::new("/dir"));
        let file = table.lookup(Path::new("/dir/sub/file"));
        let other = table.lookup(Path::new("/dirt"));

        table.rename(Path::new("/dir"), Path::new("/moved"));
        assert_eq!(table.path(dir), Some(PathBuf::from("/moved")));
        assert_eq!(table.path(file), Some(PathBuf::from("/moved/sub/file")));
        assert_eq!(table.path(other), Some(PathBuf::from("/dirt")));
        assert_eq!(table.ino(Path::new("/moved/sub/file")), file);
    }

    #[test]
    fn test_rename_onto_itself() {
        let mut table = InodeTable::new();
        let a = table.lookup(Path::new("/a"));
        table.rename(Path::new("/a"), Path::new("/a"));
        assert_eq!(table.ino(Path::new("/a")), a);
    }

    #[test]
    fn test_unlink_detaches_path() {
        let mut table = InodeTable::new();
        let a = table.lookup(Path::new("/a"));
        table.unlink(Path::new("/a"));

        // Old inode lingers without a path until forgotten, new lookups get a fresh one
        assert_eq!(table.path(a), None);
        assert_eq!(table.child(a, OsStr::new("x")), None);
        assert_eq!(table.len(), 2);
        let fresh = table.lookup(Path::new("/a"));
        assert_ne!(fresh, a);

        table.forget(a, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.ino(Path::new("/a")), fresh);
        assert_eq!(table.path(fresh), Some(PathBuf::from("/a")));
    }

    #[test]
    fn test_unlink_drops_listed_inodes() {
        // Directory listings allocate inodes the kernel never looks up
        let mut table = InodeTable::new();
        for i in 0..1000 {
            let path = PathBuf::from(format!("/f{i}"));
            table.ino(&path);
            table.unlink(&path);
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unlink_directory_detaches_children() {
        let mut table = InodeTable::new();
        let dir = table.lookup(Path::new("/d"));
        table.ino(Path::new("/d/listed"));
        let held = table.lookup(Path::new("/d/held"));

        table.unlink(Path::new("/d"));
        assert_eq!(table.path(dir), None);
        assert_eq!(table.path(held), None);
        assert_eq!(table.len(), 3);

        table.forget(dir, 1);
        table.forget(held, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rename_replaces_destination() {
        let mut table = InodeTable::new();
        let src = table.lookup(Path::new("/src"));
        let held = table.lookup(Path::new("/dst"));
        let listed = table.ino(Path::new("/other"));

        table.rename(Path::new("/src"), Path::new("/dst"));
        assert_eq!(table.path(src), Some(PathBuf::from("/dst")));
        assert_eq!(table.ino(Path::new("/dst")), src);
        // The replaced inode no longer reaches the new file
        assert_eq!(table.path(held), None);

        // A replaced inode nobody holds is dropped right away
        table.rename(Path::new("/dst"), Path::new("/other"));
        assert_eq!(table.path(listed), None);
        assert_eq!(table.ino(Path::new("/other")), src);

        table.forget(held, 1);
        assert_eq!(table.len(), 2);
    }
}
