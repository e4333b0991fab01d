//! POSIX mode word codec.
//!
//! A mode word packs a file type (the `S_IF*` bits under `0o170000`) and a
//! permission mask (the low nine bits). [`FileStatus`] is the decoded pair.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Mask selecting the file type bits of a mode word.
pub const S_IFMT: u32 = 0o170000;

const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

bitflags! {
    /// Owner/group/others read-write-execute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Permissions: u32 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const OWNER_ALL = 0o700;

        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const GROUP_ALL = 0o070;

        const OTHERS_READ = 0o004;
        const OTHERS_WRITE = 0o002;
        const OTHERS_EXEC = 0o001;
        const OTHERS_ALL = 0o007;
    }
}

impl Permissions {
    /// Bits of a mode word that carry permissions.
    pub const MASK: u32 = 0o777;

    /// Sentinel for "permissions could not be determined".
    pub const NOT_KNOWN: Self = Self::from_bits_retain(0xFFFF);

    /// Take the permission bits of a raw mode word, ignoring everything else.
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate(mode & Self::MASK)
    }

    /// True unless this is the [`Permissions::NOT_KNOWN`] sentinel.
    pub fn is_known(self) -> bool {
        self != Self::NOT_KNOWN
    }
}

bitflags! {
    /// Access check requested by `access(2)`. Empty means existence only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        const READ = 4;
        const WRITE = 2;
        const EXECUTE = 1;
    }
}

/// File type, one per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum FileType {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    Block,
    /// Character device.
    Character,
    /// Named pipe.
    Fifo,
    /// Unix socket.
    Socket,
    /// Nothing exists at the path.
    NotFound,
}

impl FileType {
    /// The `S_IF*` constant for this type; `NotFound` has none.
    pub fn mode_bits(self) -> u32 {
        match self {
            FileType::Regular => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::Block => S_IFBLK,
            FileType::Character => S_IFCHR,
            FileType::Fifo => S_IFIFO,
            FileType::Socket => S_IFSOCK,
            FileType::NotFound => 0,
        }
    }

    /// Decode the type bits of a mode word. Unrecognized patterns are `NotFound`.
    pub fn from_mode_bits(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileType::Regular,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            S_IFBLK => FileType::Block,
            S_IFCHR => FileType::Character,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => FileType::NotFound,
        }
    }
}

/// A (type, permissions) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStatus {
    kind: FileType,
    perm: Permissions,
}

impl FileStatus {
    pub fn new(kind: FileType, perm: Permissions) -> Self {
        Self { kind, perm }
    }

    /// A status of the given type whose permissions are not known.
    pub fn of_type(kind: FileType) -> Self {
        Self::new(kind, Permissions::NOT_KNOWN)
    }

    /// The status of a path with nothing behind it.
    pub fn not_found() -> Self {
        Self::of_type(FileType::NotFound)
    }

    pub fn regular(perm: Permissions) -> Self {
        Self::new(FileType::Regular, perm)
    }

    pub fn directory(perm: Permissions) -> Self {
        Self::new(FileType::Directory, perm)
    }

    pub fn symlink() -> Self {
        Self::new(FileType::Symlink, Permissions::all())
    }

    pub fn kind(&self) -> FileType {
        self.kind
    }

    pub fn permissions(&self) -> Permissions {
        self.perm
    }

    pub fn set_kind(&mut self, kind: FileType) {
        self.kind = kind;
    }

    pub fn set_permissions(&mut self, perm: Permissions) {
        self.perm = perm;
    }

    /// Pack into a mode word: permission bits OR the type's `S_IF*` constant.
    ///
    /// `NOT_KNOWN` permissions contribute no bits, so the encoding is lossy for
    /// them: decoding gives back empty permissions, not the sentinel.
    pub fn encode(&self) -> u32 {
        let perm = if self.perm.is_known() {
            self.perm.bits() & Permissions::MASK
        } else {
            0
        };
        perm | self.kind.mode_bits()
    }

    /// Unpack a mode word. Never fails: unknown type bits decode to `NotFound`
    /// with the permission bits still taken.
    pub fn decode(mode: u32) -> Self {
        Self {
            kind: FileType::from_mode_bits(mode),
            perm: Permissions::from_mode(mode),
        }
    }

    /// True when something exists at the path.
    pub fn exists(&self) -> bool {
        self.kind != FileType::NotFound
    }

    pub fn is_regular_file(&self) -> bool {
        self.kind == FileType::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileType::Symlink
    }

    pub fn is_block_file(&self) -> bool {
        self.kind == FileType::Block
    }

    pub fn is_character_file(&self) -> bool {
        self.kind == FileType::Character
    }

    pub fn is_fifo(&self) -> bool {
        self.kind == FileType::Fifo
    }

    pub fn is_socket(&self) -> bool {
        self.kind == FileType::Socket
    }

    /// Exists, but is neither a regular file, a directory, nor a symlink.
    pub fn is_other(&self) -> bool {
        self.exists() && !self.is_regular_file() && !self.is_directory() && !self.is_symlink()
    }
}

impl Default for FileStatus {
    fn default() -> Self {
        Self::not_found()
    }
}

impl From<FileStatus> for u32 {
    fn from(status: FileStatus) -> u32 {
        status.encode()
    }
}

impl From<u32> for FileStatus {
    fn from(mode: u32) -> Self {
        Self::decode(mode)
    }
}
