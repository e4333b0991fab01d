//! Path-based virtual filesystem abstraction.
//!
//! Key components:
//!
//! - [`FileSystem`] - Capability trait; every operation defaults to
//!   `function_not_supported`
//! - [`FileStatus`] - (type, permissions) pair with the POSIX mode word codec
//! - [`VfsError`] - Closed POSIX error taxonomy
//! - [`resolve`] - `absolute`/`canonical`/`equivalent` built on the trait's
//!   status and symlink primitives
//! - [`MemoryBackend`] - In-memory filesystem (for the demo binary, testing)
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: Operations take paths. The FUSE adapter keeps
//!   the inode ↔ path mapping.
//! - **Synchronous**: Calls run on the kernel worker thread that delivered
//!   them; implementations block if they must.
//! - **Bounded symlink expansion**: Resolution gives up with `io_error` after
//!   [`resolve::MAX_SYMLINK_EXPANSIONS`] links, so cycles are an error.

pub mod backends;
mod error;
mod mode;
mod ops;
pub mod path;
pub mod resolve;
mod types;

pub use backends::MemoryBackend;
pub use error::{ErrorCode, VfsError, VfsResult};
pub use mode::{AccessMode, FileStatus, FileType, Permissions, S_IFMT};
pub use ops::{CurrentDir, FileSystem};
pub use types::{CopyOptions, DirEntry, FileLock, LockCommand, OpenFlags, StatFs};
