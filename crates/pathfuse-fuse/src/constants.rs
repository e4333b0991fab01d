//! Adapter configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Inode number of the mount root (FUSE convention).
pub const ROOT_INO: u64 = fuser::FUSE_ROOT_ID;

/// Filesystem name reported to the kernel when none is configured.
pub const DEFAULT_FS_NAME: &str = "pathfuse";

/// How long the kernel may cache attributes and entries.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Preferred I/O size reported in attributes.
pub const BLOCK_SIZE: u32 = 4096;

/// Unit of `FileAttr::blocks`.
pub const SECTOR_SIZE: u64 = 512;

/// Buffer size for `readlink` targets.
pub const PATH_MAX: usize = libc::PATH_MAX as usize;
