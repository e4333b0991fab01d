//! Filesystem backends.
//!
//! Backends implement [`FileSystem`](crate::FileSystem) for different storage
//! types.

mod memory;

pub use memory::MemoryBackend;
