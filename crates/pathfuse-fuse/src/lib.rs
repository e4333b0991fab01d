//! FUSE adapter for pathfuse filesystems.
//!
//! - [`Dispatcher`] - Path-level entry points returning `0`/count or `-errno`
//! - [`FuseBridge`] - `fuser::Filesystem` over a dispatcher plus [`InodeTable`]
//! - [`FuseMount`] - Mount, run and unmount lifecycle
//! - [`MountConfig`] - TOML-loadable mount options

pub mod bridge;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod inode;
pub mod session;

pub use bridge::FuseBridge;
pub use config::{ConfigError, MountConfig};
pub use dispatch::{Dispatcher, Stat};
pub use inode::InodeTable;
pub use session::{FuseMount, MountError, MountState};
