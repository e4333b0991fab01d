//! Mount lifecycle.
//!
//! A [`FuseMount`] moves through three phases: unmounted, mounted (kernel
//! session established, nothing serving yet) and running (the request loop
//! owns the session). `mount`, `run` and `unmount` are each no-ops in the
//! phases where they make no sense, and dropping the mount unmounts it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use fuser::{Session, SessionUnmounter};
use parking_lot::Mutex;
use pathfuse_vfs::FileSystem;
use thiserror::Error;

use crate::bridge::FuseBridge;
use crate::config::{ConfigError, MountConfig};

/// Errors from the mount lifecycle.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("invalid mount configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to mount {}: {source}", mount_point.display())]
    Session {
        mount_point: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("request loop failed: {0}")]
    Run(#[source] io::Error),

    #[error("unmount failed: {0}")]
    Unmount(#[source] io::Error),
}

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounted,
    Running,
}

enum Phase<S, U> {
    Unmounted,
    Mounted(S),
    Running(U),
}

impl<S, U> Phase<S, U> {
    /// Leave the running phase after its request loop returned. Any other
    /// phase was set after the loop ended and is kept.
    fn finish_run(&mut self) -> bool {
        if matches!(self, Phase::Running(_)) {
            *self = Phase::Unmounted;
            true
        } else {
            false
        }
    }
}

/// A filesystem instance bound (or bindable) to a mount point.
pub struct FuseMount<F: FileSystem + ?Sized + 'static> {
    fs: Arc<F>,
    config: MountConfig,
    phase: Mutex<Phase<Session<FuseBridge<F>>, SessionUnmounter>>,
}

impl<F: FileSystem + ?Sized + 'static> FuseMount<F> {
    pub fn new(fs: Arc<F>, config: MountConfig) -> Self {
        Self {
            fs,
            config,
            phase: Mutex::new(Phase::Unmounted),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &Arc<F> {
        &self.fs
    }

    pub fn state(&self) -> MountState {
        match *self.phase.lock() {
            Phase::Unmounted => MountState::Unmounted,
            Phase::Mounted(_) => MountState::Mounted,
            Phase::Running(_) => MountState::Running,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.state() != MountState::Unmounted
    }

    /// Establish the kernel session. No-op if already mounted.
    pub fn mount(&self) -> Result<(), MountError> {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Unmounted) {
            tracing::debug!(mount_point = %self.config.mount_point.display(), "already mounted");
            return Ok(());
        }

        self.config.validate()?;
        let bridge = FuseBridge::new(Arc::clone(&self.fs), &self.config);
        let session = Session::new(bridge, &self.config.mount_point, &self.config.mount_options())
            .map_err(|source| MountError::Session {
                mount_point: self.config.mount_point.clone(),
                source,
            })?;

        tracing::info!(
            mount_point = %self.config.mount_point.display(),
            fs_name = %self.config.fs_name,
            read_only = self.config.read_only,
            "mounted"
        );
        *phase = Phase::Mounted(session);
        Ok(())
    }

    /// Serve kernel requests until the filesystem is unmounted.
    ///
    /// Blocks the calling thread. Returns immediately if not mounted.
    pub fn run(&self) -> Result<(), MountError> {
        let mut session = {
            let mut phase = self.phase.lock();
            match std::mem::replace(&mut *phase, Phase::Unmounted) {
                Phase::Mounted(mut session) => {
                    *phase = Phase::Running(session.unmount_callable());
                    session
                }
                other => {
                    *phase = other;
                    tracing::debug!("run called while not mounted");
                    return Ok(());
                }
            }
        };

        tracing::info!(mount_point = %self.config.mount_point.display(), "serving requests");
        let result = session.run();
        // Releases the kernel mount, so a racing unmount finds nothing to do
        drop(session);
        if self.phase.lock().finish_run() {
            tracing::info!(mount_point = %self.config.mount_point.display(), "request loop exited");
        } else {
            tracing::debug!(
                mount_point = %self.config.mount_point.display(),
                "request loop exited after unmount"
            );
        }
        result.map_err(MountError::Run)
    }

    /// Detach from the kernel. Idempotent; stops a running request loop and
    /// succeeds without effect once that loop has already ended.
    pub fn unmount(&self) -> Result<(), MountError> {
        let mut phase = self.phase.lock();
        match std::mem::replace(&mut *phase, Phase::Unmounted) {
            Phase::Unmounted => Ok(()),
            Phase::Mounted(session) => {
                drop(session);
                tracing::info!(mount_point = %self.config.mount_point.display(), "unmounted");
                Ok(())
            }
            Phase::Running(mut unmounter) => {
                unmounter.unmount().map_err(MountError::Unmount)?;
                tracing::info!(mount_point = %self.config.mount_point.display(), "unmounted");
                Ok(())
            }
        }
    }
}

impl<F: FileSystem + ?Sized + 'static> Drop for FuseMount<F> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            tracing::warn!(error = %e, "unmount on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfuse_vfs::MemoryBackend;

    fn unmounted(mount_point: &str) -> FuseMount<MemoryBackend> {
        FuseMount::new(Arc::new(MemoryBackend::new()), MountConfig::new(mount_point))
    }

    #[test]
    fn test_starts_unmounted() {
        let mount = unmounted("/nowhere");
        assert_eq!(mount.state(), MountState::Unmounted);
        assert!(!mount.is_mounted());
    }

    #[test]
    fn test_run_and_unmount_are_noops_when_unmounted() {
        let mount = unmounted("/nowhere");
        mount.run().unwrap();
        mount.unmount().unwrap();
        mount.unmount().unwrap();
        assert_eq!(mount.state(), MountState::Unmounted);
    }

    #[test]
    fn test_finish_run_keeps_later_phases() {
        let mut phase: Phase<(), ()> = Phase::Running(());
        assert!(phase.finish_run());
        assert!(matches!(phase, Phase::Unmounted));

        // Unmounted (or remounted) while the loop was winding down
        assert!(!phase.finish_run());
        assert!(matches!(phase, Phase::Unmounted));
        let mut phase: Phase<(), ()> = Phase::Mounted(());
        assert!(!phase.finish_run());
        assert!(matches!(phase, Phase::Mounted(())));
    }

    #[test]
    fn test_mount_fails_fast_on_missing_mount_point() {
        let mount = unmounted("/definitely/not/here");
        let err = mount.mount().unwrap_err();
        assert!(matches!(err, MountError::Config(ConfigError::MissingMountPoint(_))));
        assert_eq!(mount.state(), MountState::Unmounted);
    }
}
