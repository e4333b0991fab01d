//! Mount configuration.
//!
//! Loaded from a TOML file, overridden from the command line, and turned into
//! `fuser` mount options. Every key is optional:
//!
//! ```toml
//! mount_point = "/mnt/pathfuse"
//! fs_name = "pathfuse"
//! read_only = false
//! allow_other = false
//! auto_unmount = true
//! default_permissions = true
//! attr_ttl_secs = 1
//! current_path = "/"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fuser::MountOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_ATTR_TTL, DEFAULT_FS_NAME};

/// Errors loading or validating a [`MountConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("mount point {} does not exist", .0.display())]
    MissingMountPoint(PathBuf),

    #[error("mount point {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("current path must be absolute: {}", .0.display())]
    RelativeCurrentPath(PathBuf),
}

/// Configuration for mounting a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Directory to mount on.
    pub mount_point: PathBuf,
    /// Name shown in the mount table.
    pub fs_name: String,
    /// Mount read-only.
    pub read_only: bool,
    /// Let users other than the mounting one access the mount.
    pub allow_other: bool,
    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,
    /// Have the kernel enforce permission bits.
    pub default_permissions: bool,
    /// Attribute and entry cache lifetime in seconds.
    pub attr_ttl_secs: u64,
    /// Initial current path of the mounted filesystem.
    pub current_path: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::new(),
            fs_name: DEFAULT_FS_NAME.to_string(),
            read_only: false,
            allow_other: false,
            auto_unmount: false,
            default_permissions: true,
            attr_ttl_secs: DEFAULT_ATTR_TTL.as_secs(),
            current_path: PathBuf::from("/"),
        }
    }
}

impl MountConfig {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Self::default()
        }
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded mount config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_allow_other(mut self, allow_other: bool) -> Self {
        self.allow_other = allow_other;
        self
    }

    pub fn with_auto_unmount(mut self, auto_unmount: bool) -> Self {
        self.auto_unmount = auto_unmount;
        self
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    /// Check that the config can be mounted as is.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mount_point.exists() {
            return Err(ConfigError::MissingMountPoint(self.mount_point.clone()));
        }
        if !self.mount_point.is_dir() {
            return Err(ConfigError::NotADirectory(self.mount_point.clone()));
        }
        if !self.current_path.has_root() {
            return Err(ConfigError::RelativeCurrentPath(self.current_path.clone()));
        }
        Ok(())
    }

    /// Options handed to `fuser` at mount time.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            if self.read_only {
                MountOption::RO
            } else {
                MountOption::RW
            },
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.default_permissions {
            options.push(MountOption::DefaultPermissions);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert_eq!(config.fs_name, "pathfuse");
        assert!(!config.read_only);
        assert_eq!(config.attr_ttl(), Duration::from_secs(1));
        assert_eq!(config.current_path, PathBuf::from("/"));
    }

    #[test]
    fn test_partial_toml() {
        let config = MountConfig::from_toml("mount_point = \"/mnt/x\"\nread_only = true\n")
            .unwrap();
        assert_eq!(config.mount_point, PathBuf::from("/mnt/x"));
        assert!(config.read_only);
        assert_eq!(config.fs_name, "pathfuse");
    }

    #[test]
    fn test_bad_toml() {
        let err = MountConfig::from_toml("read_only = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_mount_options() {
        let options = MountConfig::new("/mnt")
            .with_fs_name("demo")
            .with_read_only(true)
            .with_allow_other(true)
            .mount_options();
        assert!(options.contains(&MountOption::FSName("demo".to_string())));
        assert!(options.contains(&MountOption::RO));
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::DefaultPermissions));
        assert!(!options.contains(&MountOption::RW));
        assert!(!options.contains(&MountOption::AutoUnmount));
    }

    #[test]
    fn test_validate_missing_mount_point() {
        let config = MountConfig::new("/definitely/not/here");
        assert!(matches!(config.validate(), Err(ConfigError::MissingMountPoint(_))));
    }

    #[test]
    fn test_validate_relative_current_path() {
        let mut config = MountConfig::new("/");
        config.current_path = PathBuf::from("relative");
        assert!(matches!(config.validate(), Err(ConfigError::RelativeCurrentPath(_))));
    }
}
