//! pathfuse binary
//!
//! Mounts an in-memory filesystem holding a single `/hello` file.
//!
//! ## Usage
//!
//! ```bash
//! pathfuse /mnt/hello
//! pathfuse /mnt/hello --read-only --auto-unmount
//! pathfuse --config pathfuse.toml
//! ```
//!
//! Unmount with `fusermount -u <MOUNTPOINT>`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pathfuse_fuse::{ConfigError, FuseMount, MountConfig};
use pathfuse_vfs::{FileSystem, MemoryBackend};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const HELLO_PATH: &str = "/hello";
const HELLO_CONTENT: &str = "Hello, world!\n";

#[derive(Debug, Parser)]
#[command(name = "pathfuse", version, about = "Mount an in-memory pathfuse filesystem")]
struct Cli {
    /// Directory to mount on (overrides the config file)
    mount_point: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mount read-only
    #[arg(long)]
    read_only: bool,

    /// Name shown in the mount table
    #[arg(long)]
    fs_name: Option<String>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount when the process exits
    #[arg(long)]
    auto_unmount: bool,
}

fn build_config(cli: &Cli) -> Result<MountConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => MountConfig::load(path)?,
        None => MountConfig::default(),
    };
    if let Some(mount_point) = &cli.mount_point {
        config.mount_point = mount_point.clone();
    }
    if let Some(name) = &cli.fs_name {
        config.fs_name = name.clone();
    }
    config.read_only |= cli.read_only;
    config.allow_other |= cli.allow_other;
    config.auto_unmount |= cli.auto_unmount;
    Ok(config)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // SAFETY: getuid/getgid always succeed and touch no memory
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    let fs = MemoryBackend::new()
        .with_owner(uid, gid)
        .with_file(HELLO_PATH, HELLO_CONTENT)
        .with_read_only(config.read_only);
    if let Err(e) = fs.set_current_path(&config.current_path) {
        tracing::error!("Invalid current path {}: {}", config.current_path.display(), e);
        return ExitCode::FAILURE;
    }

    let mount = FuseMount::new(Arc::new(fs), config);
    if let Err(e) = mount.mount() {
        tracing::error!("Mount error: {}", e);
        return ExitCode::FAILURE;
    }
    match mount.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Session error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from(["pathfuse", "/mnt/x", "--read-only", "--fs-name", "demo"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.mount_point, PathBuf::from("/mnt/x"));
        assert!(config.read_only);
        assert_eq!(config.fs_name, "demo");
        assert!(!config.allow_other);
    }
}
