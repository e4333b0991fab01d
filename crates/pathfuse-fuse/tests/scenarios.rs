//! End-to-end dispatch scenarios without a kernel mount.
//!
//! # Tiers
//!
//! - **Tier 0:** The single-file demo filesystem through the dispatcher
//! - **Tier 1:** Read-only and error mapping behavior
//! - **Tier 2:** Mount lifecycle and configuration files

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use pathfuse_fuse::{ConfigError, Dispatcher, FuseMount, MountConfig, MountError, MountState, Stat};
use pathfuse_vfs::{
    CurrentDir, FileStatus, FileSystem, MemoryBackend, OpenFlags, Permissions, VfsError, VfsResult,
};

const HELLO: &[u8] = b"Hello, world!\n";

/// Exposes `/` and a read-only `/hello`; writes are refused at open time.
#[derive(Default)]
struct HelloFs {
    cwd: CurrentDir,
}

impl FileSystem for HelloFs {
    fn current_dir(&self) -> &CurrentDir {
        &self.cwd
    }

    fn status(&self, path: &Path) -> VfsResult<FileStatus> {
        Ok(match path.to_str() {
            Some("/") => FileStatus::directory(Permissions::from_mode(0o755)),
            Some("/hello") => FileStatus::regular(Permissions::from_mode(0o444)),
            _ => FileStatus::not_found(),
        })
    }

    fn file_size(&self, _path: &Path) -> VfsResult<u64> {
        Ok(HELLO.len() as u64)
    }

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()> {
        if flags.wants_write() {
            return Err(VfsError::permission_denied(path.display().to_string()));
        }
        Ok(())
    }

    fn read(&self, _path: &Path, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let start = (offset as usize).min(HELLO.len());
        let n = (HELLO.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&HELLO[start..start + n]);
        Ok(n)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Tier 0: demo filesystem
// ============================================================================

#[test]
fn test_hello_read() {
    init_tracing();
    let d = Dispatcher::new(Arc::new(HelloFs::default()));

    assert_eq!(d.open("/hello", libc::O_RDONLY), 0);
    let mut buf = [0u8; 5];
    assert_eq!(d.read("/hello", &mut buf, 0), 5);
    assert_eq!(&buf, b"Hello");

    let mut tail = [0xFFu8; 8];
    assert_eq!(d.read("/hello", &mut tail, 100), 0);
    assert_eq!(tail, [0u8; 8]);
}

#[test]
fn test_hello_getattr() {
    let d = Dispatcher::new(Arc::new(HelloFs::default()));

    let mut stat = Stat::default();
    assert_eq!(d.getattr("/hello", &mut stat), 0);
    assert_eq!(stat.mode, 0o100444);
    assert_eq!(stat.size, HELLO.len() as u64);

    assert_eq!(d.getattr("/", &mut stat), 0);
    assert_eq!(stat.mode, 0o040755);
    assert_eq!(stat.nlink, 2);

    assert_eq!(d.getattr("/other", &mut stat), -libc::ENOENT);
}

#[test]
fn test_hello_unimplemented_operations() {
    let d = Dispatcher::new(Arc::new(HelloFs::default()));
    assert_eq!(d.mkdir("/dir", 0o755), -libc::ENOSYS);
    assert_eq!(d.write("/hello", b"x", 0), -libc::ENOSYS);
    assert_eq!(d.readdir("/", |_| false), -libc::ENOSYS);
    assert_eq!(d.getxattr("/hello", "user.x", &mut []), -libc::ENOSYS);
}

// ============================================================================
// Tier 1: read-only behavior
// ============================================================================

#[test]
fn test_write_open_denied() {
    let d = Dispatcher::new(Arc::new(HelloFs::default()));
    assert_eq!(d.open("/hello", libc::O_WRONLY), -libc::EACCES);
    assert_eq!(d.open("/hello", libc::O_RDWR), -libc::EACCES);
}

#[test]
fn test_read_only_memory_backend() {
    let fs = MemoryBackend::new()
        .with_file("/hello", HELLO)
        .with_read_only(true);
    let d = Dispatcher::new(Arc::new(fs));

    assert_eq!(d.open("/hello", libc::O_RDONLY), 0);
    assert_eq!(d.open("/hello", libc::O_WRONLY), -libc::EACCES);
    assert_eq!(d.write("/hello", b"x", 0), -libc::EACCES);
    assert_eq!(d.mkdir("/dir", 0o755), -libc::EACCES);
    assert_eq!(d.unlink("/hello"), -libc::EACCES);
    assert_eq!(d.access("/hello", libc::W_OK), -libc::EACCES);
    assert_eq!(d.access("/hello", libc::R_OK), 0);
}

#[test]
fn test_namespace_round_trip() {
    let d = Dispatcher::new(Arc::new(MemoryBackend::new()));

    assert_eq!(d.mkdir("/docs", 0o755), 0);
    assert_eq!(d.create("/docs/a.txt", 0o644, libc::O_WRONLY | libc::O_CREAT), 0);
    assert_eq!(d.write("/docs/a.txt", b"alpha", 0), 5);
    assert_eq!(d.symlink("a.txt", "/docs/latest"), 0);
    assert_eq!(d.rename("/docs", "/archive"), 0);

    let mut buf = [0u8; 16];
    assert_eq!(d.read("/archive/latest", &mut buf, 0), 5);
    assert_eq!(&buf[..5], b"alpha");

    let mut target = [0u8; 16];
    assert_eq!(d.readlink("/archive/latest", &mut target), 0);
    assert_eq!(&target[..6], b"a.txt\0");

    assert_eq!(d.rmdir("/archive"), -libc::ENOTEMPTY);
    assert_eq!(d.unlink("/archive/latest"), 0);
    assert_eq!(d.unlink("/archive/a.txt"), 0);
    assert_eq!(d.rmdir("/archive"), 0);
    assert_eq!(d.getattr("/archive", &mut Stat::default()), -libc::ENOENT);
}

#[test]
fn test_concurrent_dispatch() {
    let d = Dispatcher::new(Arc::new(MemoryBackend::new()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let d = d.clone();
            thread::spawn(move || {
                let path = format!("/f{i}");
                assert_eq!(d.create(&path, 0o644, libc::O_RDWR | libc::O_CREAT), 0);
                for round in 0..32u64 {
                    assert_eq!(d.write(&path, &[i as u8; 8], round * 8), 8);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut names = Vec::new();
    assert_eq!(d.readdir("/", |e| {
        names.push(e.name.clone());
        false
    }), 0);
    assert_eq!(names, ["f0", "f1", "f2", "f3"]);

    let mut stat = Stat::default();
    assert_eq!(d.getattr("/f3", &mut stat), 0);
    assert_eq!(stat.size, 256);
}

// ============================================================================
// Tier 2: lifecycle and configuration
// ============================================================================

#[test]
fn test_mount_rejects_file_as_mount_point() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mount = FuseMount::new(Arc::new(HelloFs::default()), MountConfig::new(file.path()));

    let err = mount.mount().unwrap_err();
    assert!(matches!(err, MountError::Config(ConfigError::NotADirectory(_))));
    assert_eq!(mount.state(), MountState::Unmounted);

    // Nothing to run or unmount
    mount.run().unwrap();
    mount.unmount().unwrap();
}

#[test]
fn test_load_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pathfuse.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "mount_point = {:?}", dir.path().display().to_string()).unwrap();
    writeln!(file, "fs_name = \"hello\"").unwrap();
    writeln!(file, "auto_unmount = true").unwrap();
    writeln!(file, "attr_ttl_secs = 5").unwrap();
    drop(file);

    let config = MountConfig::load(&path).unwrap();
    assert_eq!(config.mount_point, dir.path());
    assert_eq!(config.fs_name, "hello");
    assert!(config.auto_unmount);
    assert_eq!(config.attr_ttl().as_secs(), 5);
    config.validate().unwrap();
}

#[test]
fn test_load_missing_config_file() {
    let err = MountConfig::load(Path::new("/no/such/pathfuse.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
