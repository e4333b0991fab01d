//! Integration tests for the filesystem trait and the memory backend.
//!
//! # Tiers
//!
//! - **Tier 0:** Partial implementations. Only the overridden subset works;
//!   everything else reports `function_not_supported`
//! - **Tier 1:** Path resolution through a real backend
//! - **Tier 2:** Concurrent callers sharing one instance

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use pathfuse_vfs::{
    CurrentDir, ErrorCode, FileStatus, FileSystem, MemoryBackend, OpenFlags, Permissions,
    VfsError, VfsResult,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Tier 0: partial implementations
// ============================================================================

const HELLO: &[u8] = b"Hello, world!\n";

/// The classic single-file demo: `/` and `/hello`, nothing else.
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

    fn read(&self, path: &Path, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        if path != Path::new("/hello") {
            return Err(VfsError::not_found(path.display().to_string()));
        }
        let start = (offset as usize).min(HELLO.len());
        let n = (HELLO.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&HELLO[start..start + n]);
        Ok(n)
    }
}

#[test]
fn test_partial_implementation() {
    init_tracing();
    let fs = HelloFs::default();

    assert!(fs.exists(Path::new("/hello")).unwrap());
    assert!(fs.is_regular_file(Path::new("/hello")).unwrap());
    assert!(!fs.exists(Path::new("/nope")).unwrap());

    let mut buf = [0u8; 5];
    assert_eq!(fs.read(Path::new("/hello"), &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"Hello");

    let err = fs.write(Path::new("/hello"), b"x", 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FunctionNotSupported);
    let err = fs.open(Path::new("/hello"), OpenFlags::read()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FunctionNotSupported);
}

#[test]
fn test_symlink_status_defaults_to_status() {
    let fs = HelloFs::default();
    let status = fs.symlink_status(Path::new("/hello")).unwrap();
    assert!(status.is_regular_file());
    assert!(!fs.is_symlink(Path::new("/hello")).unwrap());
}

// ============================================================================
// Tier 1: resolution through the memory backend
// ============================================================================

#[test]
fn test_create_directories_scenario() {
    init_tracing();
    let fs = MemoryBackend::new();
    fs.create_directories(Path::new("/a/b/c")).unwrap();

    for p in ["/a", "/a/b", "/a/b/c"] {
        assert!(fs.exists(Path::new(p)).unwrap(), "{p} should exist");
        assert!(fs.is_directory(Path::new(p)).unwrap());
    }

    // Idempotent when everything already exists
    fs.create_directories(Path::new("/a/b/c")).unwrap();
}

#[test]
fn test_create_directories_through_file_fails() {
    let fs = MemoryBackend::new().with_file("/a/file", "x");
    let err = fs.create_directories(Path::new("/a/file/sub")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotADirectory);
}

#[test]
fn test_canonical_through_backend() {
    let fs = MemoryBackend::new()
        .with_file("/srv/data/file", "x")
        .with_symlink("/current", "srv/data")
        .with_symlink("/srv/latest", "../current");

    let once = fs.canonical(Path::new("/srv/latest/file")).unwrap();
    assert_eq!(once, PathBuf::from("/srv/data/file"));
    assert_eq!(fs.canonical(&once).unwrap(), once);

    assert!(fs.equivalent(Path::new("/current"), Path::new("/srv/data")).unwrap());
    assert!(!fs.equivalent(Path::new("/current"), Path::new("/srv")).unwrap());
}

#[test]
fn test_symlink_cycle_through_backend() {
    let fs = MemoryBackend::new()
        .with_symlink("/a", "/b")
        .with_symlink("/b", "/a");

    let err = fs.canonical(Path::new("/a")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoError);

    // status follows links, so it hits the same bound
    let err = fs.status(Path::new("/a")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoError);

    // symlink_status does not follow the last component
    assert!(fs.symlink_status(Path::new("/a")).unwrap().is_symlink());
}

#[test]
fn test_current_path_round_trip() {
    let fs = MemoryBackend::new()
        .with_file("/work/project/src/main.rs", "fn main() {}")
        .with_symlink("/p", "/work/project");

    fs.set_current_path(Path::new("/p/src")).unwrap();
    assert_eq!(fs.current_path(), PathBuf::from("/work/project/src"));
    assert_eq!(fs.absolute(Path::new("../Cargo.toml")), PathBuf::from("/work/project/Cargo.toml"));
    assert!(fs.exists(Path::new("main.rs")).unwrap());
}

// ============================================================================
// Tier 2: concurrency
// ============================================================================

#[test]
fn test_concurrent_writers() {
    init_tracing();
    let fs = Arc::new(MemoryBackend::new());
    fs.create_directory(Path::new("/shared")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let path = PathBuf::from(format!("/shared/file-{i}"));
                fs.create_file(&path).unwrap();
                for chunk in 0..16u64 {
                    fs.write(&path, &[i as u8; 64], chunk * 64).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = fs.read_directory(Path::new("/shared")).unwrap();
    assert_eq!(entries.len(), 8);
    for entry in entries {
        let path = Path::new("/shared").join(&entry.name);
        assert_eq!(fs.file_size(&path).unwrap(), 16 * 64);
    }
}

#[test]
fn test_concurrent_current_path_changes() {
    let fs = Arc::new(
        MemoryBackend::new()
            .with_file("/one/f", "1")
            .with_file("/two/f", "2"),
    );

    let handles: Vec<_> = ["/one", "/two"]
        .into_iter()
        .map(|dir| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                for _ in 0..100 {
                    fs.set_current_path(Path::new(dir)).unwrap();
                    let current = fs.current_path();
                    assert!(current == Path::new("/one") || current == Path::new("/two"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
