//! VFS error types.
//!
//! The taxonomy is closed: every failure a filesystem reports is one of the
//! [`ErrorCode`] kinds, and each kind maps to exactly one POSIX errno. The
//! message carried by each variant is for diagnostics only.

use std::io;
use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

/// POSIX error kinds a filesystem may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    NoSuchFileOrDirectory,
    PermissionDenied,
    FunctionNotSupported,
    IoError,
    NotADirectory,
    IsADirectory,
    FileExists,
    FileTooLarge,
    FilenameTooLong,
    DirectoryNotEmpty,
}

impl ErrorCode {
    /// The positive errno value for this kind.
    pub fn errno(self) -> i32 {
        match self {
            ErrorCode::NoSuchFileOrDirectory => libc::ENOENT,
            ErrorCode::PermissionDenied => libc::EACCES,
            ErrorCode::FunctionNotSupported => libc::ENOSYS,
            ErrorCode::IoError => libc::EIO,
            ErrorCode::NotADirectory => libc::ENOTDIR,
            ErrorCode::IsADirectory => libc::EISDIR,
            ErrorCode::FileExists => libc::EEXIST,
            ErrorCode::FileTooLarge => libc::EFBIG,
            ErrorCode::FilenameTooLong => libc::ENAMETOOLONG,
            ErrorCode::DirectoryNotEmpty => libc::ENOTEMPTY,
        }
    }

    /// Map a raw errno back to a kind, if it is one of ours.
    pub fn from_errno(errno: i32) -> Option<Self> {
        let code = match errno {
            libc::ENOENT => ErrorCode::NoSuchFileOrDirectory,
            libc::EACCES | libc::EPERM => ErrorCode::PermissionDenied,
            libc::ENOSYS | libc::ENOTSUP => ErrorCode::FunctionNotSupported,
            libc::EIO => ErrorCode::IoError,
            libc::ENOTDIR => ErrorCode::NotADirectory,
            libc::EISDIR => ErrorCode::IsADirectory,
            libc::EEXIST => ErrorCode::FileExists,
            libc::EFBIG => ErrorCode::FileTooLarge,
            libc::ENAMETOOLONG => ErrorCode::FilenameTooLong,
            libc::ENOTEMPTY => ErrorCode::DirectoryNotEmpty,
            _ => return None,
        };
        Some(code)
    }
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation not implemented by this filesystem.
    #[error("function not supported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected something other than a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Path already exists.
    #[error("file exists: {0}")]
    AlreadyExists(String),

    /// File would exceed the maximum size.
    #[error("file too large: {0}")]
    FileTooLarge(String),

    /// File name too long.
    #[error("file name too long: {0}")]
    NameTooLong(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
}

impl VfsError {
    /// Build an error of the given kind.
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            ErrorCode::NoSuchFileOrDirectory => Self::NotFound(msg),
            ErrorCode::PermissionDenied => Self::PermissionDenied(msg),
            ErrorCode::FunctionNotSupported => Self::Unsupported(msg),
            ErrorCode::IoError => Self::Io(msg),
            ErrorCode::NotADirectory => Self::NotADirectory(msg),
            ErrorCode::IsADirectory => Self::IsADirectory(msg),
            ErrorCode::FileExists => Self::AlreadyExists(msg),
            ErrorCode::FileTooLarge => Self::FileTooLarge(msg),
            ErrorCode::FilenameTooLong => Self::NameTooLong(msg),
            ErrorCode::DirectoryNotEmpty => Self::DirectoryNotEmpty(msg),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create an Unsupported error naming the operation.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported(op.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// The kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NoSuchFileOrDirectory,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Unsupported(_) => ErrorCode::FunctionNotSupported,
            Self::Io(_) => ErrorCode::IoError,
            Self::NotADirectory(_) => ErrorCode::NotADirectory,
            Self::IsADirectory(_) => ErrorCode::IsADirectory,
            Self::AlreadyExists(_) => ErrorCode::FileExists,
            Self::FileTooLarge(_) => ErrorCode::FileTooLarge,
            Self::NameTooLong(_) => ErrorCode::FilenameTooLong,
            Self::DirectoryNotEmpty(_) => ErrorCode::DirectoryNotEmpty,
        }
    }

    /// The positive errno value for this error.
    pub fn errno(&self) -> i32 {
        self.code().errno()
    }

    /// The diagnostic message, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::PermissionDenied(msg)
            | Self::Unsupported(msg)
            | Self::Io(msg)
            | Self::NotADirectory(msg)
            | Self::IsADirectory(msg)
            | Self::AlreadyExists(msg)
            | Self::FileTooLarge(msg)
            | Self::NameTooLong(msg)
            | Self::DirectoryNotEmpty(msg) => msg,
        }
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        if let Some(code) = e.raw_os_error().and_then(ErrorCode::from_errno) {
            return Self::new(code, e.to_string());
        }
        let code = match e.kind() {
            io::ErrorKind::NotFound => ErrorCode::NoSuchFileOrDirectory,
            io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            io::ErrorKind::Unsupported => ErrorCode::FunctionNotSupported,
            io::ErrorKind::AlreadyExists => ErrorCode::FileExists,
            io::ErrorKind::NotADirectory => ErrorCode::NotADirectory,
            io::ErrorKind::IsADirectory => ErrorCode::IsADirectory,
            io::ErrorKind::DirectoryNotEmpty => ErrorCode::DirectoryNotEmpty,
            io::ErrorKind::FileTooLarge => ErrorCode::FileTooLarge,
            _ => ErrorCode::IoError,
        };
        Self::new(code, e.to_string())
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let errno = e.errno();
        io::Error::new(io::Error::from_raw_os_error(errno).kind(), e.to_string())
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
