mod real;

pub use real::RealFileSystem;

use std::fmt;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

impl FileSystemError {
    /// Classifies an OS error against the path it was raised for.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileSystemError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => {
                FileSystemError::PermissionDenied(path.to_path_buf())
            }
            io::ErrorKind::AlreadyExists => FileSystemError::AlreadyExists(path.to_path_buf()),
            _ => FileSystemError::Io(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FileSystemError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FileSystemError>;

/// Kind of a filesystem node as reported by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Regular,
    Directory,
    Link,
    Socket,
    Fifo,
    Char,
    Block,
    Unknown,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Regular,
        NodeKind::Directory,
        NodeKind::Link,
        NodeKind::Socket,
        NodeKind::Fifo,
        NodeKind::Char,
        NodeKind::Block,
        NodeKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Regular => "regular",
            NodeKind::Directory => "directory",
            NodeKind::Link => "link",
            NodeKind::Socket => "socket",
            NodeKind::Fifo => "fifo",
            NodeKind::Char => "char",
            NodeKind::Block => "block",
            NodeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = FileSystemError;

    fn from_str(s: &str) -> Result<Self> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FileSystemError::PathError(format!("unknown node kind: {s}")))
    }
}

#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub path: PathBuf,
    pub kind: NodeKind,
    /// Permission bits only (`mode & 0o7777`).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub len: u64,
    pub modified: SystemTime,
    pub accessed: SystemTime,
}

/// Primitive, non-recursive filesystem operations.
///
/// Every recursive behavior (tree deletion, directory copy, recursive chmod)
/// is built on top of this trait by the entity layer.
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Stats `path` without following a trailing symlink.
    fn stat(&self, path: &Path) -> Result<NodeMetadata>;

    /// Stats `path`, following symlinks.
    fn metadata(&self, path: &Path) -> Result<NodeMetadata>;

    fn exists(&self, path: &Path) -> Result<bool>;

    /// Names of the immediate children of `path`, sorted, without `.`/`..`.
    fn list_children(&self, path: &Path) -> Result<Vec<String>>;

    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Creates a symlink at `dest` pointing to `source`.
    fn symlink(&self, source: &Path, dest: &Path) -> Result<()>;

    fn unlink(&self, path: &Path) -> Result<()>;

    fn rmdir(&self, path: &Path) -> Result<()>;

    fn chmod(&self, path: &Path, mode: u32) -> Result<()>;

    /// Changes ownership of the node itself; symlinks are not followed.
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    fn open(&self, path: &Path) -> Result<Box<dyn BufRead + Send>>;

    fn write_file(&self, path: &Path, contents: &[u8], append: bool) -> Result<()>;

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()>;

    fn is_readable(&self, path: &Path) -> bool;

    fn is_writable(&self, path: &Path) -> bool;

    fn resolve_user(&self, name: &str) -> Result<u32>;

    fn resolve_group(&self, name: &str) -> Result<u32>;

    fn set_times(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()>;
}

pub type SharedFileSystem = Arc<dyn FileSystem>;
