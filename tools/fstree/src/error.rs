use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collection::Key;
use crate::filesystem::FileSystemError;
use crate::validator::ValidationError;

#[derive(Debug, Error)]
pub enum FileError {
    /// Node missing, unexpectedly present, or the entity was already deleted.
    #[error("{message}: {}", .path.display())]
    Exists { path: PathBuf, message: String },

    #[error("{message}: {}", .path.display())]
    Type { path: PathBuf, message: String },

    #[error("read failed for {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("write failed for {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("could not build {collection} from item {key}")]
    Factory {
        collection: &'static str,
        key: Key,
        #[source]
        source: Box<FileError>,
    },
}

pub type Result<T> = std::result::Result<T, FileError>;

impl FileError {
    pub fn exists(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FileError::Exists {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FileError::Type {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FileError::Read {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FileError::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn deleted(path: &Path) -> Self {
        FileError::exists(path, "entity already deleted")
    }

    /// Maps a gateway failure raised while reading. A missing node becomes
    /// an existence error.
    pub fn from_read(err: FileSystemError, path: &Path) -> Self {
        match err {
            FileSystemError::NotFound(missing) => FileError::exists(missing, "no such file or directory"),
            other => FileError::read(path, other.to_string()),
        }
    }

    /// Maps a gateway failure raised while mutating.
    pub fn from_write(err: FileSystemError, path: &Path) -> Self {
        match err {
            FileSystemError::NotFound(missing) => FileError::exists(missing, "no such file or directory"),
            FileSystemError::AlreadyExists(present) => FileError::exists(present, "already exists"),
            other => FileError::write(path, other.to_string()),
        }
    }

    pub fn is_exists(&self) -> bool {
        matches!(self, FileError::Exists { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, FileError::Write { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FileError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_gateway_not_found_maps_to_existence_error() {
        let err = FileError::from_write(
            FileSystemError::NotFound(PathBuf::from("/gone")),
            Path::new("/gone"),
        );
        assert!(err.is_exists());

        let err = FileError::from_write(
            FileSystemError::PermissionDenied(PathBuf::from("/locked")),
            Path::new("/locked"),
        );
        assert!(err.is_write());
        assert!(err.to_string().contains("/locked"));
    }

    #[test]
    fn test_factory_error_preserves_cause() {
        let err = FileError::Factory {
            collection: "FileCollection",
            key: Key::Index(2),
            source: Box::new(FileError::InvalidArgument("empty name".to_string())),
        };

        assert_eq!(err.to_string(), "could not build FileCollection from item 2");
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert_eq!(cause, "invalid argument: empty name");
    }
}
