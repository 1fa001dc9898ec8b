pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod filesystem;
pub mod path_utils;
pub mod tree;
pub mod validator;

pub mod mock;

pub use collection::{
    DirectoryCollection, EntityCollection, FileCollection, JsonFileCollection, Key,
    LinkCollection, ReadWriteFileCollection, ReadableFileCollection, TypedCollection,
    WritableFileCollection,
};
pub use config::FsConfig;
pub use entity::{
    CopyReport, Directory, Entity, EntityKind, File, FsNode, HasOwnership, HasPermissions,
    HasTimestamps, Link, LinkTarget, ObservableMembership,
};
pub use error::{FileError, Result};
pub use filesystem::{FileSystem, FileSystemError, NodeKind, RealFileSystem, SharedFileSystem};
pub use tree::{FileTree, SortOrder};
