//! Typed wrappers over single filesystem nodes.
//!
//! An entity is constructed only for a node that exists and has the expected
//! kind. Its path never changes, and once deleted it stays deleted: every
//! later mutating call fails with an existence error.

mod directory;
mod file;
mod link;
mod traits;

pub use directory::Directory;
pub use file::{File, LineIter};
pub use link::{Link, LinkTarget};
pub use traits::{FsNode, HasOwnership, HasPermissions, HasTimestamps, ObservableMembership};

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{FileError, Result};
use crate::filesystem::{FileSystem, NodeKind, SharedFileSystem};
use crate::path_utils;
use crate::tree::TreeObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    File,
    Directory,
    Link,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::File => "file",
            EntityKind::Directory => "directory",
            EntityKind::Link => "link",
        };
        f.write_str(name)
    }
}

/// State every entity carries: identity, gateway, lifecycle flag and the
/// weak handles of the trees it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    path: PathBuf,
    fs: SharedFileSystem,
    deleted: bool,
    observers: Vec<TreeObserver>,
}

impl Node {
    fn new(fs: SharedFileSystem, path: PathBuf) -> Self {
        Self {
            path,
            fs,
            deleted: false,
            observers: Vec::new(),
        }
    }

    fn observe(&mut self, observer: TreeObserver) {
        self.observers.retain(TreeObserver::is_alive);
        if !self.observers.iter().any(|known| known.same_tree(&observer)) {
            self.observers.push(observer);
        }
    }

    fn finish_delete(&mut self) {
        for observer in &self.observers {
            observer.notify_deleted(&self.path);
        }
        self.deleted = true;
    }
}

/// Any of the three entity kinds.
#[derive(Debug, Clone)]
pub enum Entity {
    File(File),
    Directory(Directory),
    Link(Link),
}

impl Entity {
    /// Wraps the node at `path`, detecting links first, then directories,
    /// and treating everything else as a file.
    pub fn open(fs: SharedFileSystem, path: impl AsRef<Path>) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let metadata = fs
            .stat(&path)
            .map_err(|e| FileError::from_read(e, &path))?;

        match metadata.kind {
            NodeKind::Link => Ok(Entity::Link(Link::open(fs, path)?)),
            NodeKind::Directory => Ok(Entity::Directory(Directory::open(fs, path)?)),
            _ => Ok(Entity::File(File::open(fs, path)?)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::File(_) => EntityKind::File,
            Entity::Directory(_) => EntityKind::Directory,
            Entity::Link(_) => EntityKind::Link,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Entity::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Entity::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Entity::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn delete(&mut self) -> Result<()> {
        match self {
            Entity::File(file) => file.delete(),
            Entity::Directory(dir) => dir.delete(),
            Entity::Link(link) => link.delete(),
        }
    }

    pub fn copy(&self, dest: impl AsRef<Path>, overwrite: bool) -> Result<CopyReport> {
        match self {
            Entity::File(file) => Ok(CopyReport::single(Entity::File(file.copy(dest, overwrite)?))),
            Entity::Directory(dir) => dir.copy(dest, overwrite),
            Entity::Link(link) => Ok(CopyReport::single(Entity::Link(link.copy(dest, overwrite)?))),
        }
    }

    pub fn move_to(&mut self, dest: impl AsRef<Path>, overwrite: bool) -> Result<Entity> {
        match self {
            Entity::File(file) => file.move_to(dest, overwrite).map(Entity::File),
            Entity::Directory(dir) => dir.move_to(dest, overwrite).map(Entity::Directory),
            Entity::Link(link) => link.move_to(dest, overwrite).map(Entity::Link),
        }
    }

    /// `recursive` only matters for directories; links are left untouched.
    pub fn chmod(&self, mode: u32, recursive: bool) -> Result<()> {
        match self {
            Entity::File(file) => file.chmod(mode),
            Entity::Directory(dir) => dir.chmod(mode, recursive),
            Entity::Link(link) => link.chmod(mode),
        }
    }

    /// Creates a symlink at `dest` pointing at this entity.
    pub fn link(&self, dest: impl AsRef<Path>, force: bool) -> Result<Link> {
        self.ensure_live()?;
        Link::create(self.fs().clone(), self.path(), dest, force)
    }

    fn node(&self) -> &Node {
        match self {
            Entity::File(file) => &file.node,
            Entity::Directory(dir) => &dir.node,
            Entity::Link(link) => &link.node,
        }
    }

    fn node_mut(&mut self) -> &mut Node {
        match self {
            Entity::File(file) => &mut file.node,
            Entity::Directory(dir) => &mut dir.node,
            Entity::Link(link) => &mut link.node,
        }
    }
}

impl FsNode for Entity {
    fn path(&self) -> &Path {
        &self.node().path
    }

    fn fs(&self) -> &SharedFileSystem {
        &self.node().fs
    }

    fn is_deleted(&self) -> bool {
        self.node().deleted
    }
}

impl HasPermissions for Entity {}

impl HasTimestamps for Entity {}

impl HasOwnership for Entity {
    fn chown(&mut self, user: Option<&str>, group: Option<&str>, recursive: bool) -> Result<()> {
        match self {
            Entity::File(file) => file.chown(user, group, recursive),
            Entity::Directory(dir) => dir.chown(user, group, recursive),
            Entity::Link(link) => link.chown(user, group, recursive),
        }
    }
}

impl ObservableMembership for Entity {
    fn observers(&self) -> &[TreeObserver] {
        &self.node().observers
    }

    fn observe(&mut self, observer: TreeObserver) {
        self.node_mut().observe(observer);
    }
}

impl From<File> for Entity {
    fn from(file: File) -> Self {
        Entity::File(file)
    }
}

impl From<Directory> for Entity {
    fn from(dir: Directory) -> Self {
        Entity::Directory(dir)
    }
}

impl From<Link> for Entity {
    fn from(link: Link) -> Self {
        Entity::Link(link)
    }
}

/// Value accepted by entity collections: a ready entity or a path to wrap.
#[derive(Debug, Clone)]
pub enum Insertable {
    Path(PathBuf),
    Entity(Entity),
}

impl Insertable {
    /// Turns a path into an entity through [`Entity::open`]. Construction
    /// errors are returned as-is.
    pub fn resolve(self, fs: &SharedFileSystem) -> Result<Entity> {
        match self {
            Insertable::Path(path) => Entity::open(fs.clone(), path),
            Insertable::Entity(entity) => Ok(entity),
        }
    }
}

impl From<Entity> for Insertable {
    fn from(entity: Entity) -> Self {
        Insertable::Entity(entity)
    }
}

impl From<File> for Insertable {
    fn from(file: File) -> Self {
        Insertable::Entity(Entity::File(file))
    }
}

impl From<Directory> for Insertable {
    fn from(dir: Directory) -> Self {
        Insertable::Entity(Entity::Directory(dir))
    }
}

impl From<Link> for Insertable {
    fn from(link: Link) -> Self {
        Insertable::Entity(Entity::Link(link))
    }
}

impl From<PathBuf> for Insertable {
    fn from(path: PathBuf) -> Self {
        Insertable::Path(path)
    }
}

impl From<&Path> for Insertable {
    fn from(path: &Path) -> Self {
        Insertable::Path(path.to_path_buf())
    }
}

impl From<&str> for Insertable {
    fn from(path: &str) -> Self {
        Insertable::Path(PathBuf::from(path))
    }
}

impl From<String> for Insertable {
    fn from(path: String) -> Self {
        Insertable::Path(PathBuf::from(path))
    }
}

#[derive(Debug)]
pub struct CopyFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: FileError,
}

/// Outcome of a copy. Directory copies continue past failing children, which
/// are collected in `failed`.
#[derive(Debug)]
pub struct CopyReport {
    pub destination: Entity,
    pub copied: Vec<PathBuf>,
    pub failed: Vec<CopyFailure>,
}

impl CopyReport {
    fn single(destination: Entity) -> Self {
        let copied = vec![destination.path().to_path_buf()];
        Self {
            destination,
            copied,
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes whatever sits at `path`: a single unlink for files and links, a
/// depth-first removal for directories. Links are never followed.
pub(crate) fn remove_node(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let metadata = fs
        .stat(path)
        .map_err(|e| FileError::from_read(e, path))?;
    if metadata.kind == NodeKind::Directory {
        remove_tree(fs, path)
    } else {
        fs.unlink(path).map_err(|e| FileError::from_write(e, path))
    }
}

/// Removes a directory and everything below it. Nothing is removed unless
/// the directory and every descendant other than links is writable.
pub(crate) fn remove_tree(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    ensure_removable(fs, path)?;
    remove_tree_unchecked(fs, path)
}

fn ensure_removable(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    if !fs.is_writable(path) {
        return Err(FileError::write(path, "directory is not writable"));
    }

    let children = fs
        .list_children(path)
        .map_err(|e| FileError::from_read(e, path))?;
    for name in children {
        let child = path.join(name);
        let metadata = fs
            .stat(&child)
            .map_err(|e| FileError::from_read(e, &child))?;
        match metadata.kind {
            NodeKind::Directory => ensure_removable(fs, &child)?,
            NodeKind::Link => {}
            _ if !fs.is_writable(&child) => {
                return Err(FileError::write(&child, "file is not writable"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn remove_tree_unchecked(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let children = fs
        .list_children(path)
        .map_err(|e| FileError::from_read(e, path))?;
    for name in children {
        let child = path.join(name);
        let metadata = fs
            .stat(&child)
            .map_err(|e| FileError::from_read(e, &child))?;
        if metadata.kind == NodeKind::Directory {
            remove_tree_unchecked(fs, &child)?;
        } else {
            fs.unlink(&child)
                .map_err(|e| FileError::from_write(e, &child))?;
        }
    }

    debug!("Removing directory {}", path.display());
    fs.rmdir(path).map_err(|e| FileError::from_write(e, path))
}

/// Rejects `dest` when it is `source`, lies inside it, or contains it.
pub(crate) fn ensure_disjoint(source: &Path, dest: &Path) -> Result<()> {
    if dest == source {
        return Err(FileError::InvalidArgument(format!(
            "source and destination are the same: {}",
            source.display()
        )));
    }
    if dest.starts_with(source) {
        return Err(FileError::InvalidArgument(format!(
            "cannot copy {} into itself",
            source.display()
        )));
    }
    if source.starts_with(dest) {
        return Err(FileError::InvalidArgument(format!(
            "{} contains {}",
            dest.display(),
            source.display()
        )));
    }
    Ok(())
}

/// mkdir -p; every directory created gets `mode`.
pub(crate) fn create_dir_all(fs: &dyn FileSystem, path: &Path, mode: u32) -> Result<()> {
    let mut missing = Vec::new();
    for ancestor in path.ancestors() {
        match fs.stat(ancestor) {
            Ok(metadata) if metadata.kind == NodeKind::Directory => break,
            Ok(_) => {
                return Err(FileError::type_mismatch(ancestor, "not a directory"));
            }
            Err(e) if e.is_not_found() => missing.push(ancestor),
            Err(e) => return Err(FileError::from_read(e, ancestor)),
        }
    }

    for dir in missing.into_iter().rev() {
        fs.mkdir(dir, mode)
            .map_err(|e| FileError::from_write(e, dir))?;
        fs.chmod(dir, mode)
            .map_err(|e| FileError::from_write(e, dir))?;
    }
    Ok(())
}
