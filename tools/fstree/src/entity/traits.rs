use std::path::Path;

use chrono::{DateTime, Utc};

use super::Directory;
use crate::error::{FileError, Result};
use crate::filesystem::{FileSystem, NodeKind, NodeMetadata, SharedFileSystem};
use crate::tree::TreeObserver;

/// Identity and lifecycle shared by every entity.
pub trait FsNode {
    fn path(&self) -> &Path;

    fn fs(&self) -> &SharedFileSystem;

    fn is_deleted(&self) -> bool;

    fn ensure_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(FileError::deleted(self.path()));
        }
        Ok(())
    }

    /// Whether the node is still present on the filesystem. Always false
    /// once the entity has been deleted.
    fn exists(&self) -> bool {
        !self.is_deleted() && self.fs().exists(self.path()).unwrap_or(false)
    }

    fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Fresh `lstat` of the node.
    fn stat(&self) -> Result<NodeMetadata> {
        self.ensure_live()?;
        self.fs()
            .stat(self.path())
            .map_err(|e| FileError::from_read(e, self.path()))
    }

    /// Directory `levels` path segments above this node.
    fn get_directory(&self, levels: usize) -> Result<Directory> {
        if levels == 0 {
            return Err(FileError::InvalidArgument(
                "levels must be at least 1".to_string(),
            ));
        }
        self.ensure_live()?;

        let mut parent = self.path();
        for _ in 0..levels {
            parent = parent.parent().unwrap_or(parent);
        }
        Directory::open(self.fs().clone(), parent)
    }
}

pub trait HasPermissions: FsNode {
    /// Permission bits (`mode & 0o7777`).
    fn perms(&self) -> Result<u32> {
        Ok(self.stat()?.mode)
    }

    fn is_readable(&self) -> bool {
        !self.is_deleted() && self.fs().is_readable(self.path())
    }

    fn is_writable(&self) -> bool {
        !self.is_deleted() && self.fs().is_writable(self.path())
    }

    /// Re-stats the node and reports its current type.
    fn node_type(&self) -> Result<NodeKind> {
        Ok(self.stat()?.kind)
    }
}

pub trait HasTimestamps: FsNode {
    /// Modification time of the node.
    fn date_created(&self) -> Result<DateTime<Utc>> {
        Ok(DateTime::<Utc>::from(self.stat()?.modified))
    }

    fn date_accessed(&self) -> Result<DateTime<Utc>> {
        Ok(DateTime::<Utc>::from(self.stat()?.accessed))
    }
}

pub trait HasOwnership: FsNode {
    fn owner(&self) -> Result<u32> {
        Ok(self.stat()?.uid)
    }

    fn group(&self) -> Result<u32> {
        Ok(self.stat()?.gid)
    }

    /// Changes owner and/or group. `user` and `group` accept names or
    /// numeric ids; at least one must be given.
    fn chown(&mut self, user: Option<&str>, group: Option<&str>, recursive: bool) -> Result<()>;
}

/// Membership in the trees that materialized an entity.
pub trait ObservableMembership: FsNode {
    fn observers(&self) -> &[TreeObserver];

    fn observe(&mut self, observer: TreeObserver);

    /// Drops this entity from every live observing tree.
    fn notify_deleted(&self) {
        for observer in self.observers() {
            observer.notify_deleted(self.path());
        }
    }
}

pub(crate) fn resolve_ownership(
    fs: &dyn FileSystem,
    user: Option<&str>,
    group: Option<&str>,
) -> Result<(Option<u32>, Option<u32>)> {
    if user.is_none() && group.is_none() {
        return Err(FileError::InvalidArgument(
            "either user or group must be given".to_string(),
        ));
    }

    let uid = user
        .map(|name| lookup_id(name, "user", |n| fs.resolve_user(n)))
        .transpose()?;
    let gid = group
        .map(|name| lookup_id(name, "group", |n| fs.resolve_group(n)))
        .transpose()?;
    Ok((uid, gid))
}

fn lookup_id(
    name: &str,
    what: &str,
    resolve: impl Fn(&str) -> crate::filesystem::Result<u32>,
) -> Result<u32> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(id);
    }
    resolve(name).map_err(|e| FileError::InvalidArgument(format!("unknown {what} \"{name}\": {e}")))
}

pub(crate) fn chown_node(
    fs: &dyn FileSystem,
    path: &Path,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<()> {
    fs.chown(path, uid, gid)
        .map_err(|e| FileError::from_write(e, path))
}
