use std::path::{Path, PathBuf};

use log::{info, warn};

use super::traits::{chown_node, resolve_ownership};
use super::{
    remove_node, Directory, File, FsNode, HasOwnership, HasPermissions, HasTimestamps, Node,
    ObservableMembership,
};
use crate::error::{FileError, Result};
use crate::filesystem::{NodeKind, SharedFileSystem};
use crate::path_utils;
use crate::tree::TreeObserver;

/// What a link resolves to, computed once when the link is opened.
#[derive(Debug, Clone)]
pub enum LinkTarget {
    File(File),
    Directory(Directory),
}

impl LinkTarget {
    pub fn path(&self) -> &Path {
        match self {
            LinkTarget::File(file) => file.path(),
            LinkTarget::Directory(dir) => dir.path(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, LinkTarget::Directory(_))
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub(super) node: Node,
    target: Box<LinkTarget>,
}

impl Link {
    /// Wraps an existing symlink. Dangling links are rejected with an
    /// existence error.
    pub fn open(fs: SharedFileSystem, path: impl AsRef<Path>) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let metadata = fs
            .stat(&path)
            .map_err(|e| FileError::from_read(e, &path))?;
        if metadata.kind != NodeKind::Link {
            return Err(FileError::type_mismatch(
                &path,
                format!("is a {}, not a symbolic link", metadata.kind),
            ));
        }

        let raw = fs
            .read_link(&path)
            .map_err(|e| FileError::from_read(e, &path))?;
        let resolved = match path.parent() {
            Some(parent) if raw.is_relative() => path_utils::normalize(&parent.join(&raw))?,
            _ => path_utils::normalize(&raw)?,
        };

        let target_metadata = fs.metadata(&path).map_err(|e| {
            if e.is_not_found() {
                FileError::exists(&path, format!("link target {} does not exist", raw.display()))
            } else {
                FileError::from_read(e, &path)
            }
        })?;

        let target = if target_metadata.kind == NodeKind::Directory {
            LinkTarget::Directory(Directory::from_resolved(fs.clone(), resolved))
        } else {
            LinkTarget::File(File::from_resolved(fs.clone(), resolved))
        };

        Ok(Self {
            node: Node::new(fs, path),
            target: Box::new(target),
        })
    }

    /// Creates a symlink at `dest` pointing to `source`. An existing node at
    /// `dest` is only replaced with `force`; directories are removed
    /// recursively.
    pub fn create(
        fs: SharedFileSystem,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        force: bool,
    ) -> Result<Self> {
        let dest = path_utils::normalize(dest.as_ref())?;
        let source = source.as_ref();
        let resolved = match dest.parent() {
            Some(parent) if source.is_relative() => {
                path_utils::normalize_lossy(&parent.join(source))
            }
            _ => path_utils::normalize_lossy(source),
        };
        if resolved.starts_with(&dest) {
            return Err(FileError::InvalidArgument(format!(
                "link {} would point at itself or inside itself",
                dest.display()
            )));
        }

        let exists = fs
            .exists(&dest)
            .map_err(|e| FileError::from_read(e, &dest))?;

        if exists {
            if !force {
                return Err(FileError::exists(&dest, "link destination already exists"));
            }
            remove_node(fs.as_ref(), &dest)?;
        }

        fs.symlink(source, &dest)
            .map_err(|e| FileError::from_write(e, &dest))?;
        Self::open(fs, dest)
    }

    pub fn target(&self) -> &LinkTarget {
        &self.target
    }

    /// The link's stored target, as written.
    pub fn raw_target(&self) -> Result<PathBuf> {
        self.ensure_live()?;
        self.fs()
            .read_link(self.path())
            .map_err(|e| FileError::from_read(e, self.path()))
    }

    /// Removes the link node only; the target is untouched.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        info!("Deleting link {}", self.path().display());

        self.fs()
            .unlink(self.path())
            .map_err(|e| FileError::from_write(e, self.path()))?;
        self.node.finish_delete();
        Ok(())
    }

    /// Creates a new link at `dest` pointing at the same target.
    pub fn copy(&self, dest: impl AsRef<Path>, overwrite: bool) -> Result<Link> {
        self.ensure_live()?;
        let dest = path_utils::normalize(dest.as_ref())?;
        if self.path().starts_with(&dest) {
            return Err(FileError::InvalidArgument(format!(
                "{} would replace the link {}",
                dest.display(),
                self.path().display()
            )));
        }
        Link::create(self.fs().clone(), self.target.path(), dest, overwrite)
    }

    pub fn move_to(&mut self, dest: impl AsRef<Path>, overwrite: bool) -> Result<Link> {
        let copy = self.copy(dest, overwrite)?;

        if let Err(err) = self.delete() {
            warn!(
                "Could not remove link {}, rolling back {}",
                self.path().display(),
                copy.path().display()
            );
            if let Err(rollback) = remove_node(self.fs().as_ref(), copy.path()) {
                warn!("Rollback of {} failed: {}", copy.path().display(), rollback);
            }
            return Err(FileError::write(
                self.path(),
                format!("could not remove source link after copy: {err}"),
            ));
        }

        Ok(copy)
    }

    /// Symlink permissions carry no meaning, so this does nothing.
    pub fn chmod(&self, _mode: u32) -> Result<()> {
        self.ensure_live()
    }

    pub fn link(&self, dest: impl AsRef<Path>, force: bool) -> Result<Link> {
        self.ensure_live()?;
        Link::create(self.fs().clone(), self.path(), dest, force)
    }
}

impl FsNode for Link {
    fn path(&self) -> &Path {
        &self.node.path
    }

    fn fs(&self) -> &SharedFileSystem {
        &self.node.fs
    }

    fn is_deleted(&self) -> bool {
        self.node.deleted
    }
}

impl HasPermissions for Link {}

impl HasTimestamps for Link {}

impl HasOwnership for Link {
    /// Changes ownership of the link node itself.
    fn chown(&mut self, user: Option<&str>, group: Option<&str>, _recursive: bool) -> Result<()> {
        self.ensure_live()?;
        let (uid, gid) = resolve_ownership(self.fs().as_ref(), user, group)?;
        chown_node(self.fs().as_ref(), self.path(), uid, gid)
    }
}

impl ObservableMembership for Link {
    fn observers(&self) -> &[TreeObserver] {
        &self.node.observers
    }

    fn observe(&mut self, observer: TreeObserver) {
        self.node.observe(observer);
    }
}
