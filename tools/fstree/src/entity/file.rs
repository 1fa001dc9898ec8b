use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::traits::{chown_node, resolve_ownership};
use super::{
    ensure_disjoint, remove_node, FsNode, HasOwnership, HasPermissions, HasTimestamps, Link, Node,
    ObservableMembership,
};
use crate::error::{FileError, Result};
use crate::filesystem::{NodeKind, SharedFileSystem};
use crate::path_utils;
use crate::tree::TreeObserver;

/// A non-directory, non-link node: regular file, socket, fifo or device.
#[derive(Debug, Clone)]
pub struct File {
    pub(super) node: Node,
}

impl File {
    pub fn open(fs: SharedFileSystem, path: impl AsRef<Path>) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let metadata = fs
            .stat(&path)
            .map_err(|e| FileError::from_read(e, &path))?;

        match metadata.kind {
            NodeKind::Directory => Err(FileError::type_mismatch(&path, "is a directory, not a file")),
            NodeKind::Link => Err(FileError::type_mismatch(&path, "is a symbolic link, not a file")),
            _ => Ok(Self {
                node: Node::new(fs, path),
            }),
        }
    }

    /// Wraps a path already known to resolve to a file.
    pub(super) fn from_resolved(fs: SharedFileSystem, path: PathBuf) -> Self {
        Self {
            node: Node::new(fs, path),
        }
    }

    /// Writes `contents` to a new file and applies `perms`.
    pub fn create(
        fs: SharedFileSystem,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
        perms: u32,
        overwrite: bool,
    ) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let exists = fs
            .exists(&path)
            .map_err(|e| FileError::from_read(e, &path))?;

        if exists && !overwrite {
            return Err(FileError::exists(&path, "file already exists"));
        }

        fs.write_file(&path, contents.as_ref(), false)
            .map_err(|e| FileError::from_write(e, &path))?;
        fs.chmod(&path, perms)
            .map_err(|e| FileError::from_write(e, &path))?;

        Self::open(fs, path)
    }

    pub fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        info!("Deleting file {}", self.path().display());

        self.fs()
            .unlink(self.path())
            .map_err(|e| FileError::from_write(e, self.path()))?;
        self.node.finish_delete();
        Ok(())
    }

    /// Copies to `dest`. When `dest` is a directory the copy keeps this
    /// file's name inside it.
    pub fn copy(&self, dest: impl AsRef<Path>, overwrite: bool) -> Result<File> {
        self.ensure_live()?;
        let mut dest = path_utils::normalize(dest.as_ref())?;
        let fs = self.fs();

        if matches!(fs.metadata(&dest), Ok(metadata) if metadata.kind == NodeKind::Directory) {
            dest = dest.join(self.name());
        }
        ensure_disjoint(self.path(), &dest)?;

        if !self.is_readable() {
            return Err(FileError::read(self.path(), "source file is not readable"));
        }

        let exists = fs
            .exists(&dest)
            .map_err(|e| FileError::from_read(e, &dest))?;
        if exists && !overwrite {
            return Err(FileError::exists(&dest, "destination already exists"));
        }

        fs.copy_file(self.path(), &dest)
            .map_err(|e| FileError::from_write(e, &dest))?;
        File::open(fs.clone(), dest)
    }

    /// Copy followed by removal of the source. If the source cannot be
    /// removed the copy is deleted again and a write error is returned.
    pub fn move_to(&mut self, dest: impl AsRef<Path>, overwrite: bool) -> Result<File> {
        let copy = self.copy(dest, overwrite)?;

        if let Err(err) = self.delete() {
            warn!(
                "Could not remove {} after copying it, rolling back {}",
                self.path().display(),
                copy.path().display()
            );
            if let Err(rollback) = remove_node(self.fs().as_ref(), copy.path()) {
                warn!("Rollback of {} failed: {}", copy.path().display(), rollback);
            }
            return Err(FileError::write(
                self.path(),
                format!("could not remove source after copy: {err}"),
            ));
        }

        Ok(copy)
    }

    /// Links are never chmod'ed, files are.
    pub fn chmod(&self, mode: u32) -> Result<()> {
        self.ensure_live()?;
        self.fs()
            .chmod(self.path(), mode)
            .map_err(|e| FileError::from_write(e, self.path()))
    }

    pub fn link(&self, dest: impl AsRef<Path>, force: bool) -> Result<Link> {
        self.ensure_live()?;
        Link::create(self.fs().clone(), self.path(), dest, force)
    }

    /// Replaces the file contents.
    pub fn put(&self, contents: impl AsRef<[u8]>) -> Result<()> {
        self.write(contents.as_ref(), false)
    }

    pub fn append(&self, contents: impl AsRef<[u8]>) -> Result<()> {
        self.write(contents.as_ref(), true)
    }

    fn write(&self, contents: &[u8], append: bool) -> Result<()> {
        self.ensure_live()?;
        if !self.is_writable() {
            return Err(FileError::write(self.path(), "file is not writable"));
        }
        self.fs()
            .write_file(self.path(), contents, append)
            .map_err(|e| FileError::from_write(e, self.path()))
    }

    fn ensure_readable(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.is_readable() {
            return Err(FileError::read(self.path(), "file is not readable"));
        }
        Ok(())
    }

    pub fn contents(&self) -> Result<Vec<u8>> {
        self.ensure_readable()?;
        self.fs()
            .read_file(self.path())
            .map_err(|e| FileError::from_read(e, self.path()))
    }

    pub fn read_to_string(&self) -> Result<String> {
        String::from_utf8(self.contents()?)
            .map_err(|e| FileError::read(self.path(), format!("invalid UTF-8: {e}")))
    }

    /// Every line, without line terminators.
    pub fn lines(&self) -> Result<Vec<String>> {
        self.iterate_lines()?.collect()
    }

    pub fn lines_as_string(&self, separator: &str) -> Result<String> {
        Ok(self.lines()?.join(separator))
    }

    /// Single-pass iterator over an open handle on the file.
    pub fn iterate_lines(&self) -> Result<LineIter> {
        self.ensure_readable()?;
        let reader = self
            .fs()
            .open(self.path())
            .map_err(|e| FileError::from_read(e, self.path()))?;
        Ok(LineIter {
            path: self.path().to_path_buf(),
            reader,
            done: false,
        })
    }

    /// Extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        self.path()
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl FsNode for File {
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

impl HasPermissions for File {}

impl HasTimestamps for File {}

impl HasOwnership for File {
    fn chown(&mut self, user: Option<&str>, group: Option<&str>, _recursive: bool) -> Result<()> {
        self.ensure_live()?;
        let (uid, gid) = resolve_ownership(self.fs().as_ref(), user, group)?;
        chown_node(self.fs().as_ref(), self.path(), uid, gid)
    }
}

impl ObservableMembership for File {
    fn observers(&self) -> &[TreeObserver] {
        &self.node.observers
    }

    fn observe(&mut self, observer: TreeObserver) {
        self.node.observe(observer);
    }
}

/// Lines read lazily from an open file.
pub struct LineIter {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    done: bool,
}

impl Iterator for LineIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(Ok(line))
            }
            Err(e) => {
                self.done = true;
                Some(Err(FileError::read(&self.path, e.to_string())))
            }
        }
    }
}
