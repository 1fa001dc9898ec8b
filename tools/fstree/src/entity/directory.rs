use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::traits::{chown_node, resolve_ownership};
use super::{
    create_dir_all, ensure_disjoint, remove_node, remove_tree, CopyFailure, CopyReport, Entity,
    File, FsNode, HasOwnership, HasPermissions, HasTimestamps, Link, Node, ObservableMembership,
};
use crate::collection::DirectoryCollection;
use crate::error::{FileError, Result};
use crate::filesystem::{FileSystem, NodeKind, SharedFileSystem};
use crate::path_utils;
use crate::tree::{FileTree, TreeObserver};

#[derive(Debug, Clone)]
pub struct Directory {
    pub(super) node: Node,
}

impl Directory {
    pub fn open(fs: SharedFileSystem, path: impl AsRef<Path>) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let metadata = fs
            .stat(&path)
            .map_err(|e| FileError::from_read(e, &path))?;

        if metadata.kind != NodeKind::Directory {
            return Err(FileError::type_mismatch(
                &path,
                format!("is a {}, not a directory", metadata.kind),
            ));
        }
        Ok(Self {
            node: Node::new(fs, path),
        })
    }

    pub(super) fn from_resolved(fs: SharedFileSystem, path: PathBuf) -> Self {
        Self {
            node: Node::new(fs, path),
        }
    }

    /// Creates the directory and any missing ancestors with `perms`. With
    /// `overwrite`, whatever already sits at `path` is removed first.
    pub fn create(
        fs: SharedFileSystem,
        path: impl AsRef<Path>,
        perms: u32,
        overwrite: bool,
    ) -> Result<Self> {
        let path = path_utils::normalize(path.as_ref())?;
        let exists = fs
            .exists(&path)
            .map_err(|e| FileError::from_read(e, &path))?;

        if exists {
            if !overwrite {
                return Err(FileError::exists(&path, "directory already exists"));
            }
            remove_node(fs.as_ref(), &path)?;
        }

        create_dir_all(fs.as_ref(), &path, perms)?;
        Self::open(fs, path)
    }

    /// Materializes the immediate children and binds this directory to the
    /// returned tree, so deleting the directory empties it.
    pub fn get_tree(&mut self) -> Result<FileTree> {
        self.ensure_live()?;
        let tree = FileTree::open(self.clone())?;
        self.node.observe(tree.observer());
        Ok(tree)
    }

    pub fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        info!("Deleting directory {}", self.path().display());

        remove_tree(self.fs().as_ref(), self.path())?;
        self.node.finish_delete();
        Ok(())
    }

    /// Recursive copy preserving permissions. Children that fail to copy are
    /// reported, not fatal.
    pub fn copy(&self, dest: impl AsRef<Path>, overwrite: bool) -> Result<CopyReport> {
        self.ensure_live()?;
        let dest = path_utils::normalize(dest.as_ref())?;
        let fs = self.fs().as_ref();

        ensure_disjoint(self.path(), &dest)?;

        let mode = self.perms()?;
        if !self.is_readable() {
            return Err(FileError::read(self.path(), "source directory is not readable"));
        }

        let exists = fs
            .exists(&dest)
            .map_err(|e| FileError::from_read(e, &dest))?;
        if exists {
            if !overwrite {
                return Err(FileError::exists(&dest, "destination already exists"));
            }
            remove_node(fs, &dest)?;
        }

        create_dir_all(fs, &dest, mode | 0o700)?;

        let mut copied = vec![dest.clone()];
        let mut failed = Vec::new();
        copy_children(fs, self.path(), &dest, &mut copied, &mut failed);

        fs.chmod(&dest, mode)
            .map_err(|e| FileError::from_write(e, &dest))?;

        for failure in &failed {
            warn!(
                "Could not copy {} to {}: {}",
                failure.source.display(),
                failure.destination.display(),
                failure.error
            );
        }

        Ok(CopyReport {
            destination: Entity::Directory(Directory::open(self.fs().clone(), &dest)?),
            copied,
            failed,
        })
    }

    /// Copy then delete. Any failure after the copy removes the copy again;
    /// the source stays live.
    pub fn move_to(&mut self, dest: impl AsRef<Path>, overwrite: bool) -> Result<Directory> {
        let report = self.copy(dest, overwrite)?;
        let dest = report.destination.path().to_path_buf();

        if !report.is_complete() {
            self.rollback(&dest);
            return Err(FileError::write(
                self.path(),
                format!("{} entries could not be copied", report.failed.len()),
            ));
        }

        if let Err(err) = self.delete() {
            warn!("Could not remove {} after copying it", self.path().display());
            self.rollback(&dest);
            return Err(FileError::write(
                self.path(),
                format!("could not remove source directory: {err}"),
            ));
        }

        Directory::open(self.fs().clone(), dest)
    }

    fn rollback(&self, dest: &Path) {
        info!("Rolling back copy at {}", dest.display());
        if let Err(err) = remove_node(self.fs().as_ref(), dest) {
            warn!("Rollback of {} failed: {}", dest.display(), err);
        }
    }

    /// With `recursive`, every descendant except links gets `mode` too.
    pub fn chmod(&self, mode: u32, recursive: bool) -> Result<()> {
        self.ensure_live()?;
        self.fs()
            .chmod(self.path(), mode)
            .map_err(|e| FileError::from_write(e, self.path()))?;

        if !recursive {
            return Ok(());
        }

        info!("Recursively changing mode of {} to {:o}", self.path().display(), mode);
        for entity in FileTree::open(self.clone())?.entities() {
            match entity {
                Entity::Link(_) => continue,
                Entity::Directory(dir) => dir.chmod(mode, true)?,
                Entity::File(file) => file.chmod(mode)?,
            }
        }
        Ok(())
    }

    pub fn link(&self, dest: impl AsRef<Path>, force: bool) -> Result<Link> {
        self.ensure_live()?;
        Link::create(self.fs().clone(), self.path(), dest, force)
    }

    /// Creates a directory at `relative` below this one.
    pub fn mkdir(&self, relative: impl AsRef<Path>, perms: u32, overwrite: bool) -> Result<Directory> {
        self.ensure_live()?;
        if !self.is_writable() {
            return Err(FileError::write(self.path(), "directory is not writable"));
        }

        let path = path_utils::join(self.path(), [relative.as_ref()])?;
        if self.path().starts_with(&path) {
            return Err(FileError::InvalidArgument(format!(
                "{} is not below {}",
                path.display(),
                self.path().display()
            )));
        }
        Directory::create(self.fs().clone(), path, perms, overwrite)
    }

    pub fn mmkdir<I, S>(&self, names: I, perms: u32, overwrite: bool) -> Result<DirectoryCollection>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut created = DirectoryCollection::new(self.fs().clone());
        for name in names {
            created.append(self.mkdir(name, perms, overwrite)?)?;
        }
        Ok(created)
    }

    /// Creates a file directly inside this directory. Only the last
    /// component of `name` is used.
    pub fn mkfile(
        &self,
        name: &str,
        contents: impl AsRef<[u8]>,
        perms: u32,
        overwrite: bool,
    ) -> Result<File> {
        self.ensure_live()?;
        let base = Path::new(name.trim())
            .file_name()
            .ok_or_else(|| FileError::InvalidArgument("file name can not be empty".to_string()))?;

        File::create(
            self.fs().clone(),
            self.path().join(base),
            contents,
            perms,
            overwrite,
        )
    }

    /// Absolute path built from this directory and `pieces`.
    pub fn mkpath<I, S>(&self, pieces: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        path_utils::join(self.path(), pieces)
    }
}

fn copy_children(
    fs: &dyn FileSystem,
    source: &Path,
    dest: &Path,
    copied: &mut Vec<PathBuf>,
    failed: &mut Vec<CopyFailure>,
) {
    let children = match fs.list_children(source) {
        Ok(children) => children,
        Err(e) => {
            failed.push(CopyFailure {
                source: source.to_path_buf(),
                destination: dest.to_path_buf(),
                error: FileError::from_read(e, source),
            });
            return;
        }
    };

    for name in children {
        let from = source.join(&name);
        let to = dest.join(&name);
        debug!("Copying {} to {}", from.display(), to.display());

        match copy_child(fs, &from, &to, copied, failed) {
            Ok(()) => copied.push(to),
            Err(error) => failed.push(CopyFailure {
                source: from,
                destination: to,
                error,
            }),
        }
    }
}

fn copy_child(
    fs: &dyn FileSystem,
    from: &Path,
    to: &Path,
    copied: &mut Vec<PathBuf>,
    failed: &mut Vec<CopyFailure>,
) -> Result<()> {
    let metadata = fs
        .stat(from)
        .map_err(|e| FileError::from_read(e, from))?;

    match metadata.kind {
        NodeKind::Directory => {
            fs.mkdir(to, metadata.mode | 0o700)
                .map_err(|e| FileError::from_write(e, to))?;
            copy_children(fs, from, to, copied, failed);
            fs.chmod(to, metadata.mode)
                .map_err(|e| FileError::from_write(e, to))
        }
        NodeKind::Link => {
            let target = fs
                .read_link(from)
                .map_err(|e| FileError::from_read(e, from))?;
            fs.symlink(&target, to)
                .map_err(|e| FileError::from_write(e, to))
        }
        _ => {
            if !fs.is_readable(from) {
                return Err(FileError::read(from, "source file is not readable"));
            }
            fs.copy_file(from, to)
                .map_err(|e| FileError::from_write(e, to))
        }
    }
}

impl FsNode for Directory {
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

impl HasPermissions for Directory {}

impl HasTimestamps for Directory {}

impl HasOwnership for Directory {
    fn chown(&mut self, user: Option<&str>, group: Option<&str>, recursive: bool) -> Result<()> {
        self.ensure_live()?;
        let fs = self.fs().as_ref();
        let (uid, gid) = resolve_ownership(fs, user, group)?;
        chown_node(fs, self.path(), uid, gid)?;

        if !recursive {
            return Ok(());
        }

        info!("Recursively changing ownership of {}", self.path().display());
        for entity in FileTree::open(self.clone())?.entities() {
            match entity {
                Entity::Link(_) => continue,
                mut other => other.chown(user, group, true)?,
            }
        }
        Ok(())
    }
}

impl ObservableMembership for Directory {
    fn observers(&self) -> &[TreeObserver] {
        &self.node.observers
    }

    fn observe(&mut self, observer: TreeObserver) {
        self.node.observe(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFileSystem;
    use std::sync::Arc;

    fn setup() -> (MockFileSystem, SharedFileSystem) {
        let mock = MockFileSystem::new();
        let fs: SharedFileSystem = Arc::new(mock.clone());
        (mock, fs)
    }

    #[test]
    fn test_create_applies_permissions_and_refuses_existing() {
        let (mock, fs) = setup();

        let dir = Directory::create(fs.clone(), "/srv/app", 0o750, false).unwrap();
        assert_eq!(dir.perms().unwrap(), 0o750);

        mock.add_file("/srv/app/keep.txt", "");
        assert!(Directory::create(fs.clone(), "/srv/app", 0o750, false)
            .unwrap_err()
            .is_exists());

        Directory::create(fs, "/srv/app", 0o755, true).unwrap();
        assert!(!mock.contains(Path::new("/srv/app/keep.txt")));
    }

    #[test]
    fn test_delete_keeps_link_targets() {
        let (mock, fs) = setup();
        mock.add_file("/outside/target.txt", "keep me");
        mock.add_file("/work/a.txt", "a");
        mock.add_link("/work/alias", "/outside/target.txt");

        let mut dir = Directory::open(fs, "/work").unwrap();
        dir.delete().unwrap();

        assert!(dir.is_deleted());
        assert!(!mock.contains(Path::new("/work")));
        assert!(!mock.contains(Path::new("/work/alias")));
        assert_eq!(
            mock.get_file_content(Path::new("/outside/target.txt")).unwrap(),
            b"keep me"
        );
    }

    #[test]
    fn test_delete_fails_on_unwritable_descendant() {
        let (mock, fs) = setup();
        mock.add_file("/work/nested/a.txt", "a");
        mock.deny_writes("/work/nested");

        let mut dir = Directory::open(fs, "/work").unwrap();
        let err = dir.delete().unwrap_err();

        assert!(err.is_write());
        assert!(!dir.is_deleted());
        assert!(mock.contains(Path::new("/work/nested/a.txt")));
    }

    #[test]
    fn test_copy_recreates_tree_and_links() {
        let (mock, fs) = setup();
        mock.add_file("/src/a.txt", "a");
        mock.add_file("/src/sub/b.txt", "b");
        mock.add_link("/src/alias", "a.txt");
        mock.set_mode(Path::new("/src/sub"), 0o700);

        let dir = Directory::open(fs, "/src").unwrap();
        let report = dir.copy("/dst", false).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.destination.path(), Path::new("/dst"));
        assert_eq!(mock.get_file_content(Path::new("/dst/sub/b.txt")).unwrap(), b"b");
        assert_eq!(mock.read_link(Path::new("/dst/alias")).unwrap(), PathBuf::from("a.txt"));
        assert_eq!(mock.stat(Path::new("/dst/sub")).unwrap().mode, 0o700);

        assert!(dir.copy("/dst", false).unwrap_err().is_exists());
    }

    #[test]
    fn test_copy_continues_past_failing_children() {
        let (mock, fs) = setup();
        mock.add_file("/src/a.txt", "a");
        mock.add_file("/src/b.txt", "b");
        mock.set_mode(Path::new("/src/a.txt"), 0o000);

        let dir = Directory::open(fs, "/src").unwrap();
        let report = dir.copy("/dst", false).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source, PathBuf::from("/src/a.txt"));
        assert!(mock.contains(Path::new("/dst/b.txt")));
    }

    #[test]
    fn test_copy_into_own_subtree_is_rejected() {
        let (mock, fs) = setup();
        mock.add_directory("/src");

        let dir = Directory::open(fs, "/src").unwrap();
        assert!(matches!(
            dir.copy("/src/inner", false),
            Err(FileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_recursive_chmod_skips_links() {
        let (mock, fs) = setup();
        mock.add_file("/tree/a.txt", "");
        mock.add_file("/tree/sub/b.txt", "");
        mock.add_file("/elsewhere.txt", "");
        mock.add_link("/tree/alias", "/elsewhere.txt");

        let dir = Directory::open(fs, "/tree").unwrap();
        dir.chmod(0o700, true).unwrap();

        for path in ["/tree", "/tree/a.txt", "/tree/sub", "/tree/sub/b.txt"] {
            assert_eq!(mock.stat(Path::new(path)).unwrap().mode, 0o700, "{path}");
        }
        assert_eq!(mock.stat(Path::new("/elsewhere.txt")).unwrap().mode, 0o644);
    }

    #[test]
    fn test_mkfile_uses_basename_only() {
        let (mock, fs) = setup();
        mock.add_directory("/home");
        let dir = Directory::open(fs, "/home").unwrap();

        let file = dir.mkfile("../../etc/passwd", "x", 0o600, false).unwrap();
        assert_eq!(file.path(), Path::new("/home/passwd"));
        assert!(matches!(
            dir.mkfile("  ", "x", 0o600, false),
            Err(FileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mmkdir_returns_directory_collection() {
        let (mock, fs) = setup();
        mock.add_directory("/base");
        let dir = Directory::open(fs, "/base").unwrap();

        let created = dir.mmkdir(["one", "two/three"], 0o755, false).unwrap();
        assert_eq!(created.len(), 2);
        assert!(mock.contains(Path::new("/base/two/three")));
        assert_eq!(
            dir.mkpath(["a", "b.txt"]).unwrap(),
            PathBuf::from("/base/a/b.txt")
        );
    }

    #[test]
    fn test_recursive_chown() {
        let (mock, fs) = setup();
        mock.add_file("/owned/sub/file", "");
        mock.add_group("staff", 50);

        let mut dir = Directory::open(fs, "/owned").unwrap();
        dir.chown(None, Some("staff"), true).unwrap();

        for path in ["/owned", "/owned/sub", "/owned/sub/file"] {
            assert_eq!(mock.stat(Path::new(path)).unwrap().gid, 50);
        }
    }
}
