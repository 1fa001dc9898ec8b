//! One directory level materialized as an ordered `path -> entity` map.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::debug;

use crate::collection::{DirectoryCollection, FileCollection, Key, LinkCollection, TypedCollection};
use crate::entity::{
    Directory, Entity, EntityKind, FsNode, HasPermissions, HasTimestamps, ObservableMembership,
};
use crate::error::{FileError, Result};
use crate::filesystem::{NodeKind, SharedFileSystem};
use crate::validator::{ChainMode, EntityKindValidator, NodeTypeValidator, Validator, ValidatorChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

struct TreeState {
    root: PathBuf,
    entries: TypedCollection<Entity>,
}

fn lock(state: &Mutex<TreeState>) -> MutexGuard<'_, TreeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Weak handle from an entity back to a tree it belongs to. It never keeps
/// the tree alive.
#[derive(Clone)]
pub struct TreeObserver(Weak<Mutex<TreeState>>);

impl fmt::Debug for TreeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TreeObserver")
            .field(&self.is_alive())
            .finish()
    }
}

impl TreeObserver {
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub(crate) fn same_tree(&self, other: &TreeObserver) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }

    /// Drops `path` from the tree, or empties the tree when `path` is its
    /// root.
    pub(crate) fn notify_deleted(&self, path: &Path) {
        if let Some(state) = self.0.upgrade() {
            let mut state = lock(&state);
            remove_path(&mut state, path);
        }
    }
}

fn remove_path(state: &mut TreeState, path: &Path) -> usize {
    if path == state.root {
        let count = state.entries.len();
        state.entries.clear();
        return count;
    }
    usize::from(state.entries.remove_by_key(&Key::Path(path.to_path_buf())).is_some())
}

fn tree_chain() -> ValidatorChain<Entity> {
    let kinds: Vec<Arc<dyn Validator<Entity>>> = vec![
        Arc::new(EntityKindValidator(EntityKind::File)),
        Arc::new(EntityKindValidator(EntityKind::Directory)),
        Arc::new(EntityKindValidator(EntityKind::Link)),
    ];
    let mut chain = ValidatorChain::from_validators(ChainMode::Any, kinds);
    chain.lock();
    chain
}

/// Immediate children of a root directory, keyed by their own path.
///
/// Nested directories appear as [`Entity::Directory`] members; their
/// contents are only read when asked for (see [`FileTree::traverse`]).
pub struct FileTree {
    root: Directory,
    state: Arc<Mutex<TreeState>>,
}

impl fmt::Debug for FileTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTree")
            .field("root", &self.root.path())
            .field("entries", &self.paths())
            .finish()
    }
}

impl FileTree {
    /// Tree over `root` with no members.
    pub fn empty(root: Directory) -> Self {
        let state = TreeState {
            root: root.path().to_path_buf(),
            entries: TypedCollection::new(tree_chain()),
        };
        Self {
            root,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Enumerates the immediate children of `root`. Every member observes
    /// the new tree; `root` itself is not bound (see
    /// [`Directory::get_tree`]).
    pub fn open(root: Directory) -> Result<Self> {
        root.ensure_live()?;
        if !root.is_readable() {
            return Err(FileError::read(root.path(), "directory is not readable"));
        }

        let tree = Self::empty(root);
        tree.load()?;
        Ok(tree)
    }

    fn state(&self) -> MutexGuard<'_, TreeState> {
        lock(&self.state)
    }

    fn load(&self) -> Result<()> {
        let entities = self.enumerate()?;
        self.state().entries.replace_all(entities)
    }

    fn enumerate(&self) -> Result<Vec<(Key, Entity)>> {
        let root = self.root.path();
        let names = self
            .root
            .fs()
            .list_children(root)
            .map_err(|e| FileError::from_read(e, root))?;
        debug!("Materializing {} entries under {}", names.len(), root.display());

        let observer = self.observer();
        names
            .into_iter()
            .map(|name| {
                let mut entity = Entity::open(self.root.fs().clone(), root.join(name))?;
                entity.observe(observer.clone());
                Ok((Key::Path(entity.path().to_path_buf()), entity))
            })
            .collect()
    }

    /// Builds a tree over the same root holding `entities`, in order.
    fn derive(&self, entities: Vec<Entity>) -> Result<FileTree> {
        let tree = FileTree::empty(self.root.clone());
        let keyed = entities
            .into_iter()
            .map(|entity| (Key::Path(entity.path().to_path_buf()), entity))
            .collect();
        tree.state().entries.replace_all(keyed)?;
        Ok(tree)
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn fs(&self) -> &SharedFileSystem {
        self.root.fs()
    }

    /// Weak handle entities use to report their deletion to this tree.
    pub fn observer(&self) -> TreeObserver {
        TreeObserver(Arc::downgrade(&self.state))
    }

    /// Inserts `entity` under its own path; any previous entry for that
    /// path is replaced.
    pub fn append(&mut self, entity: impl Into<Entity>) -> Result<()> {
        let entity = entity.into();
        let key = Key::Path(entity.path().to_path_buf());
        self.state().entries.append_with_key(entity, key)
    }

    /// Same as [`FileTree::append`]: the supplied key is ignored and the
    /// entity's own path is used instead.
    pub fn append_with_key(&mut self, entity: impl Into<Entity>, key: impl Into<Key>) -> Result<()> {
        let entity = entity.into();
        let key = key.into();
        if key != Key::Path(entity.path().to_path_buf()) {
            debug!("Ignoring key {} for {}", key, entity.path().display());
        }
        self.append(entity)
    }

    /// Removes one entity. Removing the root empties the whole tree.
    /// Returns the number of dropped entries.
    pub fn remove(&mut self, entity: &impl FsNode) -> usize {
        self.remove_by_key(entity.path())
    }

    pub fn remove_by_key(&mut self, path: impl AsRef<Path>) -> usize {
        remove_path(&mut self.state(), path.as_ref())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Entity> {
        self.state()
            .entries
            .get(&Key::Path(path.as_ref().to_path_buf()))
            .cloned()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// Member whose name or full path equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.state()
            .entries
            .values()
            .find(|entity| entity.name() == name || entity.path() == Path::new(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.state()
            .entries
            .keys()
            .filter_map(|key| match key {
                Key::Path(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Snapshot of the current members, in order.
    pub fn entities(&self) -> Vec<Entity> {
        self.state().entries.values().cloned().collect()
    }

    /// Depth-first walk yielding files and links. Directories are replaced
    /// by their own contents, read from the filesystem as the walk reaches
    /// them; links are yielded, never followed.
    pub fn traverse(&self) -> Traverse {
        Traverse {
            stack: vec![self.entities().into_iter()],
        }
    }

    fn filter(&self, keep: impl FnMut(&Entity) -> bool) -> FileTree {
        // Snapshot first; the predicate may hit the filesystem.
        let snapshot = self.state().entries.clone();
        let state = TreeState {
            root: self.root.path().to_path_buf(),
            entries: snapshot.filter(keep),
        };
        FileTree {
            root: self.root.clone(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn filter_by_file_type(&self, kind: NodeKind, negated: bool) -> FileTree {
        self.filter_by_file_types(&[kind], negated)
    }

    pub fn filter_by_file_types(&self, kinds: &[NodeKind], negated: bool) -> FileTree {
        let validator = NodeTypeValidator(kinds.to_vec());
        self.filter(|entity| validator.test(entity) != negated)
    }

    /// Readability is checked live, at filter time.
    pub fn filter_readable(&self, negated: bool) -> FileTree {
        self.filter(|entity| entity.is_readable() != negated)
    }

    pub fn filter_writable(&self, negated: bool) -> FileTree {
        self.filter(|entity| entity.is_writable() != negated)
    }

    pub fn filter_read_write(&self, negated: bool) -> FileTree {
        self.filter(|entity| (entity.is_readable() && entity.is_writable()) != negated)
    }

    /// Exact match of permission bits against `perms`.
    pub fn filter_by_permissions(&self, perms: &[u32], negated: bool) -> FileTree {
        self.filter(|entity| {
            let matches = entity
                .perms()
                .map(|mode| perms.contains(&(mode & 0o7777)))
                .unwrap_or(false);
            matches != negated
        })
    }

    pub fn filter_files(&self) -> Result<FileCollection> {
        let files = self.filter_by_file_type(NodeKind::Regular, false);
        FileCollection::from_iterable(self.fs().clone(), files.entities())
    }

    pub fn filter_directories(&self) -> Result<DirectoryCollection> {
        let dirs = self.filter_by_file_type(NodeKind::Directory, false);
        DirectoryCollection::from_iterable(self.fs().clone(), dirs.entities())
    }

    pub fn filter_links(&self) -> Result<LinkCollection> {
        let links = self.filter_by_file_type(NodeKind::Link, false);
        LinkCollection::from_iterable(self.fs().clone(), links.entities())
    }

    /// New tree ordered by modification time (whole seconds). Ties keep
    /// their current relative order.
    pub fn sort_by_date_created(&self, order: SortOrder) -> Result<FileTree> {
        self.sort_by_timestamp(order, |entity| Ok(entity.date_created()?.timestamp()))
    }

    pub fn sort_by_date_accessed(&self, order: SortOrder) -> Result<FileTree> {
        self.sort_by_timestamp(order, |entity| Ok(entity.date_accessed()?.timestamp()))
    }

    fn sort_by_timestamp(
        &self,
        order: SortOrder,
        timestamp: impl Fn(&Entity) -> Result<i64>,
    ) -> Result<FileTree> {
        let mut keyed = self
            .entities()
            .into_iter()
            .map(|entity| Ok((timestamp(&entity)?, entity)))
            .collect::<Result<Vec<_>>>()?;

        match order {
            SortOrder::Ascending => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::Descending => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
        }
        self.derive(keyed.into_iter().map(|(_, entity)| entity).collect())
    }

    /// Re-reads the root directory and replaces every entry.
    pub fn refresh(&mut self) -> Result<()> {
        self.root.ensure_live()?;
        debug!("Refreshing tree at {}", self.root.path().display());
        self.load()
    }

    /// Applies `mode` to every member. Directories are not recursed into and
    /// links are skipped.
    pub fn chmod(&self, mode: u32) -> Result<()> {
        for entity in self.entities() {
            entity.chmod(mode, false)?;
        }
        Ok(())
    }
}

/// Lazy depth-first iterator returned by [`FileTree::traverse`].
pub struct Traverse {
    stack: Vec<std::vec::IntoIter<Entity>>,
}

impl Iterator for Traverse {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                None => {
                    self.stack.pop();
                }
                Some(Entity::Directory(dir)) => {
                    debug!("Descending into {}", dir.path().display());
                    match FileTree::open(dir) {
                        Ok(subtree) => self.stack.push(subtree.entities().into_iter()),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(other) => return Some(Ok(other)),
            }
        }
    }
}
