use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Key, TypedCollection};
use crate::entity::{Entity, EntityKind, FsNode, Insertable};
use crate::error::{FileError, Result};
use crate::filesystem::{NodeKind, SharedFileSystem};
use crate::validator::{
    ChainMode, EntityKindValidator, ExistsValidator, JsonContentValidator, NodeTypeValidator,
    ReadableValidator, Validator, ValidatorChain, WritableValidator,
};

/// Describes the validator chain of one domain collection.
pub trait CollectionRules {
    const NAME: &'static str;

    fn validators() -> Vec<Arc<dyn Validator<Entity>>>;
}

/// Marker for collections whose members can be read line by line.
pub trait LineReadable: CollectionRules {}

#[derive(Debug)]
pub enum Files {}
#[derive(Debug)]
pub enum Directories {}
#[derive(Debug)]
pub enum Links {}
#[derive(Debug)]
pub enum ReadableFiles {}
#[derive(Debug)]
pub enum WritableFiles {}
#[derive(Debug)]
pub enum ReadWriteFiles {}
#[derive(Debug)]
pub enum JsonFiles {}

fn of_kind(kind: EntityKind) -> Arc<dyn Validator<Entity>> {
    Arc::new(EntityKindValidator(kind))
}

impl CollectionRules for Files {
    const NAME: &'static str = "FileCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![of_kind(EntityKind::File)]
    }
}

impl CollectionRules for Directories {
    const NAME: &'static str = "DirectoryCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![of_kind(EntityKind::Directory)]
    }
}

impl CollectionRules for Links {
    const NAME: &'static str = "LinkCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![of_kind(EntityKind::Link)]
    }
}

impl CollectionRules for ReadableFiles {
    const NAME: &'static str = "ReadableFileCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![
            of_kind(EntityKind::File),
            Arc::new(ExistsValidator),
            Arc::new(ReadableValidator),
        ]
    }
}

impl CollectionRules for WritableFiles {
    const NAME: &'static str = "WritableFileCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![
            of_kind(EntityKind::File),
            Arc::new(ExistsValidator),
            Arc::new(WritableValidator),
        ]
    }
}

impl CollectionRules for ReadWriteFiles {
    const NAME: &'static str = "ReadWriteFileCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![
            of_kind(EntityKind::File),
            Arc::new(ExistsValidator),
            Arc::new(ReadableValidator),
            Arc::new(WritableValidator),
        ]
    }
}

impl CollectionRules for JsonFiles {
    const NAME: &'static str = "JsonFileCollection";

    fn validators() -> Vec<Arc<dyn Validator<Entity>>> {
        vec![
            of_kind(EntityKind::File),
            Arc::new(ReadableValidator),
            Arc::new(JsonContentValidator),
        ]
    }
}

impl LineReadable for ReadableFiles {}
impl LineReadable for ReadWriteFiles {}
impl LineReadable for JsonFiles {}

pub type FileCollection = EntityCollection<Files>;
pub type DirectoryCollection = EntityCollection<Directories>;
pub type LinkCollection = EntityCollection<Links>;
pub type ReadableFileCollection = EntityCollection<ReadableFiles>;
pub type WritableFileCollection = EntityCollection<WritableFiles>;
pub type ReadWriteFileCollection = EntityCollection<ReadWriteFiles>;
pub type JsonFileCollection = EntityCollection<JsonFiles>;

/// Entity collection whose chain is fixed by `S` and locked on
/// construction.
pub struct EntityCollection<S> {
    items: TypedCollection<Entity>,
    fs: SharedFileSystem,
    _rules: PhantomData<fn() -> S>,
}

impl<S> Clone for EntityCollection<S> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            fs: self.fs.clone(),
            _rules: PhantomData,
        }
    }
}

impl<S: CollectionRules> fmt::Debug for EntityCollection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::NAME)
            .field("items", &self.paths())
            .finish()
    }
}

impl<S: CollectionRules> EntityCollection<S> {
    pub fn new(fs: SharedFileSystem) -> Self {
        let mut chain = ValidatorChain::from_validators(ChainMode::All, S::validators());
        chain.lock();

        Self {
            items: TypedCollection::new(chain),
            fs,
            _rules: PhantomData,
        }
    }

    /// Builds a collection from keyed raw values. Any failing item aborts
    /// construction with a factory error wrapping the cause.
    pub fn from_keyed<I, V>(fs: SharedFileSystem, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Key, V)>,
        V: Into<Insertable>,
    {
        let mut collection = Self::new(fs);
        for (key, value) in items {
            collection
                .append_with_key(value, key.clone())
                .map_err(|source| FileError::Factory {
                    collection: S::NAME,
                    key,
                    source: Box::new(source),
                })?;
        }
        Ok(collection)
    }

    pub fn from_iterable<I, V>(fs: SharedFileSystem, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Insertable>,
    {
        let keyed = items
            .into_iter()
            .enumerate()
            .map(|(index, value)| (Key::Index(index), value));
        Self::from_keyed(fs, keyed)
    }

    pub fn name(&self) -> &'static str {
        S::NAME
    }

    pub fn chain(&self) -> &ValidatorChain<Entity> {
        self.items.chain()
    }

    /// Appends an entity or a path. A path is wrapped through the entity
    /// factory before validation.
    pub fn append(&mut self, item: impl Into<Insertable>) -> Result<Key> {
        let entity = item.into().resolve(&self.fs)?;
        self.items.append(entity)
    }

    pub fn append_with_key(&mut self, item: impl Into<Insertable>, key: Key) -> Result<()> {
        let entity = item.into().resolve(&self.fs)?;
        self.items.append_with_key(entity, key)
    }

    /// Sequential; items appended before a failure are kept.
    pub fn append_many<I, V>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Insertable>,
    {
        for item in items {
            self.append(item)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &Key) -> Option<&Entity> {
        self.items.get(key)
    }

    pub fn remove_by_key(&mut self, key: &Key) -> Option<Entity> {
        self.items.remove_by_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Entity)> {
        self.items.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.items.values()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entities().map(|e| e.path().to_path_buf()).collect()
    }

    pub fn filter(&self, keep: impl FnMut(&Entity) -> bool) -> Self {
        Self {
            items: self.items.filter(keep),
            fs: self.fs.clone(),
            _rules: PhantomData,
        }
    }

    /// Drops entries whose name starts with a dot.
    pub fn filter_hidden_files(&self) -> Self {
        self.filter(|entity| !entity.name().starts_with('.'))
    }

    pub fn filter_by_extension(&self, extension: &str) -> Self {
        self.filter_by_extensions(&[extension])
    }

    /// Keeps entries whose extension matches one of `extensions`, ignoring
    /// case and a leading dot.
    pub fn filter_by_extensions(&self, extensions: &[&str]) -> Self {
        let wanted: Vec<String> = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        self.filter(|entity| {
            entity
                .path()
                .extension()
                .map(|ext| wanted.contains(&ext.to_string_lossy().to_lowercase()))
                .unwrap_or(false)
        })
    }

    pub fn filter_by_file_type(&self, kind: NodeKind, negated: bool) -> Self {
        self.filter_by_file_types(&[kind], negated)
    }

    pub fn filter_by_file_types(&self, kinds: &[NodeKind], negated: bool) -> Self {
        let validator = NodeTypeValidator(kinds.to_vec());
        self.filter(|entity| validator.test(entity) != negated)
    }
}

impl<S: LineReadable> EntityCollection<S> {
    /// Lines of every member, in collection order.
    pub fn lines(&self) -> Result<Vec<String>> {
        self.iterate_lines().collect()
    }

    pub fn lines_as_string(&self, separator: &str) -> Result<String> {
        Ok(self.lines()?.join(separator))
    }

    /// Lazily chains the line iterators of every member; each file is opened
    /// when the previous one is exhausted.
    pub fn iterate_lines(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.entities()
            .filter_map(Entity::as_file)
            .flat_map(|file| match file.iterate_lines() {
                Ok(lines) => Box::new(lines) as Box<dyn Iterator<Item = Result<String>>>,
                Err(e) => Box::new(std::iter::once(Err(e))),
            })
    }
}

impl EntityCollection<JsonFiles> {
    /// Parses every member as JSON.
    pub fn decode(&self) -> Result<Vec<serde_json::Value>> {
        self.entities()
            .filter_map(Entity::as_file)
            .map(|file| {
                let bytes = file.contents()?;
                serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map_err(|e| FileError::read(file.path(), format!("invalid JSON: {e}")))
            })
            .collect()
    }
}

impl<S> IntoIterator for EntityCollection<S> {
    type Item = (Key, Entity);
    type IntoIter = std::vec::IntoIter<(Key, Entity)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
