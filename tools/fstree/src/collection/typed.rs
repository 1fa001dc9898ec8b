use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FileError, Result};
use crate::validator::ValidatorChain;

/// Key under which a collection stores an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Index(usize),
    Path(PathBuf),
    Name(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Path(path) => write!(f, "{}", path.display()),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<PathBuf> for Key {
    fn from(path: PathBuf) -> Self {
        Key::Path(path)
    }
}

impl From<&Path> for Key {
    fn from(path: &Path) -> Self {
        Key::Path(path.to_path_buf())
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

/// Ordered keyed container that runs a validator chain on every insert.
///
/// A rejected item leaves the collection untouched.
pub struct TypedCollection<T> {
    items: Vec<(Key, T)>,
    chain: ValidatorChain<T>,
    next_index: usize,
}

impl<T: Clone> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            chain: self.chain.clone(),
            next_index: self.next_index,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TypedCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCollection")
            .field("chain", &self.chain)
            .field("items", &self.items)
            .finish()
    }
}

impl<T> TypedCollection<T> {
    pub fn new(chain: ValidatorChain<T>) -> Self {
        Self {
            items: Vec::new(),
            chain,
            next_index: 0,
        }
    }

    pub fn chain(&self) -> &ValidatorChain<T> {
        &self.chain
    }

    /// Mutable access to the chain. Appending fails once it is locked.
    pub fn chain_mut(&mut self) -> &mut ValidatorChain<T> {
        &mut self.chain
    }

    /// Validates and inserts `item` under the next free index key.
    pub fn append(&mut self, item: T) -> Result<Key> {
        self.chain.validate(&item)?;

        let key = Key::Index(self.next_index);
        self.next_index = self.next_index.saturating_add(1);
        self.items.push((key.clone(), item));
        Ok(key)
    }

    /// Validates and inserts `item` under `key`, replacing any item already
    /// stored there in place.
    pub fn append_with_key(&mut self, item: T, key: Key) -> Result<()> {
        self.chain.validate(&item)?;

        if let Key::Index(index) = key {
            self.next_index = self.next_index.max(index.saturating_add(1));
        }
        match self.items.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = item,
            None => self.items.push((key, item)),
        }
        Ok(())
    }

    /// Inserts items one by one. The first rejected item stops the batch;
    /// items inserted before it stay.
    pub fn append_many<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.append(item)?;
        }
        Ok(())
    }

    /// Replaces every item after validating all of them. Nothing changes if
    /// one is rejected.
    pub fn replace_all(&mut self, items: Vec<(Key, T)>) -> Result<()> {
        for (_, item) in &items {
            self.chain.validate(item).map_err(FileError::from)?;
        }
        self.next_index = items
            .iter()
            .filter_map(|(key, _)| match key {
                Key::Index(index) => Some(index.saturating_add(1)),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        self.items = items;
        Ok(())
    }

    pub fn get(&self, key: &Key) -> Option<&T> {
        self.items
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, item)| item)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    pub fn remove_by_key(&mut self, key: &Key) -> Option<T> {
        let position = self.items.iter().position(|(existing, _)| existing == key)?;
        Some(self.items.remove(position).1)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Key, &T) -> bool) {
        self.items.retain(|(key, item)| keep(key, item));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &T)> {
        self.items.iter().map(|(key, item)| (key, item))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.items.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(_, item)| item)
    }

    /// Stable sort of the items; equal items keep their relative order.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        self.items.sort_by(|(_, a), (_, b)| compare(a, b));
    }
}

impl<T: Clone> TypedCollection<T> {
    /// New collection with the same chain holding only the matching items,
    /// under their original keys.
    pub fn filter(&self, mut keep: impl FnMut(&T) -> bool) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|(_, item)| keep(item))
                .cloned()
                .collect(),
            chain: self.chain.clone(),
            next_index: self.next_index,
        }
    }
}

impl<T> IntoIterator for TypedCollection<T> {
    type Item = (Key, T);
    type IntoIter = std::vec::IntoIter<(Key, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
