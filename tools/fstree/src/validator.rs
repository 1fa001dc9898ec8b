use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::entity::{Entity, EntityKind, FsNode, HasPermissions};
use crate::error::{FileError, Result};
use crate::filesystem::NodeKind;

/// A candidate value failed a validator chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {criterion}")]
pub struct ValidationError {
    /// Human readable description of the unmet criterion.
    pub criterion: String,
}

pub trait Validator<T>: Send + Sync {
    fn test(&self, candidate: &T) -> bool;

    fn description(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// Every validator must pass.
    All,
    /// At least one validator must pass.
    Any,
}

struct ChainItem<T> {
    validator: Arc<dyn Validator<T>>,
    negated: bool,
}

impl<T> Clone for ChainItem<T> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            negated: self.negated,
        }
    }
}

impl<T> ChainItem<T> {
    fn passes(&self, candidate: &T) -> bool {
        self.validator.test(candidate) != self.negated
    }

    fn description(&self) -> String {
        if self.negated {
            format!("not ({})", self.validator.description())
        } else {
            self.validator.description()
        }
    }
}

/// Ordered set of validators gating insertion into a collection.
///
/// Once [`lock`](ValidatorChain::lock)ed the set can no longer change.
pub struct ValidatorChain<T> {
    items: Vec<ChainItem<T>>,
    mode: ChainMode,
    locked: bool,
}

impl<T> Clone for ValidatorChain<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            mode: self.mode,
            locked: self.locked,
        }
    }
}

impl<T> fmt::Debug for ValidatorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("mode", &self.mode)
            .field("locked", &self.locked)
            .field("validators", &self.descriptions())
            .finish()
    }
}

impl<T> ValidatorChain<T> {
    pub fn new(mode: ChainMode) -> Self {
        Self {
            items: Vec::new(),
            mode,
            locked: false,
        }
    }

    /// Unlocked chain holding `validators`, none of them negated.
    pub fn from_validators<I>(mode: ChainMode, validators: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Validator<T>>>,
    {
        Self {
            items: validators
                .into_iter()
                .map(|validator| ChainItem {
                    validator,
                    negated: false,
                })
                .collect(),
            mode,
            locked: false,
        }
    }

    pub fn all() -> Self {
        Self::new(ChainMode::All)
    }

    pub fn any() -> Self {
        Self::new(ChainMode::Any)
    }

    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    pub fn append<V>(&mut self, validator: V, negated: bool) -> Result<&mut Self>
    where
        V: Validator<T> + 'static,
    {
        self.append_shared(Arc::new(validator), negated)
    }

    pub fn append_shared(
        &mut self,
        validator: Arc<dyn Validator<T>>,
        negated: bool,
    ) -> Result<&mut Self> {
        if self.locked {
            return Err(FileError::Logic(format!(
                "validator chain is locked, cannot append \"{}\"",
                validator.description()
            )));
        }
        self.items.push(ChainItem { validator, negated });
        Ok(self)
    }

    /// Appends several validators in order, stopping at the first failure.
    pub fn append_many<I>(&mut self, validators: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (Arc<dyn Validator<T>>, bool)>,
    {
        for (validator, negated) in validators {
            self.append_shared(validator, negated)?;
        }
        Ok(self)
    }

    /// Freezes the validator set. Irreversible.
    pub fn lock(&mut self) -> &mut Self {
        self.locked = true;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.items.iter().map(ChainItem::description).collect()
    }

    /// Runs the chain against `candidate`. An empty chain accepts everything.
    pub fn validate(&self, candidate: &T) -> std::result::Result<(), ValidationError> {
        if self.items.is_empty() {
            return Ok(());
        }

        match self.mode {
            ChainMode::All => match self.items.iter().find(|item| !item.passes(candidate)) {
                Some(failed) => Err(ValidationError {
                    criterion: failed.description(),
                }),
                None => Ok(()),
            },
            ChainMode::Any => {
                if self.items.iter().any(|item| item.passes(candidate)) {
                    Ok(())
                } else {
                    Err(ValidationError {
                        criterion: format!("any of: {}", self.descriptions().join(", ")),
                    })
                }
            }
        }
    }
}

/// Validator backed by a closure.
pub struct FnValidator<T> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
    description: String,
}

impl<T> FnValidator<T> {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            description: description.into(),
        }
    }
}

impl<T> Validator<T> for FnValidator<T> {
    fn test(&self, candidate: &T) -> bool {
        (self.predicate)(candidate)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Accepts entities of one wrapper kind.
#[derive(Debug, Clone, Copy)]
pub struct EntityKindValidator(pub EntityKind);

impl Validator<Entity> for EntityKindValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate.kind() == self.0
    }

    fn description(&self) -> String {
        format!("entity is a {}", self.0)
    }
}

/// Accepts entities whose live node type is one of a set.
#[derive(Debug, Clone)]
pub struct NodeTypeValidator(pub Vec<NodeKind>);

impl Validator<Entity> for NodeTypeValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate
            .node_type()
            .map(|kind| self.0.contains(&kind))
            .unwrap_or(false)
    }

    fn description(&self) -> String {
        let names: Vec<_> = self.0.iter().map(NodeKind::as_str).collect();
        format!("node type is one of [{}]", names.join(", "))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExistsValidator;

impl Validator<Entity> for ExistsValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate.exists()
    }

    fn description(&self) -> String {
        "node exists".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableValidator;

impl Validator<Entity> for ReadableValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate.is_readable()
    }

    fn description(&self) -> String {
        "node is readable".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WritableValidator;

impl Validator<Entity> for WritableValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate.is_writable()
    }

    fn description(&self) -> String {
        "node is writable".to_string()
    }
}

/// Accepts entities whose permission bits equal one of a set.
#[derive(Debug, Clone)]
pub struct PermissionsValidator(pub Vec<u32>);

impl Validator<Entity> for PermissionsValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate
            .perms()
            .map(|mode| self.0.contains(&(mode & 0o7777)))
            .unwrap_or(false)
    }

    fn description(&self) -> String {
        let modes: Vec<_> = self.0.iter().map(|mode| format!("{:o}", mode)).collect();
        format!("permissions are one of [{}]", modes.join(", "))
    }
}

/// Accepts files whose whole content parses as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContentValidator;

impl Validator<Entity> for JsonContentValidator {
    fn test(&self, candidate: &Entity) -> bool {
        match candidate {
            Entity::File(file) => file
                .contents()
                .map(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).is_ok())
                .unwrap_or(false),
            _ => false,
        }
    }

    fn description(&self) -> String {
        "file contains valid JSON".to_string()
    }
}

/// Accepts entities located under a path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixValidator(pub PathBuf);

impl Validator<Entity> for PathPrefixValidator {
    fn test(&self, candidate: &Entity) -> bool {
        candidate.path().starts_with(&self.0)
    }

    fn description(&self) -> String {
        format!("path is under {}", self.0.display())
    }
}
