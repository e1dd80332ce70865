// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

use crate::compiled::CompiledQueryProfileRegistry;
use crate::error::QueryProfileError;
use crate::profile::{ProfileValue, QueryProfile};
use crate::types::QueryProfileType;
use crate::value::Value;
use crate::Rc;

use core::fmt;
use std::collections::BTreeMap;

type String = Rc<str>;

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: String, registry: String },
    InvalidName { name: String, registry: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{registry} registration failed: The name '{name}' is invalid (empty or whitespace-only names are not allowed).")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: String::from(name),
            registry: String::from(registry_name),
        })
    } else {
        Ok(())
    }
}

/// Items that carry their own registration name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Registry of named items, ordered by name.
///
/// Registries are authoring structures: they are mutated by a single writer and
/// never shared with request handling, which reads compiled snapshots instead.
#[derive(Clone, Debug)]
pub struct Registry<T> {
    inner: BTreeMap<String, T>,
    name: String,
}

impl<T: Named> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: impl Into<String>) -> Self {
        Self {
            inner: BTreeMap::new(),
            name: registry_name.into(),
        }
    }

    /// Get the name of this registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item under its own name. Returns Err if the name is taken.
    pub fn register(&mut self, item: T) -> Result<(), RegistryError> {
        let name = String::from(item.name());
        validate_name(&name, &self.name)?;

        use std::collections::btree_map::Entry;
        match self.inner.entry(name) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyExists {
                name: e.key().clone(),
                registry: self.name.clone(),
            }),
            Entry::Vacant(e) => {
                e.insert(item);
                Ok(())
            }
        }
    }

    /// Try to register an item, but don't fail if the name already exists.
    /// Returns Ok(true) if the item was registered, Ok(false) if the name already exists.
    pub fn try_register(&mut self, item: T) -> Result<bool, RegistryError> {
        match self.register(item) {
            Ok(()) => Ok(true),
            Err(RegistryError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Retrieve an item by name, if it exists.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.inner.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.inner.get_mut(name)
    }

    /// Remove an item by name. Returns the removed item if it existed.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.inner.remove(name)
    }

    /// List all registered item names, in order.
    pub fn list_names(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    /// Check if an item with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Get the number of registered items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clear all items from the registry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate over all items in name order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.inner.values()
    }

    /// Puts back an item previously taken out with [`Registry::remove`].
    pub(crate) fn restore(&mut self, item: T) {
        self.inner.insert(String::from(item.name()), item);
    }
}

/// Query profile types by name.
pub type QueryProfileTypeRegistry = Registry<QueryProfileType>;

impl Default for QueryProfileTypeRegistry {
    fn default() -> Self {
        Self::new("query profile types")
    }
}

impl QueryProfileTypeRegistry {
    /// True if `sub` is `sup` or inherits it, directly or transitively.
    pub fn inherits(&self, sub: &str, sup: &str) -> bool {
        match self.get(sub) {
            Some(t) => t.inherits(sup, self),
            None => false,
        }
    }
}

/// The unit of authoring: profiles by name plus the types they may use.
///
/// Not thread-safe while being populated. Call [`QueryProfileRegistry::compile`]
/// to produce the immutable registry used at request time.
#[derive(Clone, Debug)]
pub struct QueryProfileRegistry {
    types: QueryProfileTypeRegistry,
    profiles: Registry<QueryProfile>,
}

impl Default for QueryProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryProfileRegistry {
    pub fn new() -> Self {
        Self::with_types(QueryProfileTypeRegistry::default())
    }

    pub fn with_types(types: QueryProfileTypeRegistry) -> Self {
        Self {
            types,
            profiles: Registry::new("query profiles"),
        }
    }

    pub fn types(&self) -> &QueryProfileTypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut QueryProfileTypeRegistry {
        &mut self.types
    }

    pub fn register_type(&mut self, query_profile_type: QueryProfileType) -> Result<(), RegistryError> {
        self.types.register(query_profile_type)
    }

    pub fn register(&mut self, profile: QueryProfile) -> Result<(), RegistryError> {
        self.profiles.register(profile)
    }

    pub fn get(&self, name: &str) -> Option<&QueryProfile> {
        self.profiles.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut QueryProfile> {
        self.profiles.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<QueryProfile> {
        self.profiles.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains(name)
    }

    pub fn profiles(&self) -> &Registry<QueryProfile> {
        &self.profiles
    }

    /// Sets a value on a registered profile, validating it against the registry.
    pub fn set(
        &mut self,
        profile: &str,
        path: &str,
        value: impl Into<ProfileValue>,
    ) -> Result<(), QueryProfileError> {
        let mut target = self
            .profiles
            .remove(profile)
            .ok_or_else(|| QueryProfileError::UnknownProfile(profile.into()))?;
        let result = target.set(path, value, self);
        self.profiles.restore(target);
        result
    }

    /// Assigns a type to a registered profile; see [`QueryProfile::set_type`].
    pub fn set_type(&mut self, profile: &str, type_name: &str) -> Result<(), QueryProfileError> {
        let mut target = self
            .profiles
            .remove(profile)
            .ok_or_else(|| QueryProfileError::UnknownProfile(profile.into()))?;
        let result = target.set_type(type_name, self);
        self.profiles.restore(target);
        result
    }

    /// Reads a value from a registered profile.
    pub fn get_value(&self, profile: &str, path: &str) -> Option<Value> {
        self.get(profile).and_then(|p| p.get(path, self))
    }

    /// Compiles every registered profile; see [`crate::compile`].
    pub fn compile(&self) -> Result<CompiledQueryProfileRegistry, QueryProfileError> {
        crate::compiler::compile(self)
    }
}
