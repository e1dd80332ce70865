// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

//! Immutable, flattened query profiles.
//!
//! A compiled profile maps canonical dotted names to values or to other compiled
//! profiles. Inheritance, aliases and the types in effect at every prefix are
//! resolved when compiling, so reads are bounded map traversals. Nothing here
//! refers back to the authoring registry.

use crate::compound_name::CompoundName;
use crate::properties::QueryProfileProperties;
use crate::types::FieldType;
use crate::value::Value;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

pub(crate) type TypeId = usize;

#[derive(Clone, Debug)]
pub(crate) struct CompiledField {
    pub(crate) name: Rc<str>,
    pub(crate) field_type: FieldType,
    /// The type of values below this field, for profile-typed fields.
    pub(crate) nested: Option<TypeId>,
}

/// A type with its inherited fields merged in and keyed by lowercased name and alias.
#[derive(Clone, Debug)]
pub(crate) struct CompiledType {
    pub(crate) name: Rc<str>,
    /// The nearest strict type in this type's ancestry, itself included.
    pub(crate) strict_type: Option<Rc<str>>,
    pub(crate) ancestors: BTreeSet<Rc<str>>,
    pub(crate) fields: BTreeMap<String, CompiledField>,
}

impl CompiledType {
    pub(crate) fn new(name: Rc<str>) -> Self {
        Self {
            name,
            strict_type: None,
            ancestors: BTreeSet::new(),
            fields: BTreeMap::new(),
        }
    }

    pub(crate) fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.get(&name.to_lowercase())
    }

    /// True if this type is `type_name` or inherits it.
    pub(crate) fn inherits(&self, type_name: &str) -> bool {
        self.ancestors.contains(type_name)
    }
}

/// All compiled types of one compilation, registered and anonymous.
#[derive(Debug, Default)]
pub(crate) struct CompiledTypes {
    types: Vec<CompiledType>,
    by_name: BTreeMap<Rc<str>, TypeId>,
}

impl CompiledTypes {
    pub(crate) fn get(&self, id: TypeId) -> Option<&CompiledType> {
        self.types.get(id)
    }

    /// The id of a registered type.
    pub(crate) fn id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Reserves an id for a registered type, to be filled in with [`CompiledTypes::set`].
    pub(crate) fn reserve(&mut self, name: Rc<str>) -> TypeId {
        let id = self.push(CompiledType::new(name.clone()));
        self.by_name.insert(name, id);
        id
    }

    pub(crate) fn push(&mut self, compiled: CompiledType) -> TypeId {
        self.types.push(compiled);
        self.types.len() - 1
    }

    pub(crate) fn set(&mut self, id: TypeId, compiled: CompiledType) {
        if let Some(slot) = self.types.get_mut(id) {
            *slot = compiled;
        }
    }

    pub(crate) fn registered(&self) -> usize {
        self.by_name.len()
    }
}

/// A resolved value in a compiled profile.
#[derive(Clone, Debug)]
pub enum CompiledValue {
    Value(Value),
    /// A referenced or nested profile, compiled.
    Profile(Rc<CompiledQueryProfile>),
}

impl CompiledValue {
    /// The plain value: a value as is, a profile's own value if it has one.
    pub fn value(&self) -> Option<Value> {
        match self {
            CompiledValue::Value(v) => Some(v.clone()),
            CompiledValue::Profile(p) => p.entries.get(&CompoundName::root()).and_then(CompiledValue::value),
        }
    }
}

/// Profiles compare by name, values by value.
impl PartialEq for CompiledValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CompiledValue::Value(a), CompiledValue::Value(b)) => a == b,
            (CompiledValue::Profile(a), CompiledValue::Profile(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// Where a dotted path leads: its canonical form and the types met on the way.
pub(crate) struct Walk<'a> {
    pub(crate) canonical: CompoundName,
    /// The type in effect after each prefix; `types[0]` is the root type.
    pub(crate) types: Vec<Option<&'a CompiledType>>,
    /// The field each segment resolved to, if declared.
    pub(crate) fields: Vec<Option<&'a CompiledField>>,
}

impl<'a> Walk<'a> {
    /// The field named by the last segment.
    pub(crate) fn field(&self) -> Option<&'a CompiledField> {
        self.fields.last().copied().flatten()
    }

    /// The first undeclared segment under a strict type, with that type's name.
    pub(crate) fn rejected(&self) -> Option<(usize, &'a Rc<str>)> {
        self.fields.iter().enumerate().find_map(|(i, field)| match (field, self.types[i]) {
            (None, Some(t)) => t.strict_type.as_ref().map(|s| (i, s)),
            _ => None,
        })
    }
}

/// An immutable, fully resolved query profile.
#[derive(Debug)]
pub struct CompiledQueryProfile {
    pub(crate) name: Rc<str>,
    pub(crate) type_id: Option<TypeId>,
    pub(crate) entries: BTreeMap<CompoundName, CompiledValue>,
    /// Types declared by inline profiles, by their prefix. The root holds the profile's type.
    pub(crate) types: BTreeMap<CompoundName, TypeId>,
    pub(crate) type_system: Rc<CompiledTypes>,
}

impl CompiledQueryProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> Option<&str> {
        self.root_type().map(|t| t.name.as_ref())
    }

    /// True if undeclared keys are rejected at the root of this profile.
    pub fn is_strict(&self) -> bool {
        self.root_type().is_some_and(|t| t.strict_type.is_some())
    }

    pub(crate) fn root_type(&self) -> Option<&CompiledType> {
        self.type_id.and_then(|id| self.type_system.get(id))
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved entries in name order, without following profile references.
    pub fn entries(&self) -> impl Iterator<Item = (&CompoundName, &CompiledValue)> + '_ {
        self.entries.iter()
    }

    /// Reads the value at a dotted path. Field names and aliases match case-insensitively.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lookup(path)?.value()
    }

    /// Reads what is at a dotted path, which may be a nested profile.
    pub fn lookup(&self, path: &str) -> Option<CompiledValue> {
        let name = CompoundName::parse(path).ok()?;
        let walk = self.walk(&name, &|_| None);
        self.lookup_canonical(&walk.canonical)
    }

    /// Reads a canonical name, delegating to the deepest profile entry above it.
    pub(crate) fn lookup_canonical(&self, name: &CompoundName) -> Option<CompiledValue> {
        if let Some(v) = self.entries.get(name) {
            return Some(v.clone());
        }
        (1..name.len()).rev().find_map(|i| match self.entries.get(&name.prefix(i)) {
            Some(CompiledValue::Profile(p)) => Some(p.lookup_canonical(&name.suffix(i))),
            _ => None,
        })?
    }

    /// Canonicalizes `path` against the types in effect along it.
    ///
    /// `bound` supplies profiles bound at request time, which take precedence over
    /// the compiled entries at the same name.
    pub(crate) fn walk<'a>(
        &'a self,
        path: &CompoundName,
        bound: &dyn Fn(&CompoundName) -> Option<&'a CompiledQueryProfile>,
    ) -> Walk<'a> {
        let mut current = self;
        let mut offset = 0;
        let mut canonical = CompoundName::root();
        let mut types = vec![bound(&canonical).unwrap_or(self).root_type()];
        let mut fields = Vec::with_capacity(path.len());

        for (i, segment) in path.segments().enumerate() {
            let field = types[i].and_then(|t| t.field(segment));
            canonical = canonical.append(field.map_or(segment, |f| f.name.as_ref()));
            fields.push(field);

            let from_field = || field.and_then(|f| f.nested).and_then(|id| current.type_system.get(id));
            let relative = canonical.suffix(offset);
            let next = if let Some(profile) = bound(&canonical) {
                let next = profile.root_type().or_else(from_field);
                current = profile;
                offset = i + 1;
                next
            } else if let Some(&id) = current.types.get(&relative) {
                current.type_system.get(id)
            } else if let Some(CompiledValue::Profile(profile)) = current.entries.get(&relative) {
                let next = profile.root_type().or_else(from_field);
                current = profile;
                offset = i + 1;
                next
            } else {
                from_field()
            };
            types.push(next);
        }

        Walk {
            canonical,
            types,
            fields,
        }
    }

    /// Adds the values below `prefix` to `out`, keyed relative to `prefix` and then
    /// under `base`. Keys already present are kept.
    pub(crate) fn collect(&self, prefix: &CompoundName, base: &CompoundName, out: &mut BTreeMap<String, Value>) {
        for (name, value) in &self.entries {
            if name.starts_with(prefix) {
                let key = base.concat(&name.suffix(prefix.len()));
                match value {
                    CompiledValue::Value(v) if !key.is_root() => {
                        out.entry(key.to_string()).or_insert_with(|| v.clone());
                    }
                    CompiledValue::Value(_) => {}
                    CompiledValue::Profile(p) => p.collect(&CompoundName::root(), &key, out),
                }
            } else if prefix.starts_with(name) {
                if let CompiledValue::Profile(p) = value {
                    p.collect(&prefix.suffix(name.len()), base, out);
                }
            }
        }
    }
}

/// The immutable result of compiling a [`crate::QueryProfileRegistry`].
///
/// Cloning is cheap and clones share the compiled profiles. With the `arc` feature
/// the registry can be read from many threads without synchronization.
#[derive(Clone, Debug)]
pub struct CompiledQueryProfileRegistry {
    profiles: Rc<BTreeMap<Rc<str>, Rc<CompiledQueryProfile>>>,
    type_system: Rc<CompiledTypes>,
}

impl CompiledQueryProfileRegistry {
    pub(crate) fn new(
        profiles: BTreeMap<Rc<str>, Rc<CompiledQueryProfile>>,
        type_system: Rc<CompiledTypes>,
    ) -> Self {
        Self {
            profiles: Rc::new(profiles),
            type_system,
        }
    }

    pub fn get(&self, name: &str) -> Option<Rc<CompiledQueryProfile>> {
        self.profiles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> Vec<Rc<str>> {
        self.profiles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<CompiledQueryProfile>> + '_ {
        self.profiles.values()
    }

    /// Number of registered types that were compiled.
    pub fn type_count(&self) -> usize {
        self.type_system.registered()
    }

    /// A request-time accessor over the named profile, able to bind other profiles
    /// of this registry by name.
    pub fn properties(&self, name: &str) -> Option<QueryProfileProperties> {
        let profile = self.get(name)?;
        Some(QueryProfileProperties::new(profile).with_registry(self.clone()))
    }
}
