// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

use crate::compiled::CompiledQueryProfile;
use crate::compound_name::CompoundName;
use crate::embed;
use crate::error::QueryProfileError;
use crate::number::Number;
use crate::registry::{Named, QueryProfileRegistry};
use crate::tensor::Tensor;
use crate::types::{FieldLookup, FieldType, QueryProfileType};
use crate::utils::find_first;
use crate::value::Value;
use crate::Rc;

use core::fmt;
use std::collections::BTreeMap;

use log::debug;

/// What a profile holds at one key.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileValue {
    /// A scalar, a tensor or a literal string.
    Value(Value),
    /// A nested profile owned by this one.
    Profile(Box<QueryProfile>),
    /// The name of a registered profile, resolved when compiled or read.
    Reference(Rc<str>),
}

impl fmt::Display for ProfileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileValue::Value(v) => write!(f, "{v}"),
            ProfileValue::Profile(p) => write!(f, "{p}"),
            ProfileValue::Reference(name) => f.write_str(name),
        }
    }
}

impl From<Value> for ProfileValue {
    fn from(v: Value) -> Self {
        ProfileValue::Value(v)
    }
}

impl From<QueryProfile> for ProfileValue {
    fn from(p: QueryProfile) -> Self {
        ProfileValue::Profile(Box::new(p))
    }
}

impl From<&str> for ProfileValue {
    fn from(s: &str) -> Self {
        ProfileValue::Value(Value::from(s))
    }
}

impl From<String> for ProfileValue {
    fn from(s: String) -> Self {
        ProfileValue::Value(Value::from(s))
    }
}

impl From<bool> for ProfileValue {
    fn from(b: bool) -> Self {
        ProfileValue::Value(Value::from(b))
    }
}

impl From<i32> for ProfileValue {
    fn from(n: i32) -> Self {
        ProfileValue::Value(Value::from(n))
    }
}

impl From<i64> for ProfileValue {
    fn from(n: i64) -> Self {
        ProfileValue::Value(Value::from(n))
    }
}

impl From<f32> for ProfileValue {
    fn from(n: f32) -> Self {
        ProfileValue::Value(Value::from(n))
    }
}

impl From<f64> for ProfileValue {
    fn from(n: f64) -> Self {
        ProfileValue::Value(Value::from(n))
    }
}

impl From<Number> for ProfileValue {
    fn from(n: Number) -> Self {
        ProfileValue::Value(Value::from(n))
    }
}

impl From<Tensor> for ProfileValue {
    fn from(t: Tensor) -> Self {
        ProfileValue::Value(Value::from(t))
    }
}

/// A named, optionally typed set of values addressed by dotted paths.
///
/// Profiles are authoring objects. Values are validated against the profile's type
/// as they are set; reads at request time go through a compiled snapshot instead.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryProfile {
    name: Rc<str>,
    type_name: Option<Rc<str>>,
    inherited: Vec<Rc<str>>,
    value: Option<Value>,
    values: BTreeMap<Rc<str>, ProfileValue>,
}

impl Named for QueryProfile {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QueryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query profile '{}'", self.name)
    }
}

impl QueryProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            inherited: vec![],
            value: None,
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Appends a registered profile to inherit values from, consulted in the order added.
    pub fn add_inherited(&mut self, profile_name: &str) {
        self.inherited.push(profile_name.into());
    }

    pub fn inherited(&self) -> &[Rc<str>] {
        &self.inherited
    }

    /// The value of the profile node itself, as opposed to the values below it.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    /// Values set directly on this profile, by their first path segment.
    pub fn values(&self) -> &BTreeMap<Rc<str>, ProfileValue> {
        &self.values
    }

    /// The type in effect for this profile: its own, else the first type found in
    /// its inherited profiles.
    pub fn effective_type<'r>(&self, registry: &'r QueryProfileRegistry) -> Option<&'r QueryProfileType> {
        if let Some(name) = &self.type_name {
            return registry.types().get(name);
        }
        self.inherited.iter().find_map(|name| {
            let parent = registry.get(name)?;
            find_first(
                parent,
                |p| p.inherited.iter().filter_map(|n| registry.get(n)).collect(),
                |p| p.type_name.as_deref().and_then(|t| registry.types().get(t)),
            )
        })
    }

    /// Assigns a type, checking and canonicalizing the values already set.
    ///
    /// Values set under an alias move to the field's name. If any value does not
    /// satisfy the new type the profile is left unchanged.
    pub fn set_type(&mut self, type_name: &str, registry: &QueryProfileRegistry) -> Result<(), QueryProfileError> {
        let query_profile_type = registry
            .types()
            .get(type_name)
            .ok_or_else(|| QueryProfileError::UnknownType(type_name.into()))?;
        let values = self.revalidated(&CompoundName::root(), Some(query_profile_type), registry)?;
        self.values = values;
        self.type_name = Some(type_name.into());
        Ok(())
    }

    /// Sets the value at a dotted path, creating nested profiles along the way.
    ///
    /// The value is checked against the type in effect at each segment. A string set
    /// on a profile-typed field becomes a reference if a profile with that name is
    /// registered and is otherwise kept as a literal string.
    pub fn set(
        &mut self,
        path: &str,
        value: impl Into<ProfileValue>,
        registry: &QueryProfileRegistry,
    ) -> Result<(), QueryProfileError> {
        let name = CompoundName::parse(path)?;
        if name.is_root() {
            return Err(QueryProfileError::InvalidName {
                name: path.into(),
                reason: "values must be set below the profile root".into(),
            });
        }
        self.set_at(&name, 0, value.into(), registry, None)
    }

    fn set_at(
        &mut self,
        path: &CompoundName,
        depth: usize,
        value: ProfileValue,
        registry: &QueryProfileRegistry,
        context: Option<&QueryProfileType>,
    ) -> Result<(), QueryProfileError> {
        let types = registry.types();
        let key = path.get(depth).unwrap_or_default();
        let in_effect = self.effective_type(registry).or(context);
        let field = match in_effect.map(|t| t.lookup(key, types)) {
            Some(FieldLookup::Found { field, .. }) => Some(field),
            Some(FieldLookup::Rejected { strict_type }) => {
                return Err(QueryProfileError::NotDeclared {
                    path: path.to_string().into(),
                    value: value.to_string().into(),
                    local: key.into(),
                    type_name: strict_type.name().into(),
                })
            }
            Some(FieldLookup::Undeclared) | None => None,
        };
        let canonical: Rc<str> = field.map_or(key, |f| f.local_name()).into();

        if depth + 1 == path.len() {
            let stored = match field {
                Some(f) => typed_value(path, f.field_type(), value, registry)?,
                None => value,
            };
            match (self.values.get_mut(&canonical), stored) {
                (Some(ProfileValue::Profile(sub)), ProfileValue::Value(v)) => sub.value = Some(v),
                (_, stored) => {
                    self.values.insert(canonical, stored);
                }
            }
            return Ok(());
        }

        if let Some(f) = field {
            if !f.field_type().is_profile() {
                return Err(QueryProfileError::type_mismatch_with(
                    path.to_string(),
                    value.to_string(),
                    f.field_type().description(),
                    format!("'{key}' is a {}, not a query profile", f.field_type().description()),
                ));
            }
        }
        let below = field.and_then(|f| f.field_type().nested_type(types));

        if let Some(ProfileValue::Profile(sub)) = self.values.get_mut(&canonical) {
            return sub.set_at(path, depth + 1, value, registry, below);
        }
        let mut sub = QueryProfile::new(&canonical);
        match self.values.get(&canonical) {
            // writing below a reference overrides the referenced profile
            Some(ProfileValue::Reference(target)) => sub.inherited.push(target.clone()),
            Some(ProfileValue::Value(v)) => sub.value = Some(v.clone()),
            _ => {}
        }
        sub.set_at(path, depth + 1, value, registry, below)?;
        self.values.insert(canonical, ProfileValue::Profile(Box::new(sub)));
        Ok(())
    }

    /// Reads the value at a dotted path, searching inherited profiles in order.
    pub fn get(&self, path: &str, registry: &QueryProfileRegistry) -> Option<Value> {
        let name = CompoundName::parse(path).ok()?;
        self.lookup(&name, registry, None)
    }

    fn lookup(
        &self,
        name: &CompoundName,
        registry: &QueryProfileRegistry,
        context: Option<&QueryProfileType>,
    ) -> Option<Value> {
        find_first(
            self,
            |p| p.inherited.iter().filter_map(|n| registry.get(n)).collect(),
            |p| p.lookup_own(name, registry, context),
        )
    }

    fn lookup_own(
        &self,
        name: &CompoundName,
        registry: &QueryProfileRegistry,
        context: Option<&QueryProfileType>,
    ) -> Option<Value> {
        let Some(key) = name.first() else {
            return self.value.clone();
        };
        let types = registry.types();
        let field = self
            .effective_type(registry)
            .or(context)
            .and_then(|t| t.field(key, types))
            .map(|(f, _)| f);
        let entry = field
            .and_then(|f| self.values.get(f.local_name()))
            .or_else(|| self.values.get(key))?;
        let below = field.and_then(|f| f.field_type().nested_type(types));
        let rest = name.rest();
        match entry {
            ProfileValue::Value(v) if rest.is_root() => Some(v.clone()),
            ProfileValue::Value(_) => None,
            ProfileValue::Profile(sub) => sub.lookup(&rest, registry, below),
            ProfileValue::Reference(target) => registry.get(target)?.lookup(&rest, registry, below),
        }
    }

    /// Compiles this profile on its own, resolving references against `registry`.
    pub fn compile(&self, registry: &QueryProfileRegistry) -> Result<Rc<CompiledQueryProfile>, QueryProfileError> {
        crate::compiler::compile_profile(self, registry)
    }

    fn revalidated(
        &self,
        prefix: &CompoundName,
        query_profile_type: Option<&QueryProfileType>,
        registry: &QueryProfileRegistry,
    ) -> Result<BTreeMap<Rc<str>, ProfileValue>, QueryProfileError> {
        let types = registry.types();
        let mut values = BTreeMap::new();
        for (key, entry) in &self.values {
            let path = prefix.append(key.clone());
            let field = match query_profile_type.map(|t| t.lookup(key, types)) {
                Some(FieldLookup::Found { field, .. }) => Some(field),
                Some(FieldLookup::Rejected { strict_type }) => {
                    return Err(QueryProfileError::NotDeclared {
                        path: path.to_string().into(),
                        value: entry.to_string().into(),
                        local: key.clone(),
                        type_name: strict_type.name().into(),
                    })
                }
                Some(FieldLookup::Undeclared) | None => None,
            };
            let canonical: Rc<str> = field.map_or(key.clone(), |f| f.local_name().into());
            let checked = match (field, entry) {
                (Some(f), ProfileValue::Profile(sub)) if f.field_type().is_profile() => {
                    check_profile_type(&path, f.field_type(), sub, registry)?;
                    let below = sub
                        .effective_type(registry)
                        .or_else(|| f.field_type().nested_type(types));
                    let mut sub = sub.clone();
                    sub.values = sub.revalidated(&path, below, registry)?;
                    ProfileValue::Profile(sub)
                }
                (Some(f), ProfileValue::Profile(sub)) => {
                    // a node holding both a value and sub-values cannot have a scalar type
                    return Err(QueryProfileError::type_mismatch(
                        path.to_string(),
                        sub.to_string(),
                        f.field_type().description(),
                    ));
                }
                (Some(f), other) => typed_value(&path, f.field_type(), other.clone(), registry)?,
                (None, other) => other.clone(),
            };
            values.insert(canonical, checked);
        }
        Ok(values)
    }
}

/// Checks and converts a value set on a declared field.
fn typed_value(
    path: &CompoundName,
    field_type: &FieldType,
    value: ProfileValue,
    registry: &QueryProfileRegistry,
) -> Result<ProfileValue, QueryProfileError> {
    if field_type.is_profile() {
        return match value {
            ProfileValue::Profile(p) => {
                check_profile_type(path, field_type, &p, registry)?;
                Ok(ProfileValue::Profile(p))
            }
            ProfileValue::Reference(name) | ProfileValue::Value(Value::String(name)) => {
                match registry.get(&name) {
                    Some(target) => {
                        check_profile_type(path, field_type, target, registry)?;
                        debug!("'{path}' refers to query profile '{name}'");
                        Ok(ProfileValue::Reference(name))
                    }
                    None => {
                        debug!("no query profile named '{name}' is registered; '{path}' keeps it as a string");
                        Ok(ProfileValue::Value(Value::String(name)))
                    }
                }
            }
            ProfileValue::Value(v) => Err(QueryProfileError::type_mismatch(
                path.to_string(),
                v.to_string(),
                field_type.description(),
            )),
        };
    }
    let value = match value {
        ProfileValue::Value(v) => v,
        ProfileValue::Reference(name) => Value::String(name),
        ProfileValue::Profile(p) => {
            return Err(QueryProfileError::type_mismatch(
                path.to_string(),
                p.to_string(),
                field_type.description(),
            ))
        }
    };
    if let (FieldType::Tensor(_), Value::String(s)) = (field_type, &value) {
        if embed::is_embed_literal(s) {
            // resolved with the request's embedders when read
            return Ok(ProfileValue::Value(value));
        }
    }
    match field_type.convert(&value) {
        Some(converted) => Ok(ProfileValue::Value(converted)),
        None => Err(QueryProfileError::type_mismatch_with(
            path.to_string(),
            value.to_string(),
            field_type.description(),
            field_type.mismatch_detail(&value),
        )),
    }
}

/// Checks that `profile` may be assigned to a field of `field_type`.
fn check_profile_type(
    path: &CompoundName,
    field_type: &FieldType,
    profile: &QueryProfile,
    registry: &QueryProfileRegistry,
) -> Result<(), QueryProfileError> {
    let Some(required) = field_type.required_type() else {
        return Ok(());
    };
    let types = registry.types();
    let satisfied = profile
        .effective_type(registry)
        .is_some_and(|t| t.inherits(required, types));
    if satisfied {
        Ok(())
    } else {
        Err(QueryProfileError::type_mismatch(
            path.to_string(),
            profile.to_string(),
            field_type.description(),
        ))
    }
}
