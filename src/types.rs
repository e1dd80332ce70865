// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

//! Query profile types: named sets of typed fields with multiple inheritance.

mod field;
mod field_type;

#[cfg(test)]
mod tests {
    mod field_type;
    mod lookup;
}

pub use field::FieldDescription;
pub use field_type::FieldType;
pub use crate::registry::QueryProfileTypeRegistry;

use crate::error::QueryProfileError;
use crate::registry::Named;
use crate::utils::{find_first, linearize};
use crate::Rc;

use std::collections::BTreeMap;

/// Outcome of looking up a key in a type and its ancestors.
#[derive(Debug)]
pub enum FieldLookup<'a> {
    /// The key names a field, declared by `owner`.
    Found {
        field: &'a FieldDescription,
        owner: &'a QueryProfileType,
    },
    /// No field has that name and no type in the chain is strict.
    Undeclared,
    /// No field has that name and `strict_type` forbids undeclared keys.
    Rejected { strict_type: &'a QueryProfileType },
}

/// A named set of field declarations.
///
/// Field names and aliases match case-insensitively. Lookups consult the type's own
/// fields, then its inherited types in declaration order; the first match wins.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryProfileType {
    name: Rc<str>,
    strict: bool,
    inherited: Vec<Rc<str>>,
    fields: Vec<FieldDescription>,
    // lowercased name or alias -> index into `fields`
    index: BTreeMap<String, usize>,
}

impl Named for QueryProfileType {
    fn name(&self) -> &str {
        &self.name
    }
}

impl QueryProfileType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            strict: false,
            inherited: vec![],
            fields: vec![],
            index: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets this type's own strict flag. Strictness is also inherited.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// This type's own strict flag, ignoring inherited types.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Appends a type to inherit from. Inherited types are consulted in the order added.
    pub fn add_inherited(&mut self, type_name: &str) {
        self.inherited.push(type_name.into());
    }

    pub fn inherited(&self) -> &[Rc<str>] {
        &self.inherited
    }

    /// Fields declared by this type itself.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Declares a field.
    ///
    /// Fails if the field's name or one of its aliases is already used by a field of
    /// this type. A dotted name declares its leading segments as nested fields whose
    /// anonymous types are extended by later declarations sharing the prefix.
    pub fn add_field(&mut self, field: FieldDescription) -> Result<(), QueryProfileError> {
        if field.name().len() > 1 {
            let head = field.name().first().unwrap_or_default().to_string();
            let rest = field.strip_prefix(1);
            if let Some(&i) = self.index.get(&head.to_lowercase()) {
                if let FieldType::Nested(nested) = self.fields[i].field_type_mut() {
                    return nested.add_field(rest);
                }
                return Err(self.duplicate(&head));
            }
            let mut nested = QueryProfileType::new(&format!("{}.{head}", self.name));
            nested.add_field(rest)?;
            let holder = FieldDescription::new(&head, FieldType::Nested(Box::new(nested)))?;
            return self.insert(holder);
        }
        self.insert(field)
    }

    fn insert(&mut self, field: FieldDescription) -> Result<(), QueryProfileError> {
        let keys: Vec<String> = field.keys().collect();
        for (i, key) in keys.iter().enumerate() {
            if self.index.contains_key(key) || keys[..i].contains(key) {
                return Err(self.duplicate(key));
            }
        }
        let position = self.fields.len();
        self.fields.push(field);
        for key in keys {
            self.index.insert(key, position);
        }
        Ok(())
    }

    fn duplicate(&self, name: &str) -> QueryProfileError {
        QueryProfileError::DuplicateField {
            name: name.into(),
            type_name: self.name.clone(),
        }
    }

    /// A field declared by this type itself, by name or alias.
    pub fn own_field(&self, name: &str) -> Option<&FieldDescription> {
        self.index
            .get(&name.to_lowercase())
            .and_then(|&i| self.fields.get(i))
    }

    fn parents<'a>(&'a self, types: &'a QueryProfileTypeRegistry) -> Vec<&'a QueryProfileType> {
        self.inherited.iter().filter_map(|n| types.get(n)).collect()
    }

    /// Finds a field by name or alias in this type and its ancestors, returning it
    /// together with the type that declares it.
    pub fn field<'a>(
        &'a self,
        name: &str,
        types: &'a QueryProfileTypeRegistry,
    ) -> Option<(&'a FieldDescription, &'a QueryProfileType)> {
        find_first(
            self,
            |t| t.parents(types),
            |t| t.own_field(name).map(|f| (f, t)),
        )
    }

    /// The nearest strict type among this type and its ancestors.
    pub fn strict_type<'a>(&'a self, types: &'a QueryProfileTypeRegistry) -> Option<&'a QueryProfileType> {
        find_first(self, |t| t.parents(types), |t| t.strict.then_some(t))
    }

    /// True if this type or any ancestor is strict.
    pub fn is_strict(&self, types: &QueryProfileTypeRegistry) -> bool {
        self.strict_type(types).is_some()
    }

    /// Looks up `name`, reporting whether strictness rejects it when undeclared.
    pub fn lookup<'a>(&'a self, name: &str, types: &'a QueryProfileTypeRegistry) -> FieldLookup<'a> {
        if let Some((field, owner)) = self.field(name, types) {
            return FieldLookup::Found { field, owner };
        }
        match self.strict_type(types) {
            Some(strict_type) => FieldLookup::Rejected { strict_type },
            None => FieldLookup::Undeclared,
        }
    }

    /// True if this type is `type_name` or inherits it.
    pub fn inherits(&self, type_name: &str, types: &QueryProfileTypeRegistry) -> bool {
        find_first(
            self,
            |t| t.parents(types),
            |t| (t.name.as_ref() == type_name).then_some(()),
        )
        .is_some()
    }

    /// This type followed by all its ancestors, in lookup order.
    pub fn ancestry<'a>(&'a self, types: &'a QueryProfileTypeRegistry) -> Vec<&'a QueryProfileType> {
        linearize(self, |t| t.parents(types))
    }
}
