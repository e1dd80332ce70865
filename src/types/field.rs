// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::compound_name::CompoundName;
use crate::error::QueryProfileError;
use crate::registry::QueryProfileTypeRegistry;
use crate::types::FieldType;
use crate::Rc;

/// A field declared by a query profile type.
///
/// The name may be dotted (`ranking.features.query(q)`); the declaring type then
/// holds the leading segments as nested anonymous types.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescription {
    name: CompoundName,
    field_type: FieldType,
    aliases: Vec<Rc<str>>,
}

impl FieldDescription {
    pub fn new(name: &str, field_type: FieldType) -> Result<Self, QueryProfileError> {
        let name = CompoundName::parse(name)?;
        if name.is_root() {
            return Err(QueryProfileError::InvalidName {
                name: "".into(),
                reason: "a field needs a name".into(),
            });
        }
        Ok(Self {
            name,
            field_type,
            aliases: vec![],
        })
    }

    /// Declares a field from the textual form of its type.
    pub fn parse(
        name: &str,
        field_type: &str,
        types: &QueryProfileTypeRegistry,
    ) -> Result<Self, QueryProfileError> {
        Self::new(name, FieldType::parse(field_type, types)?)
    }

    /// Adds an alias. Aliases address the field like its name does.
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn name(&self) -> &CompoundName {
        &self.name
    }

    /// The last segment of the name.
    pub fn local_name(&self) -> &str {
        self.name.last().unwrap_or_default()
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub(crate) fn field_type_mut(&mut self) -> &mut FieldType {
        &mut self.field_type
    }

    pub fn aliases(&self) -> &[Rc<str>] {
        &self.aliases
    }

    /// Name and aliases, lowercased, as matched by lookups.
    pub(crate) fn keys(&self) -> impl Iterator<Item = String> + '_ {
        core::iter::once(self.local_name())
            .chain(self.aliases.iter().map(|a| a.as_ref()))
            .map(str::to_lowercase)
    }

    /// This field with the first `n` name segments dropped.
    pub(crate) fn strip_prefix(&self, n: usize) -> Self {
        Self {
            name: self.name.suffix(n),
            field_type: self.field_type.clone(),
            aliases: self.aliases.clone(),
        }
    }
}
