// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

use crate::compiled::{CompiledQueryProfile, CompiledQueryProfileRegistry, CompiledValue, Walk};
use crate::compound_name::CompoundName;
use crate::embed::{self, Embedders, Language};
use crate::error::QueryProfileError;
use crate::types::FieldType;
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use log::debug;

/// Request-time view of a compiled profile.
///
/// Values set here are validated against the compiled types and kept in a
/// per-request overlay; the compiled profile is shared and never modified.
/// Reads consult the overlay, then profiles bound by name during the request,
/// then the compiled profile.
#[derive(Clone)]
pub struct QueryProfileProperties {
    profile: Rc<CompiledQueryProfile>,
    registry: Option<CompiledQueryProfileRegistry>,
    values: BTreeMap<CompoundName, Value>,
    // profiles bound to a name during this request, latest last
    references: Vec<(CompoundName, Rc<CompiledQueryProfile>)>,
    embedders: Embedders,
    language: Language,
}

impl core::fmt::Debug for QueryProfileProperties {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryProfileProperties")
            .field("profile", &self.profile.name())
            .field("values", &self.values)
            .field("references", &self.references.iter().map(|(k, p)| (k, p.name())).collect::<Vec<_>>())
            .field("embedders", &self.embedders.keys().collect::<Vec<_>>())
            .field("language", &self.language)
            .finish()
    }
}

impl QueryProfileProperties {
    pub fn new(profile: Rc<CompiledQueryProfile>) -> Self {
        Self {
            profile,
            registry: None,
            values: BTreeMap::new(),
            references: vec![],
            embedders: Embedders::new(),
            language: Language::Unknown,
        }
    }

    /// The registry used to resolve profile names set on profile-typed fields.
    pub fn with_registry(mut self, registry: CompiledQueryProfileRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The embedders available to `embed(...)` literals.
    pub fn with_embedders(mut self, embedders: Embedders) -> Self {
        self.embedders = embedders;
        self
    }

    /// The language passed to embedders.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn profile(&self) -> &Rc<CompiledQueryProfile> {
        &self.profile
    }

    fn walk<'a>(&'a self, name: &CompoundName) -> Walk<'a> {
        let bound = |prefix: &CompoundName| {
            self.references
                .iter()
                .rev()
                .find(|(at, _)| at == prefix)
                .map(|(_, p)| p.as_ref())
        };
        self.profile.walk(name, &bound)
    }

    /// Sets a value for this request.
    ///
    /// Fails with the same errors as setting the value on the profile while
    /// authoring. An `embed(...)` literal set on a tensor field is embedded now.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), QueryProfileError> {
        let name = CompoundName::parse(path)?;
        if name.is_root() {
            return Err(QueryProfileError::InvalidName {
                name: path.into(),
                reason: "values must be set below the profile root".into(),
            });
        }
        let value = value.into();
        let walk = self.walk(&name);
        if let Some((i, strict_type)) = walk.rejected() {
            return Err(QueryProfileError::NotDeclared {
                path: path.into(),
                value: value.to_string().into(),
                local: name.get(i).unwrap_or_default().into(),
                type_name: strict_type.clone(),
            });
        }
        let inner = &walk.fields[..walk.fields.len() - 1];
        for (i, field) in inner.iter().enumerate() {
            if let Some(f) = field.filter(|f| !f.field_type.is_profile()) {
                let description = f.field_type.description();
                return Err(QueryProfileError::type_mismatch_with(
                    path,
                    value.to_string(),
                    description.clone(),
                    format!("'{}' is a {description}, not a query profile", name.get(i).unwrap_or_default()),
                ));
            }
        }
        let canonical = walk.canonical.clone();
        let field_type = walk.field().map(|f| f.field_type.clone());

        let Some(field_type) = field_type else {
            self.values.insert(canonical, value);
            return Ok(());
        };

        if field_type.is_profile() {
            return self.bind(path, canonical, &field_type, value);
        }

        let converted = match (&field_type, &value) {
            (FieldType::Tensor(tensor_type), Value::String(s)) if embed::is_embed_literal(s) => {
                let tensor = embed::resolve(s, path, tensor_type, &self.embedders, &self.language)
                    .map_err(|source| QueryProfileError::Embed {
                        path: path.into(),
                        value: s.clone(),
                        source,
                    })?;
                Value::from(tensor)
            }
            _ => field_type.convert(&value).ok_or_else(|| {
                QueryProfileError::type_mismatch_with(
                    path,
                    value.to_string(),
                    field_type.description(),
                    field_type.mismatch_detail(&value),
                )
            })?,
        };
        self.values.insert(canonical, converted);
        Ok(())
    }

    /// Binds the profile named by `value` at a profile-typed name.
    fn bind(
        &mut self,
        path: &str,
        canonical: CompoundName,
        field_type: &FieldType,
        value: Value,
    ) -> Result<(), QueryProfileError> {
        let Value::String(target) = value else {
            return Err(QueryProfileError::type_mismatch(
                path,
                value.to_string(),
                field_type.description(),
            ));
        };
        let Some(profile) = self.registry.as_ref().and_then(|r| r.get(&target)) else {
            debug!("no compiled query profile named '{target}'; '{path}' keeps it as a string");
            self.values.insert(canonical, Value::String(target));
            return Ok(());
        };
        if let Some(required) = field_type.required_type() {
            if !profile.root_type().is_some_and(|t| t.inherits(required)) {
                return Err(QueryProfileError::type_mismatch(
                    path,
                    format!("query profile '{target}'"),
                    field_type.description(),
                ));
            }
        }
        debug!("binding '{path}' to query profile '{target}'");
        self.values.retain(|name, _| !name.starts_with(&canonical));
        self.references.push((canonical, profile));
        Ok(())
    }

    /// Reads a value, resolving `embed(...)` literals stored on tensor fields.
    ///
    /// Returns `Ok(None)` for names that hold nothing, and for malformed names.
    pub fn get(&self, path: &str) -> Result<Option<Value>, QueryProfileError> {
        let Ok(name) = CompoundName::parse(path) else {
            return Ok(None);
        };
        let walk = self.walk(&name);
        let value = self.resolve(&walk.canonical);
        match (value, walk.field().map(|f| &f.field_type)) {
            (Some(Value::String(s)), Some(FieldType::Tensor(tensor_type))) if embed::is_embed_literal(&s) => {
                let tensor = embed::resolve(&s, path, tensor_type, &self.embedders, &self.language)
                    .map_err(|source| QueryProfileError::EmbedOnRead {
                        path: path.into(),
                        value: s.clone(),
                        source,
                    })?;
                Ok(Some(Value::from(tensor)))
            }
            (value, _) => Ok(value),
        }
    }

    fn resolve(&self, name: &CompoundName) -> Option<Value> {
        if let Some(v) = self.values.get(name) {
            return Some(v.clone());
        }
        if let Some((at, profile)) = self.references.iter().rev().find(|(at, _)| name.starts_with(at)) {
            return profile
                .lookup_canonical(&name.suffix(at.len()))
                .and_then(|v| v.value());
        }
        self.profile.lookup_canonical(name).and_then(|v| v.value())
    }

    /// Reads what the compiled profile holds at a name, ignoring this request's changes.
    pub fn get_compiled(&self, path: &str) -> Option<CompiledValue> {
        self.profile.lookup(path)
    }

    /// All values visible below `prefix`, keyed by their names relative to it.
    ///
    /// Each name resolves as in [`QueryProfileProperties::get`]: values set in this
    /// request first, then bound profiles, then the compiled profile. `embed(...)`
    /// literals are listed as stored.
    pub fn list_properties(&self, prefix: &str) -> Result<BTreeMap<String, Value>, QueryProfileError> {
        let prefix = CompoundName::parse(prefix)?;
        let prefix = self.walk(&prefix).canonical;

        let mut candidates = BTreeMap::new();
        self.profile.collect(&prefix, &CompoundName::root(), &mut candidates);
        for (at, profile) in &self.references {
            if at.starts_with(&prefix) {
                profile.collect(&CompoundName::root(), &at.suffix(prefix.len()), &mut candidates);
            } else if prefix.starts_with(at) {
                profile.collect(&prefix.suffix(at.len()), &CompoundName::root(), &mut candidates);
            }
        }
        let mut names: Vec<CompoundName> = candidates
            .keys()
            .filter_map(|key| CompoundName::parse(key).ok())
            .map(|relative| prefix.concat(&relative))
            .collect();
        names.extend(
            self.values
                .keys()
                .filter(|name| name.starts_with(&prefix) && name.len() > prefix.len())
                .cloned(),
        );

        let mut out = BTreeMap::new();
        for name in names {
            if let Some(value) = self.resolve(&name) {
                out.insert(name.suffix(prefix.len()).to_string(), value);
            }
        }
        Ok(out)
    }
}
