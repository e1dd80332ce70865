// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]
//! Compilation of authoring registries into immutable compiled registries.
//!
//! Types are compiled first into one shared arena. Each profile is then flattened
//! depth first: its own values, then its inherited profiles in declaration order,
//! with earlier bindings shadowing later ones. References are compiled on demand
//! and memoized; a reference back into a profile that is still being compiled is a
//! cycle.

use crate::compiled::{
    CompiledField, CompiledQueryProfile, CompiledQueryProfileRegistry, CompiledType, CompiledTypes,
    CompiledValue, TypeId,
};
use crate::compound_name::CompoundName;
use crate::error::QueryProfileError;
use crate::profile::{ProfileValue, QueryProfile};
use crate::registry::{QueryProfileRegistry, QueryProfileTypeRegistry};
use crate::types::{FieldDescription, FieldType, QueryProfileType};
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use log::{debug, info};

/// Compiles every profile of `registry`.
///
/// Fails without returning a partial registry if any reference cannot be resolved
/// or profiles reference each other in a cycle. The result shares nothing with
/// `registry`, so later authoring changes are not observed.
pub fn compile(registry: &QueryProfileRegistry) -> Result<CompiledQueryProfileRegistry, QueryProfileError> {
    let mut compiler = Compiler::new(registry)?;
    for profile in registry.profiles().iter() {
        compiler.compile_registered(profile.name())?;
    }
    info!(
        "compiled {} query profiles using {} query profile types",
        compiler.done.len(),
        compiler.types.registered()
    );
    Ok(CompiledQueryProfileRegistry::new(compiler.done, compiler.types))
}

/// Compiles a single profile, which need not be registered.
pub(crate) fn compile_profile(
    profile: &QueryProfile,
    registry: &QueryProfileRegistry,
) -> Result<Rc<CompiledQueryProfile>, QueryProfileError> {
    let mut compiler = Compiler::new(registry)?;
    compiler.compile(profile)
}

fn compile_types(types: &QueryProfileTypeRegistry) -> Result<CompiledTypes, QueryProfileError> {
    let mut out = CompiledTypes::default();
    let ids: Vec<(TypeId, &QueryProfileType)> = types
        .iter()
        .map(|t| (out.reserve(t.name().into()), t))
        .collect();
    for (id, query_profile_type) in ids {
        let compiled = compile_type(query_profile_type, types, &mut out)?;
        out.set(id, compiled);
    }
    Ok(out)
}

fn compile_type(
    query_profile_type: &QueryProfileType,
    types: &QueryProfileTypeRegistry,
    out: &mut CompiledTypes,
) -> Result<CompiledType, QueryProfileError> {
    for inherited in query_profile_type.inherited() {
        if !types.contains(inherited) {
            return Err(QueryProfileError::UnresolvedReference {
                owner: query_profile_type.name().into(),
                path: "inherits".into(),
                reference: inherited.clone(),
            });
        }
    }

    let mut compiled = CompiledType::new(query_profile_type.name().into());
    for ancestor in query_profile_type.ancestry(types) {
        compiled.ancestors.insert(ancestor.name().into());
        if ancestor.strict() && compiled.strict_type.is_none() {
            compiled.strict_type = Some(ancestor.name().into());
        }
        for field in ancestor.fields() {
            let keys: Vec<String> = field.keys().collect();
            if keys.iter().all(|k| compiled.fields.contains_key(k)) {
                continue;
            }
            let compiled_field = compile_field(ancestor, field, types, out)?;
            for key in keys {
                compiled.fields.entry(key).or_insert_with(|| compiled_field.clone());
            }
        }
    }
    Ok(compiled)
}

fn compile_field(
    owner: &QueryProfileType,
    field: &FieldDescription,
    types: &QueryProfileTypeRegistry,
    out: &mut CompiledTypes,
) -> Result<CompiledField, QueryProfileError> {
    let (field_type, nested) = match field.field_type() {
        FieldType::QueryProfileRef(name) => {
            let id = out
                .id(name)
                .ok_or_else(|| QueryProfileError::UnresolvedReference {
                    owner: owner.name().into(),
                    path: field.name().to_string().into(),
                    reference: name.clone(),
                })?;
            (field.field_type().clone(), Some(id))
        }
        FieldType::Nested(anonymous) => {
            let compiled = compile_type(anonymous, types, out)?;
            (FieldType::QueryProfile, Some(out.push(compiled)))
        }
        other => (other.clone(), None),
    };
    Ok(CompiledField {
        name: field.local_name().into(),
        field_type,
        nested,
    })
}

#[derive(Default)]
struct Flattened {
    entries: BTreeMap<CompoundName, CompiledValue>,
    types: BTreeMap<CompoundName, TypeId>,
    /// Profiles bound by reference, by name. Bindings met later below them are hidden
    /// where the referenced profile resolves the same path.
    references: Vec<(CompoundName, Rc<CompiledQueryProfile>)>,
}

impl Flattened {
    fn resolved_by_reference(&self, name: &CompoundName) -> Option<CompiledValue> {
        self.references
            .iter()
            .filter(|(at, _)| name.len() > at.len() && name.starts_with(at))
            .find_map(|(at, profile)| profile.lookup_canonical(&name.suffix(at.len())))
    }

    fn insert(&mut self, name: CompoundName, value: &Value) {
        if self.entries.contains_key(&name) {
            return;
        }
        if self.resolved_by_reference(&name).and_then(|v| v.value()).is_none() {
            self.entries.insert(name, CompiledValue::Value(value.clone()));
        }
    }

    fn insert_type(&mut self, name: &CompoundName, id: TypeId) {
        let hidden =
            self.references.iter().any(|(at, _)| at == name) || self.resolved_by_reference(name).is_some();
        if !hidden {
            self.types.entry(name.clone()).or_insert(id);
        }
    }
}

struct Compiler<'r> {
    registry: &'r QueryProfileRegistry,
    types: Rc<CompiledTypes>,
    done: BTreeMap<Rc<str>, Rc<CompiledQueryProfile>>,
    // profiles being flattened, outermost first
    visiting: Vec<Rc<str>>,
}

impl<'r> Compiler<'r> {
    fn new(registry: &'r QueryProfileRegistry) -> Result<Self, QueryProfileError> {
        Ok(Self {
            registry,
            types: Rc::new(compile_types(registry.types())?),
            done: BTreeMap::new(),
            visiting: vec![],
        })
    }

    fn compile_registered(&mut self, name: &str) -> Result<Rc<CompiledQueryProfile>, QueryProfileError> {
        if let Some(compiled) = self.done.get(name) {
            return Ok(compiled.clone());
        }
        let registry = self.registry;
        let profile = registry
            .get(name)
            .ok_or_else(|| QueryProfileError::UnknownProfile(name.into()))?;
        let compiled = self.compile(profile)?;
        self.done.insert(name.into(), compiled.clone());
        Ok(compiled)
    }

    fn compile(&mut self, profile: &QueryProfile) -> Result<Rc<CompiledQueryProfile>, QueryProfileError> {
        let mut flat = Flattened::default();
        self.enter(profile.name())?;
        let result = self.flatten(profile, &CompoundName::root(), &mut flat);
        self.visiting.pop();
        result?;

        Ok(Rc::new(CompiledQueryProfile {
            name: profile.name().into(),
            type_id: flat.types.get(&CompoundName::root()).copied(),
            entries: flat.entries,
            types: flat.types,
            type_system: self.types.clone(),
        }))
    }

    fn enter(&mut self, name: &str) -> Result<(), QueryProfileError> {
        if self.visiting.iter().any(|v| v.as_ref() == name) {
            let mut chain: Vec<&str> = self.visiting.iter().map(|v| v.as_ref()).collect();
            chain.push(name);
            return Err(QueryProfileError::CyclicReference {
                chain: chain.join(" -> ").into(),
            });
        }
        self.visiting.push(name.into());
        Ok(())
    }

    fn flatten(
        &mut self,
        profile: &QueryProfile,
        prefix: &CompoundName,
        flat: &mut Flattened,
    ) -> Result<(), QueryProfileError> {
        if let Some(type_name) = profile.type_name() {
            let id = self
                .types
                .id(type_name)
                .ok_or_else(|| QueryProfileError::UnresolvedReference {
                    owner: profile.name().into(),
                    path: prefix.to_string().into(),
                    reference: type_name.into(),
                })?;
            flat.insert_type(prefix, id);
        }
        if let Some(value) = profile.value() {
            flat.insert(prefix.clone(), value);
        }

        for (key, entry) in profile.values() {
            let path = prefix.append(key.clone());
            match entry {
                ProfileValue::Value(value) => flat.insert(path, value),
                ProfileValue::Reference(target) => {
                    if flat.entries.contains_key(&path) || flat.resolved_by_reference(&path).is_some() {
                        continue;
                    }
                    let registry = self.registry;
                    if !registry.contains(target) {
                        return Err(QueryProfileError::UnresolvedReference {
                            owner: profile.name().into(),
                            path: path.to_string().into(),
                            reference: target.clone(),
                        });
                    }
                    debug!("resolving '{path}' in '{}' to query profile '{target}'", profile.name());
                    let compiled = self.compile_registered(target)?;
                    flat.references.push((path.clone(), compiled.clone()));
                    flat.entries.insert(path, CompiledValue::Profile(compiled));
                }
                ProfileValue::Profile(nested) => self.flatten(nested, &path, flat)?,
            }
        }

        let registry = self.registry;
        for inherited in profile.inherited() {
            let parent = registry
                .get(inherited)
                .ok_or_else(|| QueryProfileError::UnresolvedReference {
                    owner: profile.name().into(),
                    path: if prefix.is_root() {
                        "inherits".into()
                    } else {
                        prefix.to_string().into()
                    },
                    reference: inherited.clone(),
                })?;
            self.enter(inherited)?;
            let result = self.flatten(parent, prefix, flat);
            self.visiting.pop();
            result?;
        }
        Ok(())
    }
}
