// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared fixtures for profile tests.

use crate::*;
use anyhow::Result;

/// Declares the fields shared by `testtype` and `testtypeStrict`.
fn declare_fields(t: &mut QueryProfileType, types: &QueryProfileTypeRegistry) -> Result<()> {
    let fields = [
        ("myString", "string"),
        ("myInteger", "integer"),
        ("myLong", "long"),
        ("myFloat", "float"),
        ("myDouble", "double"),
        ("myBoolean", "boolean"),
        ("myQueryProfile", "query-profile"),
        ("myUserQueryProfile", "query-profile:user"),
        ("myQuery", "query"),
        ("myTensor", "tensor(a{},b{})"),
    ];
    for (name, field_type) in fields {
        let mut field = FieldDescription::parse(name, field_type, types)?;
        if name == "myInteger" {
            field = field.with_alias("int");
        }
        t.add_field(field)?;
    }
    Ok(())
}

/// A registry with the types `user`, `testtype` and the strict `testtypeStrict`.
pub fn registry() -> Result<QueryProfileRegistry> {
    let mut registry = QueryProfileRegistry::new();

    let mut user = QueryProfileType::new("user");
    user.add_field(FieldDescription::new("myUserString", FieldType::String)?)?;
    user.add_field(FieldDescription::new("myUserInteger", FieldType::Integer)?)?;
    registry.register_type(user)?;

    let mut testtype = QueryProfileType::new("testtype");
    declare_fields(&mut testtype, registry.types())?;
    registry.register_type(testtype)?;

    let mut strict = QueryProfileType::new("testtypeStrict");
    strict.set_strict(true);
    declare_fields(&mut strict, registry.types())?;
    registry.register_type(strict)?;

    Ok(registry)
}

/// Registers a profile of the given type.
pub fn add_profile(registry: &mut QueryProfileRegistry, name: &str, type_name: Option<&str>) -> Result<()> {
    let mut profile = QueryProfile::new(name);
    if let Some(t) = type_name {
        profile.set_type(t, registry)?;
    }
    registry.register(profile)?;
    Ok(())
}

/// Asserts that `result` failed with exactly `message`.
pub fn assert_error<T: core::fmt::Debug>(result: Result<T, QueryProfileError>, message: &str) {
    match result {
        Ok(v) => panic!("expected `{message}`, got {v:?}"),
        Err(e) => assert_eq!(e.to_string(), message),
    }
}
