// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{anyhow, bail, Result};
use query_profiles::*;
use serde::{Deserialize, Serialize};
use std::env;
use test_generator::test_resources;

#[derive(Serialize, Deserialize, Debug)]
struct FieldDecl {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    alias: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct TypeDecl {
    name: String,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    inherits: Vec<String>,
    #[serde(default)]
    fields: Vec<FieldDecl>,
}

/// A write: a value, or a reference to a registered profile.
#[derive(Serialize, Deserialize, Debug)]
struct Assignment {
    path: String,
    value: Option<Value>,
    reference: Option<String>,
    error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct ProfileDecl {
    name: String,
    #[serde(rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    inherits: Vec<String>,
    #[serde(default)]
    values: Vec<Assignment>,
}

/// An expected read. `value` compares values, `text` compares the displayed value,
/// `tensor` compares with a tensor literal, and none of them expects nothing.
#[derive(Serialize, Deserialize, Debug)]
struct Expectation {
    path: String,
    value: Option<Value>,
    text: Option<String>,
    tensor: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Case {
    note: String,
    profile: String,
    #[serde(default)]
    set: Vec<Assignment>,
    #[serde(default)]
    get: Vec<Expectation>,
}

#[derive(Serialize, Deserialize, Debug)]
struct YamlTest {
    #[serde(default)]
    types: Vec<TypeDecl>,
    #[serde(default)]
    profiles: Vec<ProfileDecl>,
    compile_error: Option<String>,
    #[serde(default)]
    cases: Vec<Case>,
}

fn check_error(result: Result<(), QueryProfileError>, expected: &Option<String>, what: &str) -> Result<()> {
    match (result, expected) {
        (Ok(()), None) => Ok(()),
        (Ok(()), Some(e)) => bail!("{what} succeeded, expected error containing `{e}`"),
        (Err(actual), Some(e)) if actual.to_string().contains(e.as_str()) => Ok(()),
        (Err(actual), Some(e)) => bail!("{what}: error\n`{actual}`\ndoes not contain `{e}`"),
        (Err(actual), None) => bail!("{what} failed: {actual}"),
    }
}

fn build_registry(test: &YamlTest) -> Result<QueryProfileRegistry> {
    let mut registry = QueryProfileRegistry::new();
    // register all types first so that fields may refer to any of them
    for decl in &test.types {
        let mut t = QueryProfileType::new(&decl.name);
        t.set_strict(decl.strict);
        for inherited in &decl.inherits {
            t.add_inherited(inherited);
        }
        registry.register_type(t)?;
    }
    for decl in &test.types {
        let mut fields = vec![];
        for f in &decl.fields {
            let mut field = FieldDescription::parse(&f.name, &f.field_type, registry.types())?;
            if let Some(alias) = &f.alias {
                field = field.with_alias(alias);
            }
            fields.push(field);
        }
        let t = registry
            .types_mut()
            .get_mut(&decl.name)
            .ok_or_else(|| anyhow!("type {} vanished", decl.name))?;
        for field in fields {
            t.add_field(field)?;
        }
    }

    for decl in &test.profiles {
        registry.register(QueryProfile::new(&decl.name))?;
        for inherited in &decl.inherits {
            if let Some(p) = registry.get_mut(&decl.name) {
                p.add_inherited(inherited);
            }
        }
        if let Some(type_name) = &decl.type_name {
            registry.set_type(&decl.name, type_name)?;
        }
    }
    for decl in &test.profiles {
        for a in &decl.values {
            let value: ProfileValue = match (&a.value, &a.reference) {
                (_, Some(r)) => ProfileValue::Reference(r.as_str().into()),
                (Some(v), None) => v.clone().into(),
                (None, None) => bail!("{}: assignment to {} has no value", decl.name, a.path),
            };
            let result = registry.set(&decl.name, &a.path, value);
            check_error(result, &a.error, &format!("{}: set {}", decl.name, a.path))?;
        }
    }
    Ok(registry)
}

fn check_read(actual: Option<Value>, expected: &Expectation) -> Result<()> {
    match (&expected.value, &expected.text, &expected.tensor) {
        (Some(v), _, _) => assert_eq!(actual.as_ref(), Some(v), "{}", expected.path),
        (_, Some(t), _) => assert_eq!(
            actual.map(|a| a.to_string()).as_deref(),
            Some(t.as_str()),
            "{}",
            expected.path
        ),
        (_, _, Some(literal)) => {
            let tensor = Tensor::parse(literal, None)?;
            assert_eq!(actual, Some(Value::from(tensor)), "{}", expected.path);
        }
        (None, None, None) => assert_eq!(actual, None, "{}", expected.path),
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {file}");
    let yaml = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml)?;

    let registry = build_registry(&test)?;
    let compiled = match (registry.compile(), &test.compile_error) {
        (Ok(c), None) => c,
        (Ok(_), Some(e)) => bail!("compilation succeeded, expected error containing `{e}`"),
        (Err(actual), Some(e)) if actual.to_string().contains(e.as_str()) => {
            println!("compile error as expected");
            return Ok(());
        }
        (Err(actual), Some(e)) => bail!("compile error\n`{actual}`\ndoes not contain `{e}`"),
        (Err(actual), None) => return Err(actual.into()),
    };

    for case in &test.cases {
        print!("case {} ", case.note);
        let mut properties = compiled
            .properties(&case.profile)
            .ok_or_else(|| anyhow!("no compiled profile {}", case.profile))?;
        for a in &case.set {
            let value = a
                .value
                .clone()
                .or_else(|| a.reference.as_deref().map(Value::from))
                .ok_or_else(|| anyhow!("set {} has no value", a.path))?;
            let result = properties.set(&a.path, value);
            check_error(result, &a.error, &format!("set {}", a.path))?;
        }
        for expected in &case.get {
            check_read(properties.get(&expected.path)?, expected)?;
        }
        println!("passed");
    }
    println!("{} cases passed.", test.cases.len());
    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test]
#[ignore = "intended for running a single yaml file"]
fn one_yaml() -> Result<()> {
    let mut file = String::default();
    for a in env::args() {
        if a.ends_with(".yaml") {
            file = a;
            break;
        }
    }

    if file.is_empty() {
        bail!("missing yaml test file");
    }

    yaml_test(file.as_str())
}

#[test_resources("tests/profiles/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
