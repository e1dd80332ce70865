// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::common::{add_profile, assert_error, registry};
use crate::*;
use anyhow::{anyhow, Result};

use std::collections::BTreeMap;

/// Embeds `text` as the single cell `{a:text, b:language}`.
struct Labeler;

impl Embedder for Labeler {
    fn embed(&self, text: &str, context: &EmbedContext, tensor_type: &TensorType) -> Result<Tensor> {
        Tensor::from_cells(
            tensor_type.clone(),
            [(vec![("a", text), ("b", context.language.tag())], 1.0)],
        )
    }
}

fn labeler() -> Embedders {
    let mut embedders = Embedders::new();
    embedders.insert("labeler".to_string(), Rc::new(Labeler) as Rc<dyn Embedder>);
    embedders
}

/// `test` is typed `testtype`; `myProfile`, `otherProfile` and `newUser` are
/// available for binding.
fn compiled() -> Result<CompiledQueryProfileRegistry> {
    let mut r = registry()?;
    add_profile(&mut r, "test", Some("testtype"))?;
    add_profile(&mut r, "strict", Some("testtypeStrict"))?;
    add_profile(&mut r, "myProfile", None)?;
    add_profile(&mut r, "otherProfile", None)?;
    add_profile(&mut r, "newUser", Some("user"))?;

    r.set("myProfile", "anyString", "x")?;
    r.set("otherProfile", "other", "o")?;
    r.set("newUser", "myUserString", "newUserValue")?;
    r.set("test", "myInteger", 1)?;
    r.set("test", "myQueryProfile", "myProfile")?;
    r.set("test", "map.a", 1)?;
    r.set("test", "map.b", 2)?;
    r.set("test", "myTensor", "embed(stored)")?;
    Ok(r.compile()?)
}

fn properties(name: &str) -> Result<QueryProfileProperties> {
    compiled()?
        .properties(name)
        .ok_or_else(|| anyhow!("no profile {name}"))
}

#[test]
fn request_values_override_compiled_ones() -> Result<()> {
    let compiled = compiled()?;
    let mut p = compiled
        .properties("test")
        .ok_or_else(|| anyhow!("no test"))?;

    assert_eq!(p.get("myInteger")?, Some(Value::from(1)));
    p.set("int", "7")?;
    assert_eq!(p.get("myInteger")?, Some(Value::from(7)));
    assert_eq!(p.get("INT")?, Some(Value::from(7)));
    p.set("anything", "goes")?;
    assert_eq!(p.get("anything")?, Some("goes".into()));

    // the compiled profile is shared and unchanged
    assert_eq!(p.get_compiled("myInteger"), Some(CompiledValue::Value(Value::from(1))));
    let test = compiled.get("test").ok_or_else(|| anyhow!("no test"))?;
    assert_eq!(test.get("myInteger"), Some(Value::from(1)));
    assert_eq!(test.get("anything"), None);
    Ok(())
}

#[test]
fn request_values_are_validated() -> Result<()> {
    let mut p = properties("test")?;
    assert_error(
        p.set("myInteger", "notAnInteger"),
        "Could not set 'myInteger' to 'notAnInteger': 'notAnInteger' is not a integer",
    );
    let err = p
        .set("myTensor", Tensor::parse("tensor(x{}):{a:1.0}", None)?)
        .unwrap_err();
    assert!(
        err.to_string()
            .ends_with(": Require a tensor of type tensor(a{},b{})"),
        "{err}"
    );
    assert!(matches!(p.set("", 1), Err(QueryProfileError::InvalidName { .. })));

    let mut strict = properties("strict")?;
    assert_error(
        strict.set("undeclared", "x"),
        "Could not set 'undeclared' to 'x': 'undeclared' is not declared in query profile type 'testtypeStrict', and the type is strict",
    );
    Ok(())
}

#[test]
fn profile_names_bind_at_request_time() -> Result<()> {
    let mut p = properties("test")?;

    p.set("myUserQueryProfile", "newUser")?;
    assert_eq!(p.get("myUserQueryProfile.myUserString")?, Some("newUserValue".into()));

    // the bound profile's type applies below it
    p.set("myUserQueryProfile.myUserInteger", "1337")?;
    assert_eq!(p.get("myUserQueryProfile.myUserInteger")?, Some(Value::from(1337)));
    assert!(p.set("myUserQueryProfile.myUserInteger", "notAnInteger").is_err());

    let err = p.set("myUserQueryProfile", "myProfile").unwrap_err();
    assert!(
        err.to_string()
            .ends_with("is not a reference to a query profile of type 'user'"),
        "{err}"
    );
    Ok(())
}

#[test]
fn bound_profiles_shadow_the_compiled_one() -> Result<()> {
    let mut p = properties("test")?;
    assert_eq!(p.get("myQueryProfile.anyString")?, Some("x".into()));

    p.set("myQueryProfile", "otherProfile")?;
    assert_eq!(p.get("myQueryProfile.anyString")?, None);
    assert_eq!(p.get("myQueryProfile.other")?, Some("o".into()));

    p.set("myQueryProfile.more", "m")?;
    assert_eq!(p.get("myQueryProfile.more")?, Some("m".into()));

    // rebinding drops what was set below the previous binding
    p.set("myQueryProfile", "myProfile")?;
    assert_eq!(p.get("myQueryProfile.more")?, None);
    assert_eq!(p.get("myQueryProfile.anyString")?, Some("x".into()));
    Ok(())
}

#[test]
fn unknown_profile_names_are_kept_as_strings() -> Result<()> {
    let mut p = properties("test")?;
    p.set("myQueryProfile", "nonexistent")?;
    assert_eq!(p.get("myQueryProfile")?, Some("nonexistent".into()));
    assert_error(
        p.set("myQueryProfile", 3),
        "Could not set 'myQueryProfile' to '3': '3' is not a reference to a query profile",
    );
    Ok(())
}

#[test]
fn embedding_literals_use_the_request_embedders() -> Result<()> {
    let mut p = properties("test")?
        .with_embedders(labeler())
        .with_language(Language::from_tag("EN"));

    let Some(Value::Tensor(stored)) = p.get("myTensor")? else {
        panic!("stored literal was not embedded");
    };
    assert_eq!(stored.get(&["stored", "en"]), Some(1.0));

    p.set("myTensor", "embed(labeler, \"fresh text\")")?;
    let Some(Value::Tensor(fresh)) = p.get("myTensor")? else {
        panic!("literal was not embedded");
    };
    assert_eq!(fresh.get(&["fresh text", "en"]), Some(1.0));

    p.set_language(Language::Unknown);
    p.set("myTensor", "embed('again')")?;
    let Some(Value::Tensor(again)) = p.get("myTensor")? else {
        panic!("literal was not embedded");
    };
    assert_eq!(again.get(&["again", "un"]), Some(1.0));
    Ok(())
}

#[test]
fn embedding_without_embedders_fails() -> Result<()> {
    let mut p = properties("test")?;
    assert_error(
        p.get("myTensor"),
        "Could not resolve 'embed(stored)' at 'myTensor': No embedders provided",
    );
    assert!(matches!(
        p.get("myTensor"),
        Err(QueryProfileError::EmbedOnRead {
            source: EmbedError::NoEmbedders,
            ..
        })
    ));
    assert!(matches!(
        p.set("myTensor", "embed(text)"),
        Err(QueryProfileError::Embed {
            source: EmbedError::NoEmbedders,
            ..
        })
    ));
    Ok(())
}

#[test]
fn listing_merges_all_layers() -> Result<()> {
    let mut p = properties("test")?;
    p.set("map.c", 3)?;
    p.set("map.a", 10)?;

    let listed = p.list_properties("map")?;
    let expected: BTreeMap<String, Value> = [
        ("a".to_string(), Value::from(10)),
        ("b".to_string(), Value::from(2)),
        ("c".to_string(), Value::from(3)),
    ]
    .into_iter()
    .collect();
    assert_eq!(listed, expected);

    let all = p.list_properties("")?;
    assert_eq!(all.get("myQueryProfile.anyString"), Some(&"x".into()));
    assert_eq!(all.get("myInteger"), Some(&Value::from(1)));
    assert_eq!(all.get("map.c"), Some(&Value::from(3)));
    Ok(())
}
