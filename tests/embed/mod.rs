// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{anyhow, Result};
use query_profiles::*;

/// Produces `{x:<id>}: <text length>`, recording which embedder ran.
struct Counting(&'static str);

impl Embedder for Counting {
    fn embed(&self, text: &str, _context: &EmbedContext, tensor_type: &TensorType) -> Result<Tensor> {
        Tensor::from_cells(tensor_type.clone(), [(vec![("x", self.0)], text.len() as f64)])
    }
}

struct Failing;

impl Embedder for Failing {
    fn embed(&self, _: &str, _: &EmbedContext, _: &TensorType) -> Result<Tensor> {
        Err(anyhow!("model unavailable"))
    }
}

fn embedders(ids: &[&'static str]) -> Embedders {
    ids.iter()
        .map(|&id| (id.to_string(), Rc::new(Counting(id)) as Rc<dyn Embedder>))
        .collect()
}

fn properties(embedders: Embedders) -> Result<QueryProfileProperties> {
    let mut registry = QueryProfileRegistry::new();
    let mut t = QueryProfileType::new("ranking");
    t.add_field(FieldDescription::parse("query(q)", "tensor(x{})", registry.types())?)?;
    registry.register_type(t)?;
    let mut profile = QueryProfile::new("default");
    profile.set_type("ranking", &registry)?;
    registry.register(profile)?;

    let compiled = registry.compile()?;
    Ok(compiled
        .properties("default")
        .ok_or_else(|| anyhow!("missing profile"))?
        .with_embedders(embedders))
}

fn embedded(p: &QueryProfileProperties) -> Result<Tensor> {
    match p.get("query(q)")? {
        Some(Value::Tensor(t)) => Ok((*t).clone()),
        other => Err(anyhow!("not a tensor: {other:?}")),
    }
}

#[test]
fn a_single_embedder_needs_no_id() -> Result<()> {
    let mut p = properties(embedders(&["only"]))?;
    p.set("query(q)", "embed(hello)")?;
    assert_eq!(embedded(&p)?.get(&["only"]), Some(5.0));

    p.set("query(q)", "embed(only, 'hi')")?;
    assert_eq!(embedded(&p)?.get(&["only"]), Some(2.0));
    Ok(())
}

#[test]
fn several_embedders_are_chosen_by_id() -> Result<()> {
    let mut p = properties(embedders(&["emb1", "emb2"]))?;
    p.set("query(q)", "embed(emb2, \"text\")")?;
    assert_eq!(embedded(&p)?.get(&["emb2"]), Some(4.0));

    let err = p.set("query(q)", "embed(text)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not set 'query(q)' to 'embed(text)': Multiple embedders are provided but no embedder id is given. \
         Usage: embed(embedder-id, 'text'). Available embedder ids are 'emb1', 'emb2'."
    );

    let err = p.set("query(q)", "embed(emb1, text)").unwrap_err();
    assert!(matches!(
        err,
        QueryProfileError::Embed {
            source: EmbedError::UnquotedText { .. },
            ..
        }
    ));

    let err = p.set("query(q)", "embed(emb3, 'text')").unwrap_err();
    assert!(
        err.to_string()
            .ends_with("Can't find embedder 'emb3'. Available embedder ids are 'emb1', 'emb2'."),
        "{err}"
    );
    Ok(())
}

#[test]
fn embedder_failures_are_reported() -> Result<()> {
    let mut embedders = Embedders::new();
    embedders.insert("broken".to_string(), Rc::new(Failing) as Rc<dyn Embedder>);
    let mut p = properties(embedders)?;

    let err = p.set("query(q)", "embed(text)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not set 'query(q)' to 'embed(text)': model unavailable"
    );
    assert_eq!(p.get("query(q)")?, None);
    Ok(())
}
