// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::expect_used)] // the embedder id patterns are static

use crate::tensor::{Tensor, TensorType};
use crate::Rc;

use core::fmt;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref QUOTED_WITH_ID: Regex =
        Regex::new(r#"^([A-Za-z0-9_\-.]+),\s*(["'].*["'])$"#).expect("valid embedder id pattern");
    static ref UNQUOTED_WITH_ID: Regex =
        Regex::new(r"^([A-Za-z0-9_\-.]+),\s*(.+)$").expect("valid embedder id pattern");
}

/// Turns text into a tensor of a requested type.
///
/// Implementations are supplied by the host per request. They may be expensive;
/// timeouts and retries are the caller's concern.
pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        text: &str,
        context: &EmbedContext,
        tensor_type: &TensorType,
    ) -> anyhow::Result<Tensor>;
}

/// Embedders available to a request, by id.
pub type Embedders = BTreeMap<String, Rc<dyn Embedder>>;

/// The language of the text being embedded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Unknown,
    Tag(Rc<str>),
}

impl Language {
    /// Parses a language tag. Empty tags and `un`/`unknown` give [`Language::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        if tag.is_empty() || tag.eq_ignore_ascii_case("un") || tag.eq_ignore_ascii_case("unknown")
        {
            Language::Unknown
        } else {
            Language::Tag(tag.to_ascii_lowercase().into())
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Language::Unknown => "un",
            Language::Tag(t) => t,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What an embedder is told about the value it produces.
#[derive(Clone, Debug)]
pub struct EmbedContext {
    /// Full name of the field receiving the tensor.
    pub destination: String,
    pub language: Language,
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("No embedders provided")]
    NoEmbedders,

    #[error("Can't find embedder '{id}'. {}", available_ids(.available))]
    UnknownEmbedder { id: String, available: Vec<String> },

    #[error("Multiple embedders are provided but no embedder id is given. Usage: embed(embedder-id, 'text'). {}", available_ids(.available))]
    MissingEmbedderId { available: Vec<String> },

    #[error("Multiple embedders are provided but the string to embed is not quoted. Usage: embed(embedder-id, 'text'). {}", available_ids(.available))]
    UnquotedText { available: Vec<String> },

    #[error("Embedder produced a tensor of type {actual}, but {expected} is required")]
    WrongType {
        expected: TensorType,
        actual: TensorType,
    },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

fn available_ids(ids: &[String]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
    format!("Available embedder ids are {}.", quoted.join(", "))
}

/// The argument text of an `embed(...)` literal, if `text` is one.
pub(crate) fn embed_argument(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix("embed(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

pub(crate) fn is_embed_literal(text: &str) -> bool {
    embed_argument(text).is_some()
}

fn remove_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

/// Resolves an `embed(...)` literal into a tensor of `tensor_type`.
pub(crate) fn resolve(
    literal: &str,
    destination: &str,
    tensor_type: &TensorType,
    embedders: &Embedders,
    language: &Language,
) -> Result<Tensor, EmbedError> {
    let argument = embed_argument(literal).unwrap_or(literal);
    if embedders.is_empty() {
        return Err(EmbedError::NoEmbedders);
    }
    let available = || embedders.keys().cloned().collect::<Vec<_>>();

    let (embedder, text) = if let Some(captures) = QUOTED_WITH_ID.captures(argument) {
        let id = captures.get(1).map_or("", |m| m.as_str());
        let text = captures.get(2).map_or("", |m| m.as_str());
        match embedders.get(id) {
            Some(embedder) => (embedder, text),
            None => {
                return Err(EmbedError::UnknownEmbedder {
                    id: id.to_string(),
                    available: available(),
                })
            }
        }
    } else if let (1, Some(embedder)) = (embedders.len(), embedders.values().next()) {
        (embedder, argument)
    } else if UNQUOTED_WITH_ID.is_match(argument) {
        return Err(EmbedError::UnquotedText {
            available: available(),
        });
    } else {
        return Err(EmbedError::MissingEmbedderId {
            available: available(),
        });
    };

    let context = EmbedContext {
        destination: destination.to_string(),
        language: language.clone(),
    };
    debug!("embedding text into '{destination}' as {tensor_type}");
    let tensor = embedder.embed(remove_quotes(text), &context, tensor_type)?;
    if tensor.tensor_type() != tensor_type {
        return Err(EmbedError::WrongType {
            expected: tensor_type.clone(),
            actual: tensor.tensor_type().clone(),
        });
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    struct Fixed(&'static str);

    impl Embedder for Fixed {
        fn embed(
            &self,
            _text: &str,
            context: &EmbedContext,
            tensor_type: &TensorType,
        ) -> Result<Tensor> {
            let literal = format!(
                "{{{{x:{}}}:1.0, {{x:{}}}:2.0}}",
                self.0,
                context.language.tag()
            );
            Tensor::parse(&literal, Some(tensor_type))
        }
    }

    fn embedders(ids: &[&'static str]) -> Embedders {
        ids.iter()
            .map(|&id| (id.to_string(), Rc::new(Fixed(id)) as Rc<dyn Embedder>))
            .collect()
    }

    fn mapped_x() -> Result<TensorType> {
        TensorType::parse("tensor(x{})")
    }

    #[test]
    fn literal_detection() {
        assert_eq!(embed_argument("embed(text)"), Some("text"));
        assert_eq!(embed_argument(" embed( 'a b' ) "), Some("'a b'"));
        assert_eq!(embed_argument("Embed(text)"), None);
        assert_eq!(embed_argument("{x:1.0}"), None);
    }

    #[test]
    fn quotes_are_removed() {
        assert_eq!(remove_quotes("'text'"), "text");
        assert_eq!(remove_quotes("\"text\""), "text");
        assert_eq!(remove_quotes("text"), "text");
    }

    #[test]
    fn single_embedder_is_implicit() -> Result<()> {
        let t = mapped_x()?;
        let one = embedders(&["emb1"]);
        let tensor = resolve("embed(text)", "f", &t, &one, &Language::Unknown)?;
        assert_eq!(tensor.get(&["emb1"]), Some(1.0));
        assert_eq!(tensor.get(&["un"]), Some(2.0));
        resolve("embed('text')", "f", &t, &one, &Language::from_tag("en"))?;
        resolve("embed(emb1, \"text\")", "f", &t, &one, &Language::Unknown)?;
        Ok(())
    }

    #[test]
    fn several_embedders_need_an_id() -> Result<()> {
        let t = mapped_x()?;
        let two = embedders(&["emb1", "emb2"]);
        let tensor = resolve("embed(emb2, 'text')", "f", &t, &two, &Language::Unknown)?;
        assert_eq!(tensor.get(&["emb2"]), Some(1.0));

        let err = resolve("embed('text')", "f", &t, &two, &Language::Unknown)
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Multiple embedders are provided but no embedder id is given. Usage: embed(embedder-id, 'text'). Available embedder ids are 'emb1', 'emb2'.")
        );

        let err = resolve("embed(emb1, text)", "f", &t, &two, &Language::Unknown)
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Multiple embedders are provided but the string to embed is not quoted. Usage: embed(embedder-id, 'text'). Available embedder ids are 'emb1', 'emb2'.")
        );
        Ok(())
    }

    #[test]
    fn unknown_and_missing_embedders() -> Result<()> {
        let t = mapped_x()?;
        let one = embedders(&["emb1"]);
        let err = resolve("embed(emb2, 'text')", "f", &t, &one, &Language::Unknown)
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Can't find embedder 'emb2'. Available embedder ids are 'emb1'.")
        );
        assert!(matches!(
            resolve("embed(text)", "f", &t, &Embedders::new(), &Language::Unknown),
            Err(EmbedError::NoEmbedders)
        ));
        Ok(())
    }

    #[test]
    fn result_must_have_the_requested_type() -> Result<()> {
        let wanted = TensorType::parse("tensor(y{})")?;
        struct Wrong;
        impl Embedder for Wrong {
            fn embed(&self, _: &str, _: &EmbedContext, _: &TensorType) -> Result<Tensor> {
                Tensor::parse("{x1:1.0}", None)
            }
        }
        let mut wrong = Embedders::new();
        wrong.insert("w".to_string(), Rc::new(Wrong) as Rc<dyn Embedder>);
        assert!(matches!(
            resolve("embed(text)", "f", &wanted, &wrong, &Language::Unknown),
            Err(EmbedError::WrongType { .. })
        ));
        Ok(())
    }
}
