// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::embed::EmbedError;
use crate::registry::RegistryError;
use crate::Rc;

use thiserror::Error;

type String = Rc<str>;

/// Errors raised while authoring, compiling or reading query profiles.
#[derive(Debug, Error)]
pub enum QueryProfileError {
    /// A dotted name could not be parsed.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A field type string is malformed or names an unknown type.
    #[error("Could not parse field type '{text}': {reason}")]
    TypeParse { text: String, reason: String },

    /// A field name or alias is already used in the type.
    #[error("Field '{name}' is already declared in query profile type '{type_name}'")]
    DuplicateField { name: String, type_name: String },

    /// A value is not representable as the declared field type.
    #[error("Could not set '{path}' to '{value}': {detail}")]
    TypeMismatch {
        path: String,
        value: String,
        expected: String,
        detail: String,
    },

    /// A strict type rejects an undeclared key.
    #[error("Could not set '{path}' to '{value}': '{local}' is not declared in query profile type '{type_name}', and the type is strict")]
    NotDeclared {
        path: String,
        value: String,
        local: String,
        type_name: String,
    },

    /// A referenced profile or type does not exist.
    #[error("'{owner}' references '{reference}' at '{path}', which does not exist")]
    UnresolvedReference {
        owner: String,
        path: String,
        reference: String,
    },

    /// Profiles reference each other in a cycle.
    #[error("Cyclic reference between query profiles: {chain}")]
    CyclicReference { chain: String },

    /// No query profile type with the given name is registered.
    #[error("Query profile type '{0}' is not registered")]
    UnknownType(String),

    /// No query profile with the given name is registered.
    #[error("Query profile '{0}' is not registered")]
    UnknownProfile(String),

    /// Resolving an embedding literal failed.
    #[error("Could not set '{path}' to '{value}': {source}")]
    Embed {
        path: String,
        value: String,
        #[source]
        source: EmbedError,
    },

    /// Resolving an embedding literal stored in a profile failed when reading it.
    #[error("Could not resolve '{value}' at '{path}': {source}")]
    EmbedOnRead {
        path: String,
        value: String,
        #[source]
        source: EmbedError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl QueryProfileError {
    pub(crate) fn type_mismatch(
        path: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        let value = value.into();
        let expected = expected.into();
        let detail = format!("'{value}' is not a {expected}").into();
        Self::TypeMismatch {
            path: path.into(),
            value,
            expected,
            detail,
        }
    }

    pub(crate) fn type_mismatch_with(
        path: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            value: value.into(),
            expected: expected.into(),
            detail: detail.into(),
        }
    }
}
