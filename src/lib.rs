// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed, inheritable query profiles.
//!
//! Profiles are authored into a [`QueryProfileRegistry`], compiled once per configuration
//! generation into an immutable [`CompiledQueryProfileRegistry`], and read at request time
//! through [`QueryProfileProperties`], which layers per-request overrides on top of the
//! shared compiled base.

#[cfg(feature = "arc")]
pub use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub use std::rc::Rc;

mod compiled;
mod compiler;
mod compound_name;
mod embed;
mod error;
mod number;
mod profile;
mod properties;
mod registry;
mod tensor;
mod types;
mod utils;
mod value;

pub use compiled::{CompiledQueryProfile, CompiledQueryProfileRegistry, CompiledValue};
pub use compiler::compile;
pub use compound_name::CompoundName;
pub use embed::{EmbedContext, EmbedError, Embedder, Embedders, Language};
pub use error::QueryProfileError;
pub use number::Number;
pub use profile::{ProfileValue, QueryProfile};
pub use properties::QueryProfileProperties;
pub use registry::{validate_name, Named, QueryProfileRegistry, Registry, RegistryError};
pub use tensor::{CellType, Dimension, Tensor, TensorType};
pub use types::{FieldDescription, FieldLookup, FieldType, QueryProfileType, QueryProfileTypeRegistry};
pub use value::Value;

#[cfg(test)]
mod tests;
