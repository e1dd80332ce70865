// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

use crate::error::QueryProfileError;
use crate::registry::QueryProfileTypeRegistry;
use crate::tensor::{Tensor, TensorType};
use crate::types::QueryProfileType;
use crate::value::Value;
use crate::Rc;

use core::fmt;

/// The type of a declared field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Tensor(TensorType),
    /// Query text.
    Query,
    /// A nested profile of any type.
    QueryProfile,
    /// A nested profile whose type is, or inherits, the named type.
    QueryProfileRef(Rc<str>),
    /// The anonymous type holding the remaining segments of a dotted field declaration.
    Nested(Box<QueryProfileType>),
}

impl FieldType {
    /// Parses the textual form of a field type.
    ///
    /// `query-profile:<name>` requires `<name>` to be registered in `types`.
    pub fn parse(text: &str, types: &QueryProfileTypeRegistry) -> Result<Self, QueryProfileError> {
        let error = |reason: &str| QueryProfileError::TypeParse {
            text: text.into(),
            reason: reason.into(),
        };
        Ok(match text {
            "string" => FieldType::String,
            "integer" | "int" => FieldType::Integer,
            "long" => FieldType::Long,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "query" => FieldType::Query,
            "query-profile" => FieldType::QueryProfile,
            t if t.starts_with("tensor") => {
                FieldType::Tensor(TensorType::parse(t).map_err(|e| error(&e.to_string()))?)
            }
            t => match t.strip_prefix("query-profile:") {
                Some("") => return Err(error("missing query profile type name")),
                Some(name) if !types.contains(name) => {
                    return Err(error(&format!(
                        "query profile type '{name}' is not registered"
                    )))
                }
                Some(name) => FieldType::QueryProfileRef(name.into()),
                None => return Err(error("unknown field type")),
            },
        })
    }

    /// True for the types whose values are nested profiles.
    pub fn is_profile(&self) -> bool {
        matches!(
            self,
            FieldType::QueryProfile | FieldType::QueryProfileRef(_) | FieldType::Nested(_)
        )
    }

    /// The profile type required by a `query-profile:<name>` field.
    pub fn required_type(&self) -> Option<&str> {
        match self {
            FieldType::QueryProfileRef(name) => Some(name),
            _ => None,
        }
    }

    /// The type governing values below a field of this type, if any.
    pub fn nested_type<'a>(
        &'a self,
        types: &'a QueryProfileTypeRegistry,
    ) -> Option<&'a QueryProfileType> {
        match self {
            FieldType::QueryProfileRef(name) => types.get(name),
            FieldType::Nested(t) => Some(t),
            _ => None,
        }
    }

    /// The name used for this type in error messages.
    pub fn description(&self) -> String {
        match self {
            FieldType::String => "string".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Long => "long".into(),
            FieldType::Float => "float".into(),
            FieldType::Double => "double".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Tensor(t) => format!("tensor of type {t}"),
            FieldType::Query => "query".into(),
            FieldType::QueryProfile | FieldType::Nested(_) => "reference to a query profile".into(),
            FieldType::QueryProfileRef(name) => {
                format!("reference to a query profile of type '{name}'")
            }
        }
    }

    /// Converts `value` to this type without losing information.
    ///
    /// Strings are parsed for the numeric, boolean and tensor types. Profile types
    /// hold no values and always return `None`.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => None,
            (FieldType::String, Value::Tensor(_)) => None,
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::String, v) => Some(Value::from(v.to_string())),
            (FieldType::Query, Value::String(_)) => Some(value.clone()),

            (FieldType::Integer, Value::Number(n)) => n.to_integer().map(Value::Number),
            (FieldType::Integer, Value::String(s)) => s.trim().parse::<i32>().ok().map(Value::from),
            (FieldType::Long, Value::Number(n)) => n.to_long().map(Value::Number),
            (FieldType::Long, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (FieldType::Float, Value::Number(n)) => n.to_float().map(Value::Number),
            (FieldType::Float, Value::String(s)) => s.trim().parse::<f32>().ok().map(Value::from),
            (FieldType::Double, Value::Number(n)) => n.to_double().map(Value::Number),
            (FieldType::Double, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),

            (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.trim() {
                b if b.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                b if b.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },

            (FieldType::Tensor(t), Value::Tensor(v)) => (v.tensor_type() == t).then(|| value.clone()),
            (FieldType::Tensor(t), Value::String(s)) => Tensor::parse(s, Some(t)).ok().map(Value::from),

            _ => None,
        }
    }

    /// Explains why [`FieldType::convert`] rejected `value`.
    pub(crate) fn mismatch_detail(&self, value: &Value) -> String {
        match self {
            FieldType::Tensor(t) => format!("Require a tensor of type {t}"),
            _ => format!("'{value}' is not a {}", self.description()),
        }
    }
}

/// Displays the textual form accepted by [`FieldType::parse`].
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Long => f.write_str("long"),
            FieldType::Float => f.write_str("float"),
            FieldType::Double => f.write_str("double"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Tensor(t) => write!(f, "{t}"),
            FieldType::Query => f.write_str("query"),
            FieldType::QueryProfile | FieldType::Nested(_) => f.write_str("query-profile"),
            FieldType::QueryProfileRef(name) => write!(f, "query-profile:{name}"),
        }
    }
}
