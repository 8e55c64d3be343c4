//! Composable serializer/deserializer combinators for entity values.
//!
//! A [`Codec`] maps a runtime value to its stored JSON form and back.
//! Field codecs ([`text`], [`big_number`], [`optional`], …) are combined into
//! whole-entity codecs with [`object_codec!`](crate::object_codec).

mod field;
mod object;

pub use field::{
    address, big_number, boolean, json, list, number, optional, text, Address, BigNumber, Boolean,
    Json, List, Number, Optional, Text,
};
pub use object::{expect_object, field_value};

use serde_json::Value;

use crate::error::EncodingError;

/// Pairs a serializer and a deserializer for one runtime type.
///
/// Implementations must satisfy `deserialize(serialize(x)) == x`.
pub trait Codec: Send + Sync {
    type Value;

    fn serialize(&self, value: &Self::Value) -> Result<Value, EncodingError>;

    fn deserialize(&self, serialized: &Value) -> Result<Self::Value, EncodingError>;
}

impl<C: Codec + ?Sized> Codec for &C {
    type Value = C::Value;

    fn serialize(&self, value: &Self::Value) -> Result<Value, EncodingError> {
        (**self).serialize(value)
    }

    fn deserialize(&self, serialized: &Value) -> Result<Self::Value, EncodingError> {
        (**self).deserialize(serialized)
    }
}

/// Name of a JSON value's type, for error messages.
pub(crate) fn kind_of(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
