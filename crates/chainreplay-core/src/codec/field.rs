//! Field-level codecs.

use std::marker::PhantomData;

use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{kind_of, Codec};
use crate::error::EncodingError;

fn unexpected(expected: &'static str, actual: &Value) -> EncodingError {
    EncodingError::UnexpectedType {
        expected,
        actual: kind_of(actual),
    }
}

// ─── Scalars ──────────────────────────────────────────────────────────────────

/// UTF-8 string stored as a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

pub fn text() -> Text {
    Text
}

impl Codec for Text {
    type Value = String;

    fn serialize(&self, value: &String) -> Result<Value, EncodingError> {
        Ok(Value::String(value.clone()))
    }

    fn deserialize(&self, serialized: &Value) -> Result<String, EncodingError> {
        serialized
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected("string", serialized))
    }
}

/// `u64` stored as a JSON number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Number;

pub fn number() -> Number {
    Number
}

impl Codec for Number {
    type Value = u64;

    fn serialize(&self, value: &u64) -> Result<Value, EncodingError> {
        Ok(Value::from(*value))
    }

    fn deserialize(&self, serialized: &Value) -> Result<u64, EncodingError> {
        serialized
            .as_u64()
            .ok_or_else(|| unexpected("unsigned integer", serialized))
    }
}

/// Arbitrary-precision natural number stored as a decimal string.
///
/// Token amounts routinely exceed 2^53, so they never pass through a JSON number.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigNumber;

pub fn big_number() -> BigNumber {
    BigNumber
}

impl Codec for BigNumber {
    type Value = BigUint;

    fn serialize(&self, value: &BigUint) -> Result<Value, EncodingError> {
        Ok(Value::String(value.to_str_radix(10)))
    }

    fn deserialize(&self, serialized: &Value) -> Result<BigUint, EncodingError> {
        let s = serialized
            .as_str()
            .ok_or_else(|| unexpected("decimal string", serialized))?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| EncodingError::Malformed(format!("invalid decimal number '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Boolean;

pub fn boolean() -> Boolean {
    Boolean
}

impl Codec for Boolean {
    type Value = bool;

    fn serialize(&self, value: &bool) -> Result<Value, EncodingError> {
        Ok(Value::Bool(*value))
    }

    fn deserialize(&self, serialized: &Value) -> Result<bool, EncodingError> {
        serialized
            .as_bool()
            .ok_or_else(|| unexpected("boolean", serialized))
    }
}

/// 20-byte account address, normalised to lowercase `0x…` hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Address;

pub fn address() -> Address {
    Address
}

impl Address {
    /// Validate and lowercase an address.
    pub fn normalize(raw: &str) -> Result<String, EncodingError> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| EncodingError::Malformed(format!("address '{raw}' lacks 0x prefix")))?;
        let bytes = hex::decode(digits)
            .map_err(|e| EncodingError::Malformed(format!("address '{raw}': {e}")))?;
        if bytes.len() != 20 {
            return Err(EncodingError::Malformed(format!(
                "address '{raw}' has {} bytes, expected 20",
                bytes.len()
            )));
        }
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl Codec for Address {
    type Value = String;

    fn serialize(&self, value: &String) -> Result<Value, EncodingError> {
        Ok(Value::String(Self::normalize(value)?))
    }

    fn deserialize(&self, serialized: &Value) -> Result<String, EncodingError> {
        let raw = serialized
            .as_str()
            .ok_or_else(|| unexpected("address string", serialized))?;
        Self::normalize(raw)
    }
}

// ─── Combinators ──────────────────────────────────────────────────────────────

/// `Option<T>` stored as `null` or the inner codec's form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optional<C>(C);

pub fn optional<C: Codec>(inner: C) -> Optional<C> {
    Optional(inner)
}

impl<C: Codec> Codec for Optional<C> {
    type Value = Option<C::Value>;

    fn serialize(&self, value: &Self::Value) -> Result<Value, EncodingError> {
        match value {
            Some(inner) => self.0.serialize(inner),
            None => Ok(Value::Null),
        }
    }

    fn deserialize(&self, serialized: &Value) -> Result<Self::Value, EncodingError> {
        match serialized {
            Value::Null => Ok(None),
            other => self.0.deserialize(other).map(Some),
        }
    }
}

/// `Vec<T>` stored as a JSON array.
#[derive(Debug, Clone, Copy, Default)]
pub struct List<C>(C);

pub fn list<C: Codec>(item: C) -> List<C> {
    List(item)
}

impl<C: Codec> Codec for List<C> {
    type Value = Vec<C::Value>;

    fn serialize(&self, value: &Self::Value) -> Result<Value, EncodingError> {
        value
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.0
                    .serialize(item)
                    .map_err(|e| e.in_field(&format!("[{i}]")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn deserialize(&self, serialized: &Value) -> Result<Self::Value, EncodingError> {
        let items = serialized
            .as_array()
            .ok_or_else(|| unexpected("array", serialized))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.0
                    .deserialize(item)
                    .map_err(|e| e.in_field(&format!("[{i}]")))
            })
            .collect()
    }
}

/// Any serde type, stored through `serde_json`.
pub struct Json<T>(PhantomData<fn() -> T>);

pub fn json<T>() -> Json<T> {
    Json(PhantomData)
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        json()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        json()
    }
}

impl<T> Copy for Json<T> {}

impl<T> std::fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Json")
    }
}

impl<T: Serialize + DeserializeOwned> Codec for Json<T> {
    type Value = T;

    fn serialize(&self, value: &T) -> Result<Value, EncodingError> {
        Ok(serde_json::to_value(value)?)
    }

    fn deserialize(&self, serialized: &Value) -> Result<T, EncodingError> {
        Ok(serde_json::from_value(serialized.clone())?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
