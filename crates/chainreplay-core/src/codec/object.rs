//! The object combinator: a struct codec assembled from per-field codecs.

use serde_json::{Map, Value};

use super::kind_of;
use crate::error::EncodingError;

/// Borrow a serialized value as a JSON object.
pub fn expect_object(serialized: &Value) -> Result<&Map<String, Value>, EncodingError> {
    serialized
        .as_object()
        .ok_or_else(|| EncodingError::UnexpectedType {
            expected: "object",
            actual: kind_of(serialized),
        })
}

/// Look up one field; a missing field reads as `null`.
pub fn field_value<'a>(object: &'a Map<String, Value>, name: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    object.get(name).unwrap_or(NULL)
}

#[doc(hidden)]
#[macro_export]
macro_rules! __object_field_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $name:literal) => {
        $name
    };
}

/// Define a codec for a struct from a mapping of fields to field codecs.
///
/// Each field is serialized independently into one JSON object member
/// (renamed with `as "name"`); deserialization is per field, and a failure
/// is reported against the failing field only.
///
/// ```
/// use chainreplay_core::codec::{self, Codec};
/// use chainreplay_core::object_codec;
/// use num_bigint::BigUint;
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Account {
///     pub address: String,
///     pub tokens_owned: BigUint,
/// }
///
/// object_codec! {
///     pub struct AccountCodec for Account {
///         address: codec::address(),
///         tokens_owned as "tokensOwned": codec::big_number(),
///     }
/// }
///
/// let account = Account {
///     address: "0x0000000000000000000000000000000000000001".into(),
///     tokens_owned: BigUint::from(100u32),
/// };
/// let stored = AccountCodec.serialize(&account).unwrap();
/// assert_eq!(stored["tokensOwned"], "100");
/// assert_eq!(AccountCodec.deserialize(&stored).unwrap(), account);
/// ```
#[macro_export]
macro_rules! object_codec {
    (
        $(#[$meta:meta])*
        $vis:vis struct $codec:ident for $target:ident {
            $( $field:ident $(as $name:literal)? : $field_codec:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $codec;

        // A struct with no fields leaves `value` and `object` unused.
        #[allow(unused_variables, unused_mut)]
        impl $crate::codec::Codec for $codec {
            type Value = $target;

            fn serialize(
                &self,
                value: &$target,
            ) -> ::std::result::Result<$crate::__private::serde_json::Value, $crate::EncodingError> {
                let mut object = $crate::__private::serde_json::Map::new();
                $(
                    let name = $crate::__object_field_name!($field $(, $name)?);
                    let serialized = $crate::codec::Codec::serialize(&$field_codec, &value.$field)
                        .map_err(|e| e.in_field(name))?;
                    object.insert(::std::string::String::from(name), serialized);
                )*
                ::std::result::Result::Ok($crate::__private::serde_json::Value::Object(object))
            }

            fn deserialize(
                &self,
                serialized: &$crate::__private::serde_json::Value,
            ) -> ::std::result::Result<$target, $crate::EncodingError> {
                let object = $crate::codec::expect_object(serialized)?;
                ::std::result::Result::Ok($target {
                    $(
                        $field: {
                            let name = $crate::__object_field_name!($field $(, $name)?);
                            $crate::codec::Codec::deserialize(
                                &$field_codec,
                                $crate::codec::field_value(object, name),
                            )
                            .map_err(|e| e.in_field(name))?
                        },
                    )*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use serde_json::json;

    use crate::codec::{self, Codec};
    use crate::error::EncodingError;

    #[derive(Debug, Clone, PartialEq)]
    struct Vote {
        proposal_id: BigUint,
        voter: String,
        support: u64,
        weight: BigUint,
        reason: Option<String>,
    }

    object_codec! {
        struct VoteCodec for Vote {
            proposal_id as "proposalId": codec::big_number(),
            voter as "voterAddress": codec::address(),
            support: codec::number(),
            weight: codec::big_number(),
            reason: codec::optional(codec::text()),
        }
    }

    fn vote() -> Vote {
        Vote {
            proposal_id: BigUint::from(7u32),
            voter: "0x00000000000000000000000000000000000000aa".into(),
            support: 1,
            weight: "123456789012345678901234567890".parse().unwrap(),
            reason: None,
        }
    }

    #[test]
    fn object_roundtrip() {
        let stored = VoteCodec.serialize(&vote()).unwrap();
        assert_eq!(
            stored,
            json!({
                "proposalId": "7",
                "voterAddress": "0x00000000000000000000000000000000000000aa",
                "support": 1,
                "weight": "123456789012345678901234567890",
                "reason": null,
            })
        );
        assert_eq!(VoteCodec.deserialize(&stored).unwrap(), vote());
    }

    #[test]
    fn missing_optional_field_reads_as_none() {
        let stored = json!({
            "proposalId": "7",
            "voterAddress": "0x00000000000000000000000000000000000000aa",
            "support": 1,
            "weight": "123456789012345678901234567890",
        });
        assert_eq!(VoteCodec.deserialize(&stored).unwrap().reason, None);
    }

    #[test]
    fn corrupt_field_is_reported_by_name() {
        let mut stored = VoteCodec.serialize(&vote()).unwrap();
        stored["weight"] = json!("not-a-number");
        let err = VoteCodec.deserialize(&stored).unwrap_err();
        assert!(matches!(err, EncodingError::Field { ref field, .. } if field == "weight"));
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            VoteCodec.deserialize(&json!([1, 2])),
            Err(EncodingError::UnexpectedType { expected: "object", .. })
        ));
    }

    #[derive(Debug, PartialEq)]
    struct Marker;

    object_codec! {
        struct MarkerCodec for Marker {}
    }

    #[test]
    fn fieldless_struct_is_an_empty_object() {
        assert_eq!(MarkerCodec.serialize(&Marker).unwrap(), json!({}));
        assert_eq!(MarkerCodec.deserialize(&json!({"extra": 1})).unwrap(), Marker);
        assert!(MarkerCodec.deserialize(&json!(null)).is_err());
    }
}
