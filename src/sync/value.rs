use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// A string-keyed tree of [`Value`]s, the unit of object synchronization.
pub type ValueMap = BTreeMap<String, Value>;

/// A node in a synchronized object tree.
///
/// Serialized without tags, so trees look the same on the wire as plain
/// MessagePack documents. Integers that fit in an `i64` come back as
/// `Int` after a round trip; `UInt` only survives for values above
/// `i64::MAX`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(ByteBuf),
    Map(ValueMap),
}

impl Value {
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(ByteBuf::from(v))
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Self::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value) -> Value {
        let buf = rmp_serde::to_vec(value).unwrap();
        rmp_serde::from_slice(&buf).unwrap()
    }

    #[test]
    fn unsigned_integers_normalize_to_int_when_they_fit() {
        assert_eq!(round_trip(&Value::UInt(5)), Value::Int(5));
        assert_eq!(
            round_trip(&Value::UInt(i64::MAX as u64)),
            Value::Int(i64::MAX)
        );
    }

    #[test]
    fn integers_outside_the_signed_range_stay_uint() {
        assert_eq!(round_trip(&Value::UInt(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(
            round_trip(&Value::UInt(i64::MAX as u64 + 1)),
            Value::UInt(i64::MAX as u64 + 1)
        );
    }

    #[test]
    fn signed_integers_survive_unchanged() {
        assert_eq!(round_trip(&Value::Int(-5)), Value::Int(-5));
        assert_eq!(round_trip(&Value::Int(i64::MIN)), Value::Int(i64::MIN));
    }
}
