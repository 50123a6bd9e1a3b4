use crate::core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Anything that can be stored as a column family value.
///
/// Values are MessagePack encoded in positional (array) form. Use ordered maps
/// (`BTreeMap`) inside values so that equal values always encode to equal bytes.
pub trait DbValue: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> DbValue for T {}

/// Presence-only value for set-like column families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbNil;

pub(crate) fn encode_value<V: DbValue>(value: &V) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(value)?)
}

pub(crate) fn decode_value<V: DbValue>(bytes: &[u8]) -> Result<V> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        attributes: BTreeMap<String, i64>,
    }

    #[test]
    fn test_equal_values_encode_to_equal_bytes() {
        let mut first = BTreeMap::new();
        first.insert("b".to_string(), 2);
        first.insert("a".to_string(), 1);
        let mut second = BTreeMap::new();
        second.insert("a".to_string(), 1);
        second.insert("b".to_string(), 2);

        let left = encode_value(&Sample { name: "x".into(), attributes: first }).unwrap();
        let right = encode_value(&Sample { name: "x".into(), attributes: second }).unwrap();
        assert_eq!(left, right);

        let decoded: Sample = decode_value(&left).unwrap();
        assert_eq!(decoded.attributes.len(), 2);
    }

    #[test]
    fn test_nil_value_is_decodable() {
        let bytes = encode_value(&DbNil).unwrap();
        let _: DbNil = decode_value(&bytes).unwrap();
    }
}
