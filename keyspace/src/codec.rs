//! JSON encoding of multimap keys and values.

use std::collections::HashSet;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

pub(crate) fn encode_key<K: Serialize>(key: &K) -> Result<String, Error> {
    Ok(serde_json::to_string(key)?)
}

pub(crate) fn encode_value<V: Serialize>(value: &V) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn encode_values<V, I>(values: I) -> Result<Vec<Vec<u8>>, Error>
where
    V: Serialize,
    I: IntoIterator<Item = V>,
{
    values.into_iter().map(|value| encode_value(&value)).collect()
}

pub(crate) fn decode_set<V>(members: Vec<Vec<u8>>) -> Result<HashSet<V>, Error>
where
    V: DeserializeOwned + Eq + Hash,
{
    members
        .iter()
        .map(|member| serde_json::from_slice(member).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_are_quoted() {
        assert_eq!(encode_key(&"user").unwrap(), "\"user\"");
        assert_eq!(encode_key(&42u32).unwrap(), "42");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<HashSet<String>, _> = decode_set(vec![b"not json".to_vec()]);
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn test_decode_collapses_duplicates() {
        let set: HashSet<u8> =
            decode_set(vec![b"1".to_vec(), b"1".to_vec(), b"2".to_vec()]).unwrap();
        assert_eq!(set, HashSet::from([1, 2]));
    }
}
