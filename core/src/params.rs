//! Parameter sets and request payloads.
//!
//! # Design
//! `Params` keeps the two shapes callers hand us apart. The `Pairs` form is
//! an ordered list that may repeat keys and is never consulted for path
//! placeholders. The `Map` form has unique keys, iterates in key order, and
//! gives up entries to fill `:name` placeholders.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::ClientError;

/// Query parameters or header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    Pairs(Vec<(String, String)>),
    Map(BTreeMap<String, String>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Pairs(Vec::new())
    }
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Params::Pairs(items.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn map<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Params::Map(items.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Ordered pairs from a flat `[key, value, key, value, ...]` list.
    pub fn flat<S: AsRef<str>>(items: &[S]) -> Result<Self, ClientError> {
        if items.len() % 2 != 0 {
            return Err(ClientError::InvalidArgument(
                "parameter list must have an even number of entries".to_string(),
            ));
        }
        Ok(Params::Pairs(
            items
                .chunks(2)
                .map(|kv| (kv[0].as_ref().to_string(), kv[1].as_ref().to_string()))
                .collect(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::Pairs(pairs) => pairs.is_empty(),
            Params::Map(map) => map.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Pairs(pairs) => pairs.len(),
            Params::Map(map) => map.len(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        match self {
            Params::Pairs(pairs) => Box::new(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            Params::Map(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        }
    }

    /// Remove and return `key` from a mapping. Ordered pairs never give up
    /// entries.
    pub fn take(&mut self, key: &str) -> Option<String> {
        match self {
            Params::Pairs(_) => None,
            Params::Map(map) => map.remove(key),
        }
    }
}

impl From<Vec<(String, String)>> for Params {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Params::Pairs(pairs)
    }
}

impl From<Vec<(&str, &str)>> for Params {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        Params::pairs(pairs)
    }
}

impl From<BTreeMap<String, String>> for Params {
    fn from(map: BTreeMap<String, String>) -> Self {
        Params::Map(map)
    }
}

impl From<HashMap<String, String>> for Params {
    fn from(map: HashMap<String, String>) -> Self {
        Params::Map(map.into_iter().collect())
    }
}

/// Request payload, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Sent as-is (after newline normalization for form bodies).
    Text(String),
    /// Structured value, serialized for JSON bodies.
    Json(serde_json::Value),
    /// Key/value fields, URL-encoded for form bodies.
    Form(Params),
}

impl Content {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ClientError> {
        Ok(Content::Json(serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Json(value) => value.is_null(),
            Content::Form(params) => params.is_empty(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Json(value)
    }
}

impl From<Params> for Content {
    fn from(params: Params) -> Self {
        Content::Form(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_list_keeps_order_and_duplicates() {
        let params = Params::flat(&["a", "1", "a", "2"]).unwrap();
        let items: Vec<_> = params.iter().collect();
        assert_eq!(items, vec![("a", "1"), ("a", "2")]);
    }

    #[test]
    fn flat_list_rejects_odd_length() {
        let err = Params::flat(&["a", "1", "b"]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn take_only_consumes_from_map() {
        let mut map = Params::map([("id", "7"), ("q", "x")]);
        assert_eq!(map.take("id").as_deref(), Some("7"));
        assert_eq!(map.len(), 1);

        let mut pairs = Params::pairs([("id", "7")]);
        assert_eq!(pairs.take("id"), None);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn map_iterates_in_key_order() {
        let params = Params::map([("zeta", "1"), ("alpha", "2")]);
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn content_emptiness() {
        assert!(Content::from("").is_empty());
        assert!(Content::Json(serde_json::Value::Null).is_empty());
        assert!(Content::Form(Params::new()).is_empty());
        assert!(!Content::Json(serde_json::json!({})).is_empty());
    }
}
