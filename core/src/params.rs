//! Request parameters and their wire encoding.
//!
//! # Design
//! Parameters keep insertion order so the built query string is stable.
//! Before encoding, every parameter whose value is "falsy" is dropped: null,
//! `false`, `0`, `0.0`, `""`, `"0"`, and empty arrays or objects. This drops
//! legitimate zero and `"0"` filters too; callers that need to send a zero
//! must encode it some other way (for example `"00"` or `"0.0"`).
//!
//! Nested values encode the way PHP's `http_build_query` does: arrays become
//! `key[0]=a&key[1]=b`, objects become `key[name]=v`, booleans become `1`/`0`
//! and nested nulls are skipped.

use serde_json::Value;
use url::form_urlencoded;

/// Ordered string-keyed request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing value in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of these parameters without the falsy entries.
    pub fn filtered(&self) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(_, v)| is_truthy(v))
                .cloned()
                .collect(),
        )
    }

    /// Form/query encoding of all entries, in order.
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            append_value(&mut serializer, key, value);
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// PHP-style truthiness of a loosely-typed value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn append_value(serializer: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            serializer.append_pair(key, if *b { "1" } else { "0" });
        }
        Value::Number(n) => {
            serializer.append_pair(key, &n.to_string());
        }
        Value::String(s) => {
            serializer.append_pair(key, s);
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                append_value(serializer, &format!("{key}[{i}]"), item);
            }
        }
        Value::Object(map) => {
            for (name, item) in map {
                append_value(serializer, &format!("{key}[{name}]"), item);
            }
        }
    }
}
