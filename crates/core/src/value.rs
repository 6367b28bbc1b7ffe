//! Mergeable extraction results.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;

fn as_base64<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Content stored under one output key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Scalar(String),
    /// Unset members (absent or null in the source) stay as `None`.
    Map(BTreeMap<String, Option<String>>),
    List(Vec<String>),
    /// Untouched document subtree.
    Raw(Json),
    /// Decoded payload that is not UTF-8; serialises as standard base64.
    Bytes(#[serde(serialize_with = "as_base64")] Vec<u8>),
}

impl Entry {
    /// UTF-8 payloads become `Scalar`, anything else stays `Bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => Entry::Scalar(s),
            Err(e) => Entry::Bytes(e.into_bytes()),
        }
    }
}

impl From<String> for Entry {
    fn from(s: String) -> Self {
        Entry::Scalar(s)
    }
}

impl From<&str> for Entry {
    fn from(s: &str) -> Self {
        Entry::Scalar(s.to_string())
    }
}

/// Output key to extracted content. Serialises as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Value {
    entries: BTreeMap<String, Entry>,
}

impl Value {
    pub fn new(entries: BTreeMap<String, Entry>) -> Self {
        Self { entries }
    }

    pub fn single(key: impl Into<String>, entry: impl Into<Entry>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(key.into(), entry.into());
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow union; `other` wins on colliding keys.
    pub fn merge(&self, other: &Value) -> Value {
        let mut out = self.clone();
        out.merge_from(other.clone());
        out
    }

    pub fn merge_from(&mut self, other: Value) {
        self.entries.extend(other.entries);
    }

    pub fn into_inner(self) -> BTreeMap<String, Entry> {
        self.entries
    }
}

impl FromIterator<(String, Entry)> for Value {
    fn from_iter<T: IntoIterator<Item = (String, Entry)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl IntoIterator for Value {
    type Item = (String, Entry);
    type IntoIter = std::collections::btree_map::IntoIter<String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
