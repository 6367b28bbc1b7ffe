//! Compiled extraction rules.
//!
//! A [`Definition`] is immutable once built and holds no per-call state, so one instance can be
//! applied to many documents, concurrently if needed. Only the data-field variants touch the
//! fetch client, and they do so exactly once per `apply`.

use std::collections::BTreeMap;
use std::sync::Arc;

use bindery_core::path::{self, shape_of, stringify};
use bindery_core::{
    decode::decode, BindingError, BindingResult, Entry, ObjectType, Path, ResourceDocument, ResourceFetcher, Value,
};
use metrics::counter;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::resolver::Resolver;

fn data_key(key: &str) -> [String; 2] {
    ["data".to_string(), key.to_string()]
}

fn non_empty(name: impl Into<String>) -> Option<String> {
    Some(name.into()).filter(|s| !s.is_empty())
}

fn not_found_at(path: &Path) -> BindingError {
    BindingError::not_found(format!("path {}", path))
}

/// Required scalar field of a sequence element; strings pass through, numbers and bools are rendered.
fn element_scalar(elem: &serde_json::Map<String, Json>, field: &str, at: &str) -> BindingResult<String> {
    match elem.get(field) {
        Some(v @ (Json::String(_) | Json::Number(_) | Json::Bool(_))) => Ok(stringify(v)),
        Some(other) => Err(BindingError::TypeMismatch { path: at.to_string(), expected: "scalar", found: shape_of(other) }),
        None => Err(BindingError::TypeMismatch { path: at.to_string(), expected: "scalar", found: "absent" }),
    }
}

/// One of the six extraction strategies.
#[derive(Debug, Clone)]
pub enum Definition {
    String(StringDefinition),
    StringFromDataField(StringFromDataFieldDefinition),
    MapFromDataField(MapFromDataFieldDefinition),
    StringOfMap(StringOfMapDefinition),
    SliceOfMapsFromPath(SliceOfMapsFromPathDefinition),
    SliceOfStringsFromPath(SliceOfStringsFromPathDefinition),
}

impl Definition {
    /// Path used by callers to group definitions.
    ///
    /// Variants that read a named field off their path report the parent path.
    pub fn get_path(&self) -> &[String] {
        match self {
            Definition::String(d) => d.path.parent(),
            Definition::StringFromDataField(d) => d.path.segments(),
            Definition::MapFromDataField(d) => d.path.segments(),
            Definition::StringOfMap(d) => d.path.segments(),
            Definition::SliceOfMapsFromPath(d) => d.path.parent(),
            Definition::SliceOfStringsFromPath(d) => d.path.parent(),
        }
    }

    /// Full lookup path.
    pub fn path(&self) -> &Path {
        match self {
            Definition::String(d) => &d.path,
            Definition::StringFromDataField(d) => &d.path,
            Definition::MapFromDataField(d) => &d.path,
            Definition::StringOfMap(d) => &d.path,
            Definition::SliceOfMapsFromPath(d) => &d.path,
            Definition::SliceOfStringsFromPath(d) => &d.path,
        }
    }

    pub fn variant(&self) -> &'static str {
        match self {
            Definition::String(_) => "string",
            Definition::StringFromDataField(_) => "string_from_data_field",
            Definition::MapFromDataField(_) => "map_from_data_field",
            Definition::StringOfMap(_) => "string_of_map",
            Definition::SliceOfMapsFromPath(_) => "slice_of_maps_from_path",
            Definition::SliceOfStringsFromPath(_) => "slice_of_strings_from_path",
        }
    }

    pub fn dereferences(&self) -> bool {
        matches!(self, Definition::StringFromDataField(_) | Definition::MapFromDataField(_))
    }

    pub async fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let variant = self.variant();
        counter!("binding_apply_total", 1u64, "variant" => variant);
        debug!(variant, path = %self.path(), "applying definition");
        let res = match self {
            Definition::String(d) => d.apply(doc),
            Definition::StringFromDataField(d) => d.apply(doc).await,
            Definition::MapFromDataField(d) => d.apply(doc).await,
            Definition::StringOfMap(d) => d.apply(doc),
            Definition::SliceOfMapsFromPath(d) => d.apply(doc),
            Definition::SliceOfStringsFromPath(d) => d.apply(doc),
        };
        if let Err(e) = &res {
            counter!("binding_apply_err_total", 1u64, "variant" => variant, "error" => e.kind());
            debug!(variant, path = %self.path(), error = %e, "definition failed");
        }
        res
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(impl From<$ty> for Definition {
            fn from(d: $ty) -> Self { Definition::$variant(d) }
        })*
    };
}

impl_from_variant! {
    String => StringDefinition,
    StringFromDataField => StringFromDataFieldDefinition,
    MapFromDataField => MapFromDataFieldDefinition,
    StringOfMap => StringOfMapDefinition,
    SliceOfMapsFromPath => SliceOfMapsFromPathDefinition,
    SliceOfStringsFromPath => SliceOfStringsFromPathDefinition,
}

// ---- plain scalar ----

/// `{name: "<value>"}` for whatever sits at the path, rendered as a string.
#[derive(Debug, Clone)]
pub struct StringDefinition {
    output_name: Option<String>,
    path: Path,
}

impl StringDefinition {
    pub fn new(path: Path) -> Self {
        Self { output_name: None, path }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    fn output_name(&self) -> &str {
        self.output_name.as_deref().unwrap_or_else(|| self.path.last())
    }

    fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let val = path::field_copy(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        Ok(Value::single(self.output_name(), stringify(&val)))
    }
}

// ---- one key out of a referenced ConfigMap/Secret ----

/// Reads a resource name at the path, fetches it and returns `data[source_key]` under the empty key.
#[derive(Debug, Clone)]
pub struct StringFromDataFieldDefinition {
    resolver: Resolver,
    object_type: ObjectType,
    output_name: Option<String>,
    path: Path,
    source_key: String,
}

impl StringFromDataFieldDefinition {
    pub fn new(path: Path, object_type: ObjectType, source_key: impl Into<String>) -> Self {
        Self { resolver: Resolver::default(), object_type, output_name: None, path, source_key: source_key.into() }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.resolver = Resolver::new(fetcher);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Kept for the assembly layer; the emitted key stays empty.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    async fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let target = self.resolver.target(self.object_type)?;
        let name = path::string_field(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        let other = target.fetch(doc.namespace(), name).await?;
        let raw = path::string_field(&other.object, &data_key(&self.source_key))?.ok_or_else(|| {
            BindingError::not_found(format!("data.{} in {} {}", self.source_key, target.kind(), name))
        })?;
        let decoded = decode(self.object_type, &self.source_key, raw)?;
        Ok(Value::single("", decoded))
    }
}

// ---- whole data section of a referenced ConfigMap/Secret ----

/// Reads a resource name at the path, fetches it and returns its data section, optionally one key of it.
#[derive(Debug, Clone)]
pub struct MapFromDataFieldDefinition {
    resolver: Resolver,
    object_type: ObjectType,
    output_name: Option<String>,
    source_value: Option<String>,
    path: Path,
}

impl MapFromDataFieldDefinition {
    pub fn new(path: Path, object_type: ObjectType) -> Self {
        Self { resolver: Resolver::default(), object_type, output_name: None, source_value: None, path }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.resolver = Resolver::new(fetcher);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Keep only this data key.
    pub fn with_source_value(mut self, key: impl Into<String>) -> Self {
        self.source_value = non_empty(key);
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn source_value(&self) -> Option<&str> {
        self.source_value.as_deref()
    }

    async fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let target = self.resolver.target(self.object_type)?;
        let name = path::string_field(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        let other = target.fetch(doc.namespace(), name).await?;
        let data = path::string_mapping(&other.object, &["data".to_string()])?
            .ok_or_else(|| BindingError::not_found(format!("data in {} {}", target.kind(), name)))?;

        let mut out: BTreeMap<String, Entry> = BTreeMap::new();
        for (k, v) in data.iter() {
            if let Some(only) = &self.source_value {
                if k != only {
                    continue;
                }
            }
            out.insert(k.clone(), decode(self.object_type, k, v)?);
        }
        if out.is_empty() {
            let what = match &self.source_value {
                Some(key) => format!("data.{} in {} {}", key, target.kind(), name),
                None => format!("data entries in {} {}", target.kind(), name),
            };
            return Err(BindingError::not_found(what));
        }
        Ok(Value::new(out))
    }
}

// ---- raw subtree ----

/// `{name: <subtree>}` with the node at the path kept as-is.
#[derive(Debug, Clone)]
pub struct StringOfMapDefinition {
    output_name: Option<String>,
    path: Path,
}

impl StringOfMapDefinition {
    pub fn new(path: Path) -> Self {
        Self { output_name: None, path }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let val = path::field_ref(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        let name = self.output_name.as_deref().unwrap_or_else(|| self.path.last());
        Ok(Value::single(name, Entry::Raw(val.clone())))
    }
}

// ---- sequences of maps ----

/// `{name: {elem[source_key]: elem[source_value], ...}}` over a sequence of maps.
#[derive(Debug, Clone)]
pub struct SliceOfMapsFromPathDefinition {
    output_name: Option<String>,
    path: Path,
    source_key: String,
    source_value: String,
}

impl SliceOfMapsFromPathDefinition {
    pub fn new(path: Path, source_key: impl Into<String>, source_value: impl Into<String>) -> Self {
        Self { output_name: None, path, source_key: source_key.into(), source_value: source_value.into() }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let items = path::sequence(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        let mut out: BTreeMap<String, Option<String>> = BTreeMap::new();
        for (i, item) in items.iter().enumerate() {
            let Json::Object(elem) = item else {
                warn!(path = %self.path, index = i, found = shape_of(item), "skipping non-map element");
                continue;
            };
            let key = match elem.get(&self.source_key) {
                Some(Json::String(s)) => s.clone(),
                other => {
                    return Err(BindingError::TypeMismatch {
                        path: format!("{}[{}].{}", self.path, i, self.source_key),
                        expected: "string",
                        found: other.map(shape_of).unwrap_or("absent"),
                    })
                }
            };
            // absent or null values keep their key, unset
            let value = elem.get(&self.source_value).filter(|v| !v.is_null()).map(stringify);
            out.insert(key, value);
        }
        let name = self.output_name.as_deref().unwrap_or_else(|| self.path.last());
        Ok(Value::single(name, Entry::Map(out)))
    }
}

/// `{name: [elem[source_value], ...]}` over a sequence of maps, in sequence order.
#[derive(Debug, Clone)]
pub struct SliceOfStringsFromPathDefinition {
    output_name: Option<String>,
    path: Path,
    source_value: String,
}

impl SliceOfStringsFromPathDefinition {
    pub fn new(path: Path, source_value: impl Into<String>) -> Self {
        Self { output_name: None, path, source_value: source_value.into() }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = non_empty(name);
        self
    }

    fn apply(&self, doc: &ResourceDocument) -> BindingResult<Value> {
        let items = path::sequence(&doc.object, self.path.segments())?.ok_or_else(|| not_found_at(&self.path))?;
        let mut out: Vec<String> = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let Json::Object(elem) = item else {
                warn!(path = %self.path, index = i, found = shape_of(item), "skipping non-map element");
                continue;
            };
            let at = format!("{}[{}].{}", self.path, i, self.source_value);
            out.push(element_scalar(elem, &self.source_value, &at)?);
        }
        let name = self.output_name.as_deref().unwrap_or_else(|| self.path.last());
        Ok(Value::single(name, Entry::List(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Json) -> ResourceDocument {
        ResourceDocument::from_json(v)
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn get_path_trims_field_reading_variants() {
        let path = p("status.dbCredentials.host");
        let trimmed = &["status".to_string(), "dbCredentials".to_string()][..];
        assert_eq!(Definition::from(StringDefinition::new(path.clone())).get_path(), trimmed);
        assert_eq!(Definition::from(SliceOfMapsFromPathDefinition::new(path.clone(), "k", "v")).get_path(), trimmed);
        assert_eq!(Definition::from(SliceOfStringsFromPathDefinition::new(path.clone(), "v")).get_path(), trimmed);
        assert_eq!(Definition::from(StringOfMapDefinition::new(path.clone())).get_path(), path.segments());
        assert_eq!(
            Definition::from(MapFromDataFieldDefinition::new(path.clone(), ObjectType::Secret)).get_path(),
            path.segments()
        );
        assert_eq!(
            Definition::from(StringFromDataFieldDefinition::new(path.clone(), ObjectType::Secret, "k")).get_path(),
            path.segments()
        );
    }

    #[test]
    fn string_renders_numbers_and_honours_output_name() {
        let d = doc(json!({ "spec": { "port": 5432 } }));
        let v = StringDefinition::new(p("spec.port")).apply(&d).unwrap();
        assert_eq!(v.get("port"), Some(&Entry::Scalar("5432".into())));
        let v = StringDefinition::new(p("spec.port")).with_output_name("DB_PORT").apply(&d).unwrap();
        assert_eq!(v.keys().collect::<Vec<_>>(), vec!["DB_PORT"]);
        // empty override means unset
        let v = StringDefinition::new(p("spec.port")).with_output_name("").apply(&d).unwrap();
        assert!(v.get("port").is_some());
    }

    #[test]
    fn string_of_map_keeps_subtree() {
        let d = doc(json!({ "status": { "conn": { "host": "h", "port": 1 } } }));
        let v = StringOfMapDefinition::new(p("status.conn")).apply(&d).unwrap();
        assert_eq!(v.get("conn"), Some(&Entry::Raw(json!({ "host": "h", "port": 1 }))));
    }

    #[test]
    fn slice_of_maps_rejects_non_string_key() {
        let d = doc(json!({ "spec": { "env": [ { "name": 7, "value": "1" } ] } }));
        let err = SliceOfMapsFromPathDefinition::new(p("spec.env"), "name", "value").apply(&d).unwrap_err();
        match err {
            BindingError::TypeMismatch { path, expected, found } => {
                assert_eq!(path, ".spec.env[0].name");
                assert_eq!(expected, "string");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected {other}"),
        }
        let d = doc(json!({ "spec": { "env": [ { "value": "1" } ] } }));
        let err = SliceOfMapsFromPathDefinition::new(p("spec.env"), "name", "value").apply(&d).unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { found: "absent", .. }));
    }

    #[test]
    fn slice_of_maps_keeps_keys_without_value() {
        let d = doc(json!({ "spec": { "env": [
            { "name": "A", "value": "1" },
            { "name": "B", "valueFrom": { "secretKeyRef": { "name": "s", "key": "k" } } },
            { "name": "C", "value": null },
            { "name": "D", "value": 8080 },
        ] } }));
        let v = SliceOfMapsFromPathDefinition::new(p("spec.env"), "name", "value").apply(&d).unwrap();
        let want: BTreeMap<String, Option<String>> = [
            ("A".to_string(), Some("1".to_string())),
            ("B".to_string(), None),
            ("C".to_string(), None),
            ("D".to_string(), Some("8080".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(v.get("env"), Some(&Entry::Map(want)));
    }

    #[test]
    fn slice_of_strings_rejects_composite_value() {
        let d = doc(json!({ "spec": { "ports": [ { "port": { "n": 1 } } ] } }));
        let err = SliceOfStringsFromPathDefinition::new(p("spec.ports"), "port").apply(&d).unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { found: "mapping", .. }), "{err}");
    }

    #[test]
    fn sequence_at_wrong_shape_is_mismatch() {
        let d = doc(json!({ "spec": { "env": "nope" } }));
        let err = SliceOfStringsFromPathDefinition::new(p("spec.env"), "value").apply(&d).unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { expected: "sequence", .. }));
    }
}
