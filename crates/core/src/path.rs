//! Paths into resource documents and the typed reads built on them.
//!
//! Every read distinguishes three outcomes:
//! - `Ok(Some(_))`: the node exists and has the expected shape
//! - `Ok(None)`: some segment of the path does not resolve
//! - `Err(TypeMismatch)`: a node exists but is not what the read needs
//!
//! Walking through an intermediate JSON `null` counts as absence; walking through any
//! other non-mapping node is a type mismatch.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as Json;
use smallvec::SmallVec;

use crate::error::{BindingError, BindingResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("invalid path segment {0:?} (expect ASCII alphanumerics, '_' or '-')")]
    InvalidSegment(String),
    #[error("unsupported path expression {0:?} (wildcards, filters and indices are not allowed)")]
    Unsupported(String),
}

/// Ordered, non-empty list of mapping keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: SmallVec<[String; 4]>,
}

impl Path {
    pub fn new<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: SmallVec<[String; 4]> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if let Some(bad) = segments.iter().find(|s| s.is_empty()) {
            return Err(PathError::InvalidSegment(bad.clone()));
        }
        Ok(Self { segments })
    }

    /// Parse the user-facing forms `{.spec.host}`, `.spec.host` and `spec.host`.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let trimmed = expr.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        if inner.contains(['?', '*', '[', ']', '@', '$']) {
            return Err(PathError::Unsupported(expr.to_string()));
        }
        let s = inner.strip_prefix('.').unwrap_or(inner);
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments: SmallVec<[String; 4]> = SmallVec::new();
        for seg in s.split('.') {
            let valid = !seg.is_empty()
                && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(PathError::InvalidSegment(seg.to_string()));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment; always present since paths are never empty.
    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// All segments but the last one.
    pub fn parent(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in self.segments.iter() {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Human name of a JSON node's shape, used in mismatch errors.
pub fn shape_of(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "sequence",
        Json::Object(_) => "mapping",
    }
}

fn render(segments: &[String]) -> String {
    segments.iter().map(|s| format!(".{}", s)).collect()
}

fn mismatch(segments: &[String], expected: &'static str, found: &Json) -> BindingError {
    BindingError::TypeMismatch { path: render(segments), expected, found: shape_of(found) }
}

/// Borrow the node at `segments` without copying it.
pub fn field_ref<'a>(root: &'a Json, segments: &[String]) -> BindingResult<Option<&'a Json>> {
    let mut cur = root;
    for (i, seg) in segments.iter().enumerate() {
        match cur {
            Json::Null => return Ok(None),
            Json::Object(map) => match map.get(seg) {
                Some(next) => cur = next,
                None => return Ok(None),
            },
            other => return Err(mismatch(&segments[..i], "mapping", other)),
        }
    }
    Ok(Some(cur))
}

/// Owned copy of the node at `segments`.
pub fn field_copy(root: &Json, segments: &[String]) -> BindingResult<Option<Json>> {
    Ok(field_ref(root, segments)?.cloned())
}

pub fn string_field<'a>(root: &'a Json, segments: &[String]) -> BindingResult<Option<&'a str>> {
    match field_ref(root, segments)? {
        None => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(mismatch(segments, "string", other)),
    }
}

pub fn sequence<'a>(root: &'a Json, segments: &[String]) -> BindingResult<Option<&'a [Json]>> {
    match field_ref(root, segments)? {
        None => Ok(None),
        Some(Json::Array(items)) => Ok(Some(items.as_slice())),
        Some(other) => Err(mismatch(segments, "sequence", other)),
    }
}

/// Mapping of string to string; any non-string value is a mismatch.
pub fn string_mapping(root: &Json, segments: &[String]) -> BindingResult<Option<BTreeMap<String, String>>> {
    let map = match field_ref(root, segments)? {
        None => return Ok(None),
        Some(Json::Object(map)) => map,
        Some(other) => return Err(mismatch(segments, "mapping", other)),
    };
    let mut out = BTreeMap::new();
    for (k, v) in map.iter() {
        match v {
            Json::String(s) => {
                out.insert(k.clone(), s.clone());
            }
            other => {
                let mut at: Vec<String> = segments.to_vec();
                at.push(k.clone());
                return Err(mismatch(&at, "string", other));
            }
        }
    }
    Ok(Some(out))
}

/// Generic string conversion: scalars render naturally, everything else as compact JSON.
pub fn stringify(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(p: &str) -> Vec<String> {
        p.split('.').map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_accepts_user_forms() {
        let want = Path::new(["spec", "host"]).unwrap();
        assert_eq!(Path::parse("{.spec.host}").unwrap(), want);
        assert_eq!(Path::parse(".spec.host").unwrap(), want);
        assert_eq!(Path::parse("spec.host").unwrap(), want);
        assert_eq!(want.to_string(), ".spec.host");
        assert_eq!(want.last(), "host");
        assert_eq!(want.parent(), &["spec".to_string()]);
    }

    #[test]
    fn parse_rejects_empty_and_complex() {
        assert_eq!(Path::parse(""), Err(PathError::Empty));
        assert_eq!(Path::parse("{.}"), Err(PathError::Empty));
        assert!(matches!(Path::parse("spec.*"), Err(PathError::Unsupported(_))));
        assert!(matches!(Path::parse("spec.ports[0]"), Err(PathError::Unsupported(_))));
        assert!(matches!(Path::parse("spec..host"), Err(PathError::InvalidSegment(_))));
        assert!(Path::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn reads_distinguish_absent_from_mismatch() {
        let doc = json!({ "spec": { "host": "db.local", "port": 5432, "tags": ["a"], "gone": null } });
        assert_eq!(string_field(&doc, &segs("spec.host")).unwrap(), Some("db.local"));
        assert_eq!(string_field(&doc, &segs("spec.missing")).unwrap(), None);
        assert_eq!(string_field(&doc, &segs("spec.gone.deeper")).unwrap(), None);
        let err = string_field(&doc, &segs("spec.port")).unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { expected: "string", found: "number", .. }), "{err}");
        // walking through a string is a mismatch, not absence
        let err = field_ref(&doc, &segs("spec.host.x")).unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { expected: "mapping", found: "string", .. }));
        assert_eq!(sequence(&doc, &segs("spec.tags")).unwrap().map(|s| s.len()), Some(1));
        assert!(sequence(&doc, &segs("spec.host")).is_err());
    }

    #[test]
    fn string_mapping_rejects_non_string_values() {
        let doc = json!({ "data": { "a": "1", "b": 2 } });
        let err = string_mapping(&doc, &segs("data")).unwrap_err();
        assert!(err.to_string().contains(".data.b"), "{err}");
        let ok = json!({ "data": { "a": "1" } });
        assert_eq!(string_mapping(&ok, &segs("data")).unwrap().unwrap()["a"], "1");
    }

    #[test]
    fn stringify_formats_scalars_and_composites() {
        assert_eq!(stringify(&json!("x")), "x");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
