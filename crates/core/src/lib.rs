//! Bindery core types: resource documents, paths, extraction values and errors.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod decode;
pub mod error;
pub mod fetch;
pub mod path;
pub mod value;

pub use error::{BindingError, BindingResult};
pub use fetch::{FetchError, ResourceFetcher, ResourceKind};
pub use path::{Path, PathError};
pub use value::{Entry, Value};

pub mod prelude {
    pub use super::{
        BindingError, BindingResult, ElementType, Entry, FetchError, ObjectType, Path, ResourceDocument,
        ResourceFetcher, ResourceKind, Value,
    };
}

/// How the value found at a path is interpreted.
///
/// `Empty` asks for the default interpretation of whatever definition uses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    ConfigMap,
    Secret,
    #[serde(rename = "string")]
    String,
    #[default]
    #[serde(rename = "")]
    Empty,
}

impl ObjectType {
    /// Secondary resource kind to fetch, if this type names one.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            ObjectType::ConfigMap => Some(ResourceKind::ConfigMaps),
            ObjectType::Secret => Some(ResourceKind::Secrets),
            ObjectType::String | ObjectType::Empty => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::ConfigMap => "ConfigMap",
            ObjectType::Secret => "Secret",
            ObjectType::String => "string",
            ObjectType::Empty => "",
        }
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ConfigMap" => Ok(ObjectType::ConfigMap),
            "Secret" => Ok(ObjectType::Secret),
            "string" => Ok(ObjectType::String),
            "" => Ok(ObjectType::Empty),
            other => Err(format!("unknown objectType {:?} (expect ConfigMap, Secret or string)", other)),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the node found at a path; picks a definition variant at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Map,
    SliceOfMaps,
    SliceOfStrings,
    String,
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "map" => Ok(ElementType::Map),
            "sliceOfMaps" => Ok(ElementType::SliceOfMaps),
            "sliceOfStrings" => Ok(ElementType::SliceOfStrings),
            "string" => Ok(ElementType::String),
            other => Err(format!(
                "unknown elementType {:?} (expect map, sliceOfMaps, sliceOfStrings or string)",
                other
            )),
        }
    }
}

/// A live resource as a JSON tree plus the namespace it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub namespace: Option<String>,
    pub object: serde_json::Value,
}

impl ResourceDocument {
    /// Wrap a raw object, taking the namespace from `metadata.namespace`.
    pub fn from_json(object: serde_json::Value) -> Self {
        let namespace = object
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        Self { namespace, object }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.object.get("metadata").and_then(|m| m.get("name")).and_then(|v| v.as_str())
    }
}
