//! Turning binding rules into definitions.

use std::str::FromStr;
use std::sync::Arc;

use bindery_core::{ElementType, ObjectType, Path, PathError, ResourceFetcher};
use serde::{Deserialize, Serialize};

use crate::definition::{
    Definition, MapFromDataFieldDefinition, SliceOfMapsFromPathDefinition, SliceOfStringsFromPathDefinition,
    StringDefinition, StringFromDataFieldDefinition, StringOfMapDefinition,
};
use crate::resolver::Resolver;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("elementType {element_type:?} requires {field}")]
    MissingField { element_type: ElementType, field: &'static str },
    #[error("unknown rule key {0:?}")]
    UnknownKey(String),
    #[error("invalid rule: {0}")]
    Invalid(String),
}

/// Anything that can produce a compiled definition.
pub trait DefinitionBuilder {
    fn build(&self) -> Result<Definition, BuildError>;
}

/// Declarative description of one binding, as written by users.
///
/// Variant selection:
/// - `objectType` ConfigMap/Secret with `sourceKey` reads one data key of the named resource
/// - `objectType` ConfigMap/Secret without it reads the whole data section (`sourceValue` filters)
/// - otherwise `elementType` picks sequence, map or plain string handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRule {
    pub path: String,
    #[serde(default)]
    pub object_type: ObjectType,
    #[serde(default)]
    pub element_type: Option<ElementType>,
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub source_value: Option<String>,
    #[serde(default, rename = "name")]
    pub output_name: Option<String>,
    #[serde(skip)]
    resolver: Resolver,
}

impl BindingRule {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.resolver = Resolver::new(fetcher);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }
}

fn present(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl DefinitionBuilder for BindingRule {
    fn build(&self) -> Result<Definition, BuildError> {
        let path = Path::parse(&self.path)?;
        let name = self.output_name.clone().unwrap_or_default();

        if self.object_type.resource_kind().is_some() {
            let def: Definition = match present(&self.source_key) {
                Some(key) => StringFromDataFieldDefinition::new(path, self.object_type, key)
                    .with_resolver(self.resolver.clone())
                    .with_output_name(name)
                    .into(),
                None => {
                    let mut d = MapFromDataFieldDefinition::new(path, self.object_type)
                        .with_resolver(self.resolver.clone())
                        .with_output_name(name);
                    if let Some(only) = present(&self.source_value) {
                        d = d.with_source_value(only);
                    }
                    d.into()
                }
            };
            return Ok(def);
        }

        let def: Definition = match self.element_type {
            Some(element_type @ ElementType::SliceOfMaps) => {
                let key = present(&self.source_key).ok_or(BuildError::MissingField { element_type, field: "sourceKey" })?;
                let value =
                    present(&self.source_value).ok_or(BuildError::MissingField { element_type, field: "sourceValue" })?;
                SliceOfMapsFromPathDefinition::new(path, key, value).with_output_name(name).into()
            }
            Some(element_type @ ElementType::SliceOfStrings) => {
                let value =
                    present(&self.source_value).ok_or(BuildError::MissingField { element_type, field: "sourceValue" })?;
                SliceOfStringsFromPathDefinition::new(path, value).with_output_name(name).into()
            }
            Some(ElementType::Map) => StringOfMapDefinition::new(path).with_output_name(name).into(),
            Some(ElementType::String) | None => StringDefinition::new(path).with_output_name(name).into(),
        };
        Ok(def)
    }
}

/// Parses `path={.spec.host},objectType=Secret,sourceKey=password,name=DB_PASS`.
impl FromStr for BindingRule {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rule = BindingRule::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| BuildError::Invalid(format!("expected key=value, got {:?}", part)))?;
            let v = v.trim();
            match k.trim() {
                "path" => rule.path = v.to_string(),
                "objectType" => rule.object_type = v.parse().map_err(BuildError::Invalid)?,
                "elementType" => rule.element_type = Some(v.parse().map_err(BuildError::Invalid)?),
                "sourceKey" => rule.source_key = Some(v.to_string()),
                "sourceValue" => rule.source_value = Some(v.to_string()),
                "name" => rule.output_name = Some(v.to_string()),
                other => return Err(BuildError::UnknownKey(other.to_string())),
            }
        }
        if rule.path.is_empty() {
            return Err(BuildError::Path(PathError::Empty));
        }
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(s: &str) -> Definition {
        s.parse::<BindingRule>().unwrap().build().unwrap()
    }

    #[test]
    fn selects_variant_from_rule() {
        assert_eq!(build("path={.spec.host}").variant(), "string");
        assert_eq!(build("path=spec.host,elementType=string").variant(), "string");
        assert_eq!(build("path=status.conn,elementType=map").variant(), "string_of_map");
        assert_eq!(build("path=status.secret,objectType=Secret").variant(), "map_from_data_field");
        assert_eq!(build("path=status.cm,objectType=ConfigMap,sourceValue=url").variant(), "map_from_data_field");
        assert_eq!(build("path=status.secret,objectType=Secret,sourceKey=password").variant(), "string_from_data_field");
        assert_eq!(
            build("path=spec.env,elementType=sliceOfMaps,sourceKey=name,sourceValue=value").variant(),
            "slice_of_maps_from_path"
        );
        assert_eq!(build("path=spec.ports,elementType=sliceOfStrings,sourceValue=port").variant(), "slice_of_strings_from_path");
        // objectType string keeps plain path handling
        assert_eq!(build("path=spec.host,objectType=string").variant(), "string");
    }

    #[test]
    fn slice_rules_need_source_fields() {
        let rule: BindingRule = "path=spec.env,elementType=sliceOfMaps,sourceValue=value".parse().unwrap();
        let err = rule.build().unwrap_err();
        assert!(matches!(err, BuildError::MissingField { field: "sourceKey", .. }), "{err}");
        let rule: BindingRule = "path=spec.env,elementType=sliceOfStrings".parse().unwrap();
        assert!(matches!(rule.build(), Err(BuildError::MissingField { field: "sourceValue", .. })));
    }

    #[test]
    fn rejects_bad_rules() {
        assert!(matches!("path=spec.x,colour=red".parse::<BindingRule>(), Err(BuildError::UnknownKey(_))));
        assert!(matches!("objectType=Secret".parse::<BindingRule>(), Err(BuildError::Path(PathError::Empty))));
        assert!(matches!("path=spec.x,objectType=Vault".parse::<BindingRule>(), Err(BuildError::Invalid(_))));
        assert!(matches!(BindingRule::new("spec[0]").build(), Err(BuildError::Path(PathError::Unsupported(_)))));
    }

    #[test]
    fn deserialises_from_json() {
        let rule: BindingRule = serde_json::from_value(serde_json::json!({
            "path": "{.status.secret}",
            "objectType": "Secret",
            "sourceKey": "password",
            "name": "DB_PASS",
        }))
        .unwrap();
        assert_eq!(rule.object_type, ObjectType::Secret);
        assert_eq!(rule.output_name.as_deref(), Some("DB_PASS"));
        assert_eq!(rule.build().unwrap().variant(), "string_from_data_field");
    }
}
