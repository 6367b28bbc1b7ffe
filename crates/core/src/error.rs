//! Error taxonomy shared by every extraction step.

use crate::ObjectType;

/// Errors surfaced by `Definition::apply` and the pieces it composes.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// A path inside a document, or a referenced resource, does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A node exists but has the wrong shape.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("object type {0:?} cannot be dereferenced")]
    UnsupportedObjectType(ObjectType),
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
    #[error("decoding {key}: {reason}")]
    Decode { key: String, reason: String },
    /// The fetch client failed for a reason other than absence.
    #[error("fetching {what}")]
    Fetch {
        what: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BindingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnsupportedObjectType(_) => "unsupported_object_type",
            Self::MissingDependency(_) => "missing_dependency",
            Self::Decode { .. } => "decode",
            Self::Fetch { .. } => "fetch",
        }
    }
}

pub type BindingResult<T> = Result<T, BindingError>;
