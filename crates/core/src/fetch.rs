//! Boundary to whatever client fetches secondary resources.

use std::fmt;

use async_trait::async_trait;

use crate::ResourceDocument;

/// Kinds of secondary resource a definition may dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConfigMaps,
    Secrets,
}

impl ResourceKind {
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMaps => "configmaps",
            ResourceKind::Secrets => "secrets",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound { kind: ResourceKind, namespace: String, name: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fetch one namespaced resource by kind and name.
///
/// Implementations own retries, caching, timeouts and authentication; callers
/// issue exactly one `get` per dereference.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ResourceDocument, FetchError>;
}
