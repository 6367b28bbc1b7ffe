//! Follow a resource name to the ConfigMap or Secret it names.

use std::fmt;
use std::sync::Arc;

use bindery_core::{BindingError, BindingResult, FetchError, ObjectType, ResourceDocument, ResourceFetcher, ResourceKind};
use tracing::debug;

/// Optional handle on the fetch client. Cheap to clone and share between definitions.
#[derive(Clone, Default)]
pub struct Resolver {
    fetcher: Option<Arc<dyn ResourceFetcher>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("configured", &self.fetcher.is_some()).finish()
    }
}

/// A validated fetch target: client present and object type dereferenceable.
pub struct Target<'a> {
    fetcher: &'a dyn ResourceFetcher,
    kind: ResourceKind,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self { fetcher: Some(fetcher) }
    }

    /// Checks that do not depend on the document: client first, then object type.
    pub fn target(&self, object_type: ObjectType) -> BindingResult<Target<'_>> {
        let fetcher = self
            .fetcher
            .as_deref()
            .ok_or(BindingError::MissingDependency("a fetch client is required to dereference resources"))?;
        let kind = object_type
            .resource_kind()
            .ok_or(BindingError::UnsupportedObjectType(object_type))?;
        Ok(Target { fetcher, kind })
    }

    pub async fn resolve(
        &self,
        object_type: ObjectType,
        namespace: Option<&str>,
        name: &str,
    ) -> BindingResult<ResourceDocument> {
        self.target(object_type)?.fetch(namespace, name).await
    }
}

impl Target<'_> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Exactly one fetch, scoped to the source document's namespace.
    pub async fn fetch(&self, namespace: Option<&str>, name: &str) -> BindingResult<ResourceDocument> {
        let namespace = namespace.ok_or_else(|| BindingError::not_found("namespace of the source document"))?;
        if name.is_empty() {
            return Err(BindingError::not_found(format!("{} with an empty name", self.kind)));
        }
        debug!(kind = %self.kind, ns = %namespace, name = %name, "dereferencing");
        match self.fetcher.get(self.kind, namespace, name).await {
            Ok(doc) => Ok(doc),
            Err(FetchError::NotFound { kind, namespace, name }) => {
                Err(BindingError::not_found(format!("{} {}/{}", kind, namespace, name)))
            }
            Err(FetchError::Other(source)) => Err(BindingError::Fetch {
                what: format!("{} {}/{}", self.kind, namespace, name),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Knows a single Secret `prod/creds`.
    #[derive(Default)]
    struct OneSecret {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceFetcher for OneSecret {
        async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ResourceDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if kind == ResourceKind::Secrets && namespace == "prod" && name == "creds" {
                return Ok(ResourceDocument::from_json(serde_json::json!({
                    "metadata": { "name": "creds", "namespace": "prod" },
                    "data": { "user": "YWxpY2U=" },
                })));
            }
            Err(FetchError::NotFound { kind, namespace: namespace.to_string(), name: name.to_string() })
        }
    }

    #[tokio::test]
    async fn resolve_fetches_once_in_namespace() {
        let fetcher = Arc::new(OneSecret::default());
        let resolver = Resolver::new(fetcher.clone());
        let doc = resolver.resolve(ObjectType::Secret, Some("prod"), "creds").await.unwrap();
        assert_eq!(doc.name(), Some("creds"));
        assert_eq!(doc.object["data"]["user"], "YWxpY2U=");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_without_client_is_missing_dependency() {
        let err = Resolver::default().resolve(ObjectType::Secret, Some("prod"), "creds").await.unwrap_err();
        assert!(matches!(err, BindingError::MissingDependency(_)), "{err}");
    }

    #[tokio::test]
    async fn resolve_rejects_non_dereferenceable_types() {
        let fetcher = Arc::new(OneSecret::default());
        let resolver = Resolver::new(fetcher.clone());
        for ty in [ObjectType::String, ObjectType::Empty] {
            let err = resolver.resolve(ty, Some("prod"), "creds").await.unwrap_err();
            assert!(matches!(err, BindingError::UnsupportedObjectType(t) if t == ty), "{err}");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_maps_absence_to_not_found() {
        let fetcher = Arc::new(OneSecret::default());
        let resolver = Resolver::new(fetcher.clone());
        // wrong kind, wrong namespace
        assert!(matches!(resolver.resolve(ObjectType::ConfigMap, Some("prod"), "creds").await, Err(BindingError::NotFound(_))));
        assert!(matches!(resolver.resolve(ObjectType::Secret, Some("dev"), "creds").await, Err(BindingError::NotFound(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        // no namespace or empty name never reaches the client
        assert!(matches!(resolver.resolve(ObjectType::Secret, None, "creds").await, Err(BindingError::NotFound(_))));
        assert!(matches!(resolver.resolve(ObjectType::Secret, Some("prod"), "").await, Err(BindingError::NotFound(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
