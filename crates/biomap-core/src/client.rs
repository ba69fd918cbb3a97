//! Identifier resolution collaborators
//!
//! Concrete biological clients live outside this workspace. Each
//! [`MappingResource`](crate::MappingResource) is served by one
//! [`IdentifierClient`], looked up by resource id in a [`ClientRegistry`].

use crate::mapping::{MappedTarget, MappingPath};
use crate::types::ResourceId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Failure reported by an upstream client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    /// Upstream message, kept verbatim
    pub message: String,
}

impl ClientError {
    /// Error carrying `message`
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Translates one identifier through one mapping resource
#[async_trait]
pub trait IdentifierClient: Send + Sync + fmt::Debug {
    /// Resolve `identifier`; `params` are the resource's configured parameters
    async fn resolve(
        &self,
        identifier: &str,
        params: &Value,
    ) -> Result<Vec<MappedTarget>, ClientError>;
}

/// Resolves an identifier along a whole path
///
/// The cache manager only sees this trait, so the same single-flight logic
/// works over any chain implementation.
#[async_trait]
pub trait PathResolver: Send + Sync + fmt::Debug {
    /// Targets reached from `identifier` along `path`
    async fn resolve_path(
        &self,
        identifier: &str,
        path: &MappingPath,
    ) -> Result<Vec<MappedTarget>, ClientError>;
}

/// Clients keyed by the resource id they serve
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<ResourceId, Arc<dyn IdentifierClient>>,
}

impl ClientRegistry {
    /// Registry with no clients
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; replaces any previous client for the resource
    pub fn register(&mut self, resource: impl Into<ResourceId>, client: Arc<dyn IdentifierClient>) {
        self.clients.insert(resource.into(), client);
    }

    /// Builder form of [`ClientRegistry::register`]
    #[must_use]
    pub fn with_client(
        mut self,
        resource: impl Into<ResourceId>,
        client: Arc<dyn IdentifierClient>,
    ) -> Self {
        self.register(resource, client);
        self
    }

    /// Client serving `resource`
    #[inline]
    #[must_use]
    pub fn get(&self, resource: &ResourceId) -> Option<Arc<dyn IdentifierClient>> {
        self.clients.get(resource).cloned()
    }

    /// Number of registered resources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// No client registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Upper;

    #[async_trait]
    impl IdentifierClient for Upper {
        async fn resolve(
            &self,
            identifier: &str,
            _params: &Value,
        ) -> Result<Vec<MappedTarget>, ClientError> {
            Ok(vec![MappedTarget::exact(identifier.to_uppercase())])
        }
    }

    #[tokio::test]
    async fn registry_returns_registered_client() {
        let registry = ClientRegistry::new().with_client("upper", Arc::new(Upper));
        let client = registry.get(&ResourceId::new("upper")).unwrap();
        let targets = client.resolve("abc", &Value::Null).await.unwrap();
        assert_eq!(targets, vec![MappedTarget::exact("ABC")]);
        assert!(registry.get(&ResourceId::new("missing")).is_none());
        assert_eq!(registry.len(), 1);
    }
}
