//! Remote resource store
//!
//! The declarative store holding the etcd-operator resources. Documents are
//! kept untyped at this boundary because their schema belongs to the remote
//! resource kind and version.

use crate::document;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Group/version/kind of a namespaced remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl ResourceKind {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[cfg(feature = "kubernetes")]
    pub fn api_resource(&self) -> kube::discovery::ApiResource {
        kube::discovery::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// CRUD over namespaced, versioned declarative resources
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the current document; `ResourceNotFound` if absent
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ProviderResult<Value>;

    /// Create a document; `AlreadyExists` if the name is taken
    async fn create(&self, kind: &ResourceKind, namespace: &str, doc: &Value)
        -> ProviderResult<Value>;

    /// Replace an existing document wholesale
    async fn update(&self, kind: &ResourceKind, namespace: &str, doc: &Value)
        -> ProviderResult<Value>;
}

fn document_name<'a>(doc: &'a Value) -> ProviderResult<&'a str> {
    document::nested_str(doc, &["metadata", "name"])?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProviderError::malformed(&["metadata", "name"], "a non-empty string"))
}

/// Store backed by the Kubernetes API through dynamic objects
#[cfg(feature = "kubernetes")]
#[derive(Clone)]
pub struct KubeResourceStore {
    client: kube::Client,
}

#[cfg(feature = "kubernetes")]
impl KubeResourceStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(
        &self,
        kind: &ResourceKind,
        namespace: &str,
    ) -> kube::Api<kube::api::DynamicObject> {
        kube::Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

#[cfg(feature = "kubernetes")]
#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ProviderResult<Value> {
        let object = self
            .api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| ProviderError::from_kube(e, &kind.kind, namespace, name))?;

        Ok(serde_json::to_value(object)?)
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        doc: &Value,
    ) -> ProviderResult<Value> {
        use kube::api::{DynamicObject, PostParams};

        let name = document_name(doc)?;
        let object: DynamicObject = serde_json::from_value(doc.clone())?;
        let created = self
            .api(kind, namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| ProviderError::from_kube(e, &kind.kind, namespace, name))?;

        tracing::debug!(kind = %kind.kind, name = %name, namespace = %namespace, "Created resource");

        Ok(serde_json::to_value(created)?)
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        doc: &Value,
    ) -> ProviderResult<Value> {
        use kube::api::{DynamicObject, PostParams};

        let name = document_name(doc)?;
        let object: DynamicObject = serde_json::from_value(doc.clone())?;
        let replaced = self
            .api(kind, namespace)
            .replace(name, &PostParams::default(), &object)
            .await
            .map_err(|e| ProviderError::from_kube(e, &kind.kind, namespace, name))?;

        tracing::debug!(kind = %kind.kind, name = %name, namespace = %namespace, "Replaced resource");

        Ok(serde_json::to_value(replaced)?)
    }
}

type StoreKey = (ResourceKind, String, String);

/// In-process store with resourceVersion bookkeeping
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<StoreKey, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a document directly, bypassing create semantics
    pub async fn insert(&self, kind: &ResourceKind, namespace: &str, doc: Value) -> ProviderResult<()> {
        let name = document_name(&doc)?.to_string();
        let mut objects = self.objects.write().await;
        objects.insert((kind.clone(), namespace.to_string(), name), doc);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn not_found(kind: &ResourceKind, namespace: &str, name: &str) -> ProviderError {
        ProviderError::ResourceNotFound {
            kind: kind.kind.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn bump_version(doc: &mut Value, version: u64) -> ProviderResult<()> {
        document::set_nested(
            doc,
            Value::String(version.to_string()),
            &["metadata", "resourceVersion"],
        )
    }

    fn current_version(doc: &Value) -> ProviderResult<u64> {
        Ok(document::nested_str(doc, &["metadata", "resourceVersion"])?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ProviderResult<Value> {
        let objects = self.objects.read().await;
        objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(kind, namespace, name))
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        doc: &Value,
    ) -> ProviderResult<Value> {
        let name = document_name(doc)?.to_string();
        let mut objects = self.objects.write().await;
        let key = (kind.clone(), namespace.to_string(), name.clone());

        if objects.contains_key(&key) {
            return Err(ProviderError::AlreadyExists {
                kind: kind.kind.clone(),
                name,
                namespace: namespace.to_string(),
            });
        }

        let mut stored = doc.clone();
        Self::bump_version(&mut stored, 1)?;
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        doc: &Value,
    ) -> ProviderResult<Value> {
        let name = document_name(doc)?.to_string();
        let mut objects = self.objects.write().await;
        let key = (kind.clone(), namespace.to_string(), name.clone());

        let existing = objects
            .get(&key)
            .ok_or_else(|| Self::not_found(kind, namespace, &name))?;
        let current = Self::current_version(existing)?;

        // A stale resourceVersion loses the write, an absent one overwrites.
        if let Some(requested) = document::nested_str(doc, &["metadata", "resourceVersion"])? {
            if requested != current.to_string() {
                return Err(ProviderError::Conflict(format!(
                    "{}/{} was modified (resourceVersion {} != {})",
                    kind.kind, name, requested, current
                )));
            }
        }

        let mut stored = doc.clone();
        Self::bump_version(&mut stored, current + 1)?;
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}
