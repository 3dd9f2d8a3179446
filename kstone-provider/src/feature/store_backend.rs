//! Inspection tasks stored as declarative resources
//!
//! Each task is an inspection resource named `<cluster>-<feature>` in the
//! cluster's namespace, so existence checks are a single get.

use super::{BackendConnector, InspectionBackend, TaskCollector};
use crate::cluster::synthesis::{OWNER_API_VERSION, OWNER_KIND};
use crate::document;
use crate::error::{ProviderError, ProviderResult};
use crate::store::{ResourceKind, ResourceStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kstone_common::{EtcdCluster, InspectionTask};
use serde_json::{json, Value};
use std::sync::Arc;

pub const LABEL_CLUSTER_NAME: &str = "clusterName";
pub const LABEL_INSPECTION_TYPE: &str = "inspectionType";

/// Backend keeping tasks in a [`ResourceStore`]
pub struct StoreInspectionBackend {
    store: Arc<dyn ResourceStore>,
    kind: ResourceKind,
    collector: Arc<dyn TaskCollector>,
}

impl StoreInspectionBackend {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        kind: ResourceKind,
        collector: Arc<dyn TaskCollector>,
    ) -> Self {
        Self {
            store,
            kind,
            collector,
        }
    }

    /// Resource document describing the task of `feature` for `cluster`
    pub fn task_document(&self, cluster: &EtcdCluster, task: &InspectionTask) -> Value {
        let mut metadata = json!({
            "name": task.name,
            "namespace": task.namespace,
            "labels": {
                LABEL_CLUSTER_NAME: task.cluster_name,
                LABEL_INSPECTION_TYPE: task.feature,
            },
        });

        if let Some(uid) = cluster.metadata.uid.as_deref() {
            metadata["ownerReferences"] = json!([{
                "apiVersion": OWNER_API_VERSION,
                "kind": OWNER_KIND,
                "name": cluster.name(),
                "uid": uid,
                "controller": true,
                "blockOwnerDeletion": true,
            }]);
        }

        json!({
            "apiVersion": self.kind.api_version(),
            "kind": self.kind.kind,
            "metadata": metadata,
            "spec": {
                "clusterName": task.cluster_name,
                "inspectionType": task.feature,
            },
        })
    }
}

/// Read a task back from its resource document
pub fn task_from_document(doc: &Value) -> ProviderResult<InspectionTask> {
    let required = |path: &[&str]| -> ProviderResult<String> {
        document::nested_str(doc, path)?
            .map(String::from)
            .ok_or_else(|| ProviderError::malformed(path, "a string"))
    };

    let created_at = match document::nested_str(doc, &["metadata", "creationTimestamp"])? {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map_err(|_| ProviderError::malformed(&["metadata", "creationTimestamp"], "an RFC 3339 time"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    Ok(InspectionTask {
        name: required(&["metadata", "name"])?,
        namespace: required(&["metadata", "namespace"])?,
        cluster_name: required(&["spec", "clusterName"])?,
        feature: required(&["spec", "inspectionType"])?,
        created_at,
    })
}

#[async_trait]
impl InspectionBackend for StoreInspectionBackend {
    async fn exists(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<bool> {
        let name = InspectionTask::task_name(cluster.name(), feature);
        match self.store.get(&self.kind, cluster.namespace(), &name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn enqueue(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<InspectionTask> {
        let task = InspectionTask::new(cluster, feature);
        let doc = self.task_document(cluster, &task);
        self.store.create(&self.kind, &task.namespace, &doc).await?;
        Ok(task)
    }

    async fn collect(&self, task: &InspectionTask) -> ProviderResult<()> {
        self.collector.collect(task).await.map_err(|e| {
            tracing::warn!(task = %task.name, feature = %task.feature, "Inspection collection failed: {}", e);
            e
        })
    }
}

/// Connector producing a [`StoreInspectionBackend`]
#[derive(Clone)]
pub struct StoreBackendConnector {
    store: Arc<dyn ResourceStore>,
    kind: ResourceKind,
    collector: Arc<dyn TaskCollector>,
}

impl StoreBackendConnector {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        kind: ResourceKind,
        collector: Arc<dyn TaskCollector>,
    ) -> Self {
        Self {
            store,
            kind,
            collector,
        }
    }
}

#[async_trait]
impl BackendConnector for StoreBackendConnector {
    async fn connect(&self) -> ProviderResult<Arc<dyn InspectionBackend>> {
        tracing::debug!(kind = %self.kind.kind, "Using store inspection backend");
        Ok(Arc::new(StoreInspectionBackend::new(
            self.store.clone(),
            self.kind.clone(),
            self.collector.clone(),
        )))
    }
}
