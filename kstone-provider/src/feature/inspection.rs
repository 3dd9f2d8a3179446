//! Inspection-backed feature provider
//!
//! The backend connection is created lazily by the first `init` and shared
//! afterwards. Concurrent first calls wait on the same initialization.

use super::{FeatureContext, FeatureProvider, InspectionBackend};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use kstone_common::{EtcdCluster, InspectionTask};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Feature that schedules and collects inspection tasks by name
pub struct InspectionFeature {
    name: String,
    ctx: FeatureContext,
    backend: OnceCell<Arc<dyn InspectionBackend>>,
}

impl InspectionFeature {
    pub fn new(name: &str, ctx: FeatureContext) -> Self {
        Self {
            name: name.to_string(),
            ctx,
            backend: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    fn backend(&self) -> ProviderResult<&Arc<dyn InspectionBackend>> {
        self.backend
            .get()
            .ok_or_else(|| ProviderError::FeatureNotInitialized(self.name.clone()))
    }
}

#[async_trait]
impl FeatureProvider for InspectionFeature {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> ProviderResult<()> {
        self.backend
            .get_or_try_init(|| async {
                tracing::info!(feature = %self.name, "Connecting inspection backend");
                self.ctx.connector.connect().await
            })
            .await?;
        Ok(())
    }

    async fn detect(&self, cluster: &EtcdCluster) -> ProviderResult<bool> {
        let exists = self.backend()?.exists(cluster, &self.name).await?;
        Ok(!exists)
    }

    async fn sync(&self, cluster: &EtcdCluster) -> ProviderResult<()> {
        let backend = self.backend()?;
        if backend.exists(cluster, &self.name).await? {
            return Ok(());
        }

        match backend.enqueue(cluster, &self.name).await {
            Ok(task) => {
                tracing::debug!(feature = %self.name, task = %task.name, "Enqueued inspection task");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, task: &InspectionTask) -> ProviderResult<()> {
        self.backend()?.collect(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::BackendConnector;
    use kstone_common::ClusterMeta;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Backend {
        tasks: Mutex<HashSet<String>>,
        enqueued: AtomicUsize,
        collected: AtomicUsize,
    }

    #[async_trait]
    impl InspectionBackend for Backend {
        async fn exists(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<bool> {
            let name = InspectionTask::task_name(cluster.name(), feature);
            Ok(self.tasks.lock().unwrap().contains(&name))
        }

        async fn enqueue(
            &self,
            cluster: &EtcdCluster,
            feature: &str,
        ) -> ProviderResult<InspectionTask> {
            let task = InspectionTask::new(cluster, feature);
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            self.tasks.lock().unwrap().insert(task.name.clone());
            Ok(task)
        }

        async fn collect(&self, _task: &InspectionTask) -> ProviderResult<()> {
            self.collected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Loses every race: the task never shows up as existing, yet creating it fails
    struct RacingBackend {
        enqueue_calls: AtomicUsize,
    }

    #[async_trait]
    impl InspectionBackend for RacingBackend {
        async fn exists(&self, _cluster: &EtcdCluster, _feature: &str) -> ProviderResult<bool> {
            Ok(false)
        }

        async fn enqueue(
            &self,
            cluster: &EtcdCluster,
            feature: &str,
        ) -> ProviderResult<InspectionTask> {
            self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::AlreadyExists {
                kind: "EtcdInspection".to_string(),
                name: InspectionTask::task_name(cluster.name(), feature),
                namespace: cluster.namespace().to_string(),
            })
        }

        async fn collect(&self, _task: &InspectionTask) -> ProviderResult<()> {
            Ok(())
        }
    }

    struct FixedConnector(Arc<dyn InspectionBackend>);

    #[async_trait]
    impl BackendConnector for FixedConnector {
        async fn connect(&self) -> ProviderResult<Arc<dyn InspectionBackend>> {
            Ok(self.0.clone())
        }
    }

    struct CountingConnector {
        backend: Arc<Backend>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl BackendConnector for CountingConnector {
        async fn connect(&self) -> ProviderResult<Arc<dyn InspectionBackend>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.backend.clone())
        }
    }

    fn feature() -> (Arc<InspectionFeature>, Arc<CountingConnector>, Arc<Backend>) {
        let backend = Arc::new(Backend::default());
        let connector = Arc::new(CountingConnector {
            backend: backend.clone(),
            connects: AtomicUsize::new(0),
        });
        let feature = Arc::new(InspectionFeature::new(
            "request",
            FeatureContext::new(connector.clone()),
        ));
        (feature, connector, backend)
    }

    fn cluster() -> EtcdCluster {
        EtcdCluster {
            metadata: ClusterMeta {
                name: "etcd-a".to_string(),
                namespace: "kstone".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_init_runs_once_under_concurrency() {
        let (feature, connector, _) = feature();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let feature = feature.clone();
                tokio::spawn(async move { feature.init().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(feature.is_initialized());
    }

    #[tokio::test]
    async fn test_use_before_init() {
        let (feature, _, _) = feature();
        let err = feature.detect(&cluster()).await.unwrap_err();
        assert!(matches!(err, ProviderError::FeatureNotInitialized(ref name) if name == "request"));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let (feature, _, backend) = feature();
        feature.init().await.unwrap();

        assert!(feature.detect(&cluster()).await.unwrap());
        feature.sync(&cluster()).await.unwrap();
        feature.sync(&cluster()).await.unwrap();

        assert!(!feature.detect(&cluster()).await.unwrap());
        assert_eq!(backend.enqueued.load(Ordering::SeqCst), 1);
        assert!(backend.tasks.lock().unwrap().contains("etcd-a-request"));
    }

    #[tokio::test]
    async fn test_sync_tolerates_task_created_concurrently() {
        let backend = Arc::new(RacingBackend {
            enqueue_calls: AtomicUsize::new(0),
        });
        let feature = InspectionFeature::new(
            "request",
            FeatureContext::new(Arc::new(FixedConnector(backend.clone()))),
        );
        feature.init().await.unwrap();

        feature.sync(&cluster()).await.unwrap();
        assert_eq!(backend.enqueue_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_collects() {
        let (feature, _, backend) = feature();
        feature.init().await.unwrap();

        let task = InspectionTask::new(&cluster(), "request");
        feature.execute(&task).await.unwrap();
        assert_eq!(backend.collected.load(Ordering::SeqCst), 1);
    }
}
