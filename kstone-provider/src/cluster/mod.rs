//! Cluster providers
//!
//! A cluster provider turns one managed cluster descriptor into the remote
//! resources that realize it and reports the cluster's health. Lifecycle
//! drivers run the hooks strictly in sequence and stop at the first error.

pub mod drift;
pub mod health;
pub mod imported;
pub mod kstone;
pub mod synthesis;

use crate::config::OperatorConfig;
use crate::error::ProviderResult;
use crate::log_cluster_operation;
use crate::store::ResourceStore;
use async_trait::async_trait;
use health::{EndpointDiscovery, MemberProber, StatusReport, TlsInfo};
use kstone_common::EtcdCluster;
use std::sync::Arc;

/// Collaborators shared by all cluster providers
#[derive(Clone)]
pub struct ClusterContext {
    pub store: Arc<dyn ResourceStore>,
    pub discovery: Arc<dyn EndpointDiscovery>,
    pub prober: Arc<dyn MemberProber>,
    pub config: Arc<OperatorConfig>,
}

impl ClusterContext {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        discovery: Arc<dyn EndpointDiscovery>,
        prober: Arc<dyn MemberProber>,
        config: Arc<OperatorConfig>,
    ) -> Self {
        Self {
            store,
            discovery,
            prober,
            config,
        }
    }

    /// TLS material for probes taken from the configuration
    pub fn probe_tls(&self) -> Option<TlsInfo> {
        self.config.probe.tls_info()
    }
}

/// Strategy that realizes one managed cluster
///
/// Hooks default to no-ops. `after_create` may update the descriptor's
/// annotations; callers persist the descriptor returned by [`cluster`].
///
/// [`cluster`]: ClusterProvider::cluster
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Registered provider name
    fn name(&self) -> &str;

    /// Descriptor this provider is bound to
    fn cluster(&self) -> &EtcdCluster;

    fn into_cluster(self: Box<Self>) -> EtcdCluster;

    async fn before_create(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn create(&mut self) -> ProviderResult<()>;

    async fn after_create(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn before_update(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn update(&mut self) -> ProviderResult<()>;

    async fn after_update(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn before_delete(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn delete(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn after_delete(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    /// Whether the remote resource already matches the descriptor
    async fn equal(&self) -> ProviderResult<bool>;

    /// Recompute the cluster status
    ///
    /// `None` falls back to the probe TLS from the operator configuration.
    async fn status(&self, tls: Option<&TlsInfo>) -> StatusReport;
}

/// Run before_create, create and after_create
pub async fn create_cluster(provider: &mut dyn ClusterProvider) -> ProviderResult<()> {
    log_cluster_operation!("create", provider.cluster(), provider = provider.name());

    provider.before_create().await?;
    provider.create().await?;
    provider.after_create().await
}

/// Run the update hooks unless the remote resource is already in sync
///
/// Returns whether an update was issued.
pub async fn update_cluster(provider: &mut dyn ClusterProvider) -> ProviderResult<bool> {
    if provider.equal().await? {
        tracing::debug!(
            cluster = %provider.cluster().name(),
            namespace = %provider.cluster().namespace(),
            "Remote resource in sync, skipping update"
        );
        return Ok(false);
    }

    log_cluster_operation!("update", provider.cluster(), provider = provider.name());

    provider.before_update().await?;
    provider.update().await?;
    provider.after_update().await?;
    Ok(true)
}

/// Run before_delete, delete and after_delete
pub async fn delete_cluster(provider: &mut dyn ClusterProvider) -> ProviderResult<()> {
    log_cluster_operation!("delete", provider.cluster(), provider = provider.name());

    provider.before_delete().await?;
    provider.delete().await?;
    provider.after_delete().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use kstone_common::EtcdClusterStatus;

    /// Records the hooks it sees, optionally failing one of them
    struct Recorder {
        cluster: EtcdCluster,
        calls: Vec<&'static str>,
        fail_on: Option<&'static str>,
        in_sync: bool,
    }

    impl Recorder {
        fn new(fail_on: Option<&'static str>, in_sync: bool) -> Self {
            Self {
                cluster: EtcdCluster::default(),
                calls: Vec::new(),
                fail_on,
                in_sync,
            }
        }

        fn hit(&mut self, hook: &'static str) -> ProviderResult<()> {
            self.calls.push(hook);
            if self.fail_on == Some(hook) {
                return Err(ProviderError::Internal(hook.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ClusterProvider for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn cluster(&self) -> &EtcdCluster {
            &self.cluster
        }

        fn into_cluster(self: Box<Self>) -> EtcdCluster {
            self.cluster
        }

        async fn before_create(&mut self) -> ProviderResult<()> {
            self.hit("before_create")
        }

        async fn create(&mut self) -> ProviderResult<()> {
            self.hit("create")
        }

        async fn after_create(&mut self) -> ProviderResult<()> {
            self.hit("after_create")
        }

        async fn before_update(&mut self) -> ProviderResult<()> {
            self.hit("before_update")
        }

        async fn update(&mut self) -> ProviderResult<()> {
            self.hit("update")
        }

        async fn after_update(&mut self) -> ProviderResult<()> {
            self.hit("after_update")
        }

        async fn equal(&self) -> ProviderResult<bool> {
            Ok(self.in_sync)
        }

        async fn status(&self, _tls: Option<&TlsInfo>) -> StatusReport {
            StatusReport::ok(EtcdClusterStatus::default())
        }
    }

    #[tokio::test]
    async fn test_create_runs_hooks_in_order() {
        let mut provider = Recorder::new(None, false);
        create_cluster(&mut provider).await.unwrap();
        assert_eq!(provider.calls, vec!["before_create", "create", "after_create"]);
    }

    #[tokio::test]
    async fn test_create_stops_at_first_error() {
        let mut provider = Recorder::new(Some("create"), false);
        let err = create_cluster(&mut provider).await.unwrap_err();
        assert!(matches!(err, ProviderError::Internal(ref hook) if hook == "create"));
        assert_eq!(provider.calls, vec!["before_create", "create"]);
    }

    #[tokio::test]
    async fn test_update_skipped_when_in_sync() {
        let mut provider = Recorder::new(None, true);
        assert!(!update_cluster(&mut provider).await.unwrap());
        assert!(provider.calls.is_empty());

        let mut provider = Recorder::new(None, false);
        assert!(update_cluster(&mut provider).await.unwrap());
        assert_eq!(provider.calls, vec!["before_update", "update", "after_update"]);
    }

    #[tokio::test]
    async fn test_default_delete_hooks_are_noops() {
        let mut provider = Recorder::new(None, false);
        delete_cluster(&mut provider).await.unwrap();
        assert!(provider.calls.is_empty());
    }
}
