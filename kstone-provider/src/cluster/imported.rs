//! Externally managed clusters
//!
//! The cluster already runs somewhere else and is only observed. Nothing is
//! created or changed remotely; status comes from probing the `importedAddr`
//! endpoint until members are known.

use super::health::{compute_status, StatusReport, TlsInfo};
use super::{ClusterContext, ClusterProvider};
use crate::error::ProviderResult;
use async_trait::async_trait;
use kstone_common::EtcdCluster;

/// Provider for `imported` clusters
pub struct ImportedCluster {
    ctx: ClusterContext,
    cluster: EtcdCluster,
}

impl ImportedCluster {
    pub const PROVIDER_NAME: &'static str = "imported";

    pub fn new(ctx: ClusterContext, cluster: EtcdCluster) -> Self {
        Self { ctx, cluster }
    }
}

#[async_trait]
impl ClusterProvider for ImportedCluster {
    fn name(&self) -> &str {
        Self::PROVIDER_NAME
    }

    fn cluster(&self) -> &EtcdCluster {
        &self.cluster
    }

    fn into_cluster(self: Box<Self>) -> EtcdCluster {
        self.cluster
    }

    async fn create(&mut self) -> ProviderResult<()> {
        tracing::debug!(
            cluster = %self.cluster.name(),
            namespace = %self.cluster.namespace(),
            "Imported cluster, nothing to create"
        );
        Ok(())
    }

    async fn update(&mut self) -> ProviderResult<()> {
        Ok(())
    }

    async fn equal(&self) -> ProviderResult<bool> {
        Ok(true)
    }

    async fn status(&self, tls: Option<&TlsInfo>) -> StatusReport {
        let configured = self.ctx.probe_tls();
        compute_status(
            &self.cluster,
            self.ctx.discovery.as_ref(),
            self.ctx.prober.as_ref(),
            tls.or(configured.as_ref()),
        )
        .await
    }
}
