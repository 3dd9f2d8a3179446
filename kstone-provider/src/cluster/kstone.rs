//! Clusters run by the kstone etcd-operator
//!
//! The descriptor is rendered into an etcd-operator resource that the
//! operator reconciles. The remote resource carries an owner reference to
//! the descriptor, so deletion is left to garbage collection.

use super::drift::detect_drift;
use super::health::{compute_status, StatusReport, TlsInfo};
use super::synthesis::{synthesize_resource, synthesize_spec};
use super::{ClusterContext, ClusterProvider};
use crate::document;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use kstone_common::{
    EtcdCluster, SecurityMode, ANNO_CERT_NAME, ANNO_EXT_CLIENT_URL, ANNO_IMPORTED_URI,
};
use serde_json::Value;

static MISSING_SPEC: Value = Value::Null;

/// Provider for `kstone-etcd-operator` clusters
pub struct EtcdClusterKstone {
    ctx: ClusterContext,
    cluster: EtcdCluster,
}

impl EtcdClusterKstone {
    pub const PROVIDER_NAME: &'static str = "kstone-etcd-operator";

    pub fn new(ctx: ClusterContext, cluster: EtcdCluster) -> Self {
        Self { ctx, cluster }
    }

    fn service_host(&self) -> String {
        format!(
            "{}-etcd.{}.svc.{}",
            self.cluster.name(),
            self.cluster.namespace(),
            self.ctx.config.endpoints.cluster_domain
        )
    }

    /// Client address of the operator-created service
    pub fn client_address(&self) -> String {
        format!(
            "{}://{}:{}",
            self.cluster.security_mode().scheme(),
            self.service_host(),
            self.ctx.config.endpoints.client_port
        )
    }

    /// Secret holding the generated client certificate
    pub fn client_cert_name(&self) -> String {
        format!(
            "{}/{}-etcd-client-cert",
            self.cluster.namespace(),
            self.cluster.name()
        )
    }

    /// Member address to headless service address mapping
    pub fn extension_client_urls(&self) -> String {
        let name = self.cluster.name();
        let namespace = self.cluster.namespace();
        let port = self.ctx.config.endpoints.client_port;
        let domain = &self.ctx.config.endpoints.cluster_domain;

        (0..self.cluster.spec.size)
            .map(|i| {
                format!(
                    "{name}-etcd-{i}:{port}->{name}-etcd-{i}.{name}-etcd-headless.{namespace}.svc.{domain}:{port}"
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn observed(&self) -> ProviderResult<Value> {
        self.ctx
            .store
            .get(
                &self.ctx.config.etcd_resource,
                self.cluster.namespace(),
                self.cluster.name(),
            )
            .await
    }
}

#[async_trait]
impl ClusterProvider for EtcdClusterKstone {
    fn name(&self) -> &str {
        Self::PROVIDER_NAME
    }

    fn cluster(&self) -> &EtcdCluster {
        &self.cluster
    }

    fn into_cluster(self: Box<Self>) -> EtcdCluster {
        self.cluster
    }

    async fn before_create(&mut self) -> ProviderResult<()> {
        self.cluster.validate()?;
        Ok(())
    }

    async fn create(&mut self) -> ProviderResult<()> {
        let kind = &self.ctx.config.etcd_resource;
        let resource = synthesize_resource(&self.cluster, kind)?;

        match self
            .ctx
            .store
            .create(kind, self.cluster.namespace(), &resource)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                tracing::debug!(
                    cluster = %self.cluster.name(),
                    namespace = %self.cluster.namespace(),
                    "Remote resource already exists"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn after_create(&mut self) -> ProviderResult<()> {
        let imported = self.client_address();
        let ext_client_urls = self.extension_client_urls();
        let cert_name = match self.cluster.security_mode() {
            SecurityMode::Tls => Some(self.client_cert_name()),
            SecurityMode::Plain => None,
        };

        let annotations = &mut self.cluster.metadata.annotations;
        annotations.insert(ANNO_IMPORTED_URI.to_string(), imported);
        annotations.insert(ANNO_EXT_CLIENT_URL.to_string(), ext_client_urls);
        if let Some(cert_name) = cert_name {
            annotations.insert(ANNO_CERT_NAME.to_string(), cert_name);
        }

        Ok(())
    }

    async fn before_update(&mut self) -> ProviderResult<()> {
        self.cluster.validate()?;
        Ok(())
    }

    async fn update(&mut self) -> ProviderResult<()> {
        let mut observed = self.observed().await?;

        if document::nested_object(&observed, &["spec"])?.is_none() {
            return Err(ProviderError::malformed(&["spec"], "an object"));
        }
        document::set_nested(&mut observed, synthesize_spec(&self.cluster)?, &["spec"])?;

        self.ctx
            .store
            .update(
                &self.ctx.config.etcd_resource,
                self.cluster.namespace(),
                &observed,
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    cluster = %self.cluster.name(),
                    namespace = %self.cluster.namespace(),
                    "Failed to update remote resource: {}",
                    e
                );
                e
            })?;

        Ok(())
    }

    async fn equal(&self) -> ProviderResult<bool> {
        let observed = self.observed().await?;
        let desired = synthesize_spec(&self.cluster)?;
        let observed_spec = match document::nested(&observed, &["spec"])? {
            Some(spec) if !spec.is_object() => {
                return Err(ProviderError::malformed(&["spec"], "an object"));
            }
            Some(spec) => spec,
            None => &MISSING_SPEC,
        };

        Ok(detect_drift(&desired, observed_spec)?.is_in_sync())
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
