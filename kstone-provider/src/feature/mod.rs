//! Feature providers
//!
//! A feature provider runs one periodic inspection capability. Work is split
//! into a cheap `detect` that callers can fan out across clusters, a `sync`
//! that schedules one task per (cluster, feature) pair, and an `execute` that
//! collects data for an already dequeued task.

pub mod inspection;
pub mod store_backend;

use crate::error::{ProviderError, ProviderResult};
use crate::registry::ProviderRegistry;
use async_trait::async_trait;
use kstone_common::{feature_gates, EtcdCluster, InspectionTask};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const FEATURE_REQUEST: &str = "request";
pub const FEATURE_HEALTHY: &str = "healthy";
pub const FEATURE_CONSISTENCY: &str = "consistency";
pub const FEATURE_ALARM: &str = "alarm";

/// Built-in inspection features
pub const INSPECTION_FEATURES: &[&str] = &[
    FEATURE_REQUEST,
    FEATURE_HEALTHY,
    FEATURE_CONSISTENCY,
    FEATURE_ALARM,
];

/// One inspection capability shared by every cluster
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Registered feature name
    fn name(&self) -> &str;

    /// Set up shared resources; the body runs once per provider
    async fn init(&self) -> ProviderResult<()>;

    /// True when `cluster` has no task for this feature yet
    async fn detect(&self, cluster: &EtcdCluster) -> ProviderResult<bool>;

    /// Schedule a task for `cluster`; a no-op when one already exists
    async fn sync(&self, cluster: &EtcdCluster) -> ProviderResult<()>;

    /// Collect and record results for a dequeued task
    async fn execute(&self, task: &InspectionTask) -> ProviderResult<()>;
}

/// Where inspection tasks are queued and collected
#[async_trait]
pub trait InspectionBackend: Send + Sync {
    async fn exists(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<bool>;

    /// Queue a task; `AlreadyExists` when another writer got there first
    async fn enqueue(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<InspectionTask>;

    async fn collect(&self, task: &InspectionTask) -> ProviderResult<()>;
}

/// Builds the backend shared by a feature provider
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> ProviderResult<Arc<dyn InspectionBackend>>;
}

/// Performs the data collection of one task
#[async_trait]
pub trait TaskCollector: Send + Sync {
    async fn collect(&self, task: &InspectionTask) -> ProviderResult<()>;
}

/// Collaborators handed to feature provider factories
#[derive(Clone)]
pub struct FeatureContext {
    pub connector: Arc<dyn BackendConnector>,
}

impl FeatureContext {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self { connector }
    }
}

/// Keeps one initialized provider per feature name
pub struct FeatureManager {
    registry: Arc<ProviderRegistry>,
    ctx: FeatureContext,
    providers: RwLock<HashMap<String, Arc<dyn FeatureProvider>>>,
}

impl FeatureManager {
    pub fn new(registry: Arc<ProviderRegistry>, ctx: FeatureContext) -> Self {
        Self {
            registry,
            ctx,
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Initialized provider for `feature`, built on first use
    pub async fn provider(&self, feature: &str) -> ProviderResult<Arc<dyn FeatureProvider>> {
        let cached = self.providers.read().await.get(feature).cloned();

        let provider = match cached {
            Some(provider) => provider,
            None => {
                let mut providers = self.providers.write().await;
                match providers.get(feature) {
                    Some(provider) => provider.clone(),
                    None => {
                        let provider = self.registry.feature_provider(feature, &self.ctx)?;
                        providers.insert(feature.to_string(), provider.clone());
                        provider
                    }
                }
            }
        };

        provider.init().await?;
        Ok(provider)
    }

    /// Features switched on for `cluster`
    pub fn enabled_features(&self, cluster: &EtcdCluster) -> BTreeSet<String> {
        feature_gates(&cluster.metadata.annotations)
    }

    /// Schedule `feature` for `cluster` if it has no task yet
    ///
    /// Returns whether a task was scheduled.
    pub async fn reconcile(&self, cluster: &EtcdCluster, feature: &str) -> ProviderResult<bool> {
        let provider = self.provider(feature).await?;

        if !provider.detect(cluster).await? {
            return Ok(false);
        }

        provider.sync(cluster).await?;
        tracing::info!(
            cluster = %cluster.name(),
            namespace = %cluster.namespace(),
            feature = %feature,
            "Scheduled inspection"
        );
        Ok(true)
    }

    /// Reconcile every enabled feature of `cluster`
    ///
    /// Gates naming an unregistered feature are skipped. Returns the
    /// features that got a new task.
    pub async fn reconcile_enabled(&self, cluster: &EtcdCluster) -> ProviderResult<Vec<String>> {
        let mut scheduled = Vec::new();

        for feature in self.enabled_features(cluster) {
            match self.reconcile(cluster, &feature).await {
                Ok(true) => scheduled.push(feature),
                Ok(false) => {}
                Err(ProviderError::ProviderNotFound { .. }) => {
                    tracing::warn!(
                        cluster = %cluster.name(),
                        feature = %feature,
                        "Feature gate names an unknown feature"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(scheduled)
    }

    /// Run a dequeued task with the provider of its feature
    pub async fn execute(&self, task: &InspectionTask) -> ProviderResult<()> {
        self.provider(&task.feature).await?.execute(task).await
    }
}
