//! Provider registry
//!
//! Maps a (kind, name) pair to a factory. Registration happens once at
//! startup through [`ProviderRegistry::with_builtin`]; lookups never fall
//! back to a default provider.

use crate::cluster::imported::ImportedCluster;
use crate::cluster::kstone::EtcdClusterKstone;
use crate::cluster::{ClusterContext, ClusterProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::feature::inspection::InspectionFeature;
use crate::feature::{FeatureContext, FeatureProvider, INSPECTION_FEATURES};
use kstone_common::EtcdCluster;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Cluster,
    Feature,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Cluster => write!(f, "cluster"),
            ProviderKind::Feature => write!(f, "feature"),
        }
    }
}

/// Builds a cluster provider bound to one descriptor
pub type ClusterProviderFactory = Arc<
    dyn Fn(&ClusterContext, EtcdCluster) -> ProviderResult<Box<dyn ClusterProvider>> + Send + Sync,
>;

/// Builds a feature provider shared by every cluster
pub type FeatureProviderFactory =
    Arc<dyn Fn(&FeatureContext) -> ProviderResult<Arc<dyn FeatureProvider>> + Send + Sync>;

/// Registered factory
#[derive(Clone)]
pub enum ProviderFactory {
    Cluster(ClusterProviderFactory),
    Feature(FeatureProviderFactory),
}

impl ProviderFactory {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderFactory::Cluster(_) => ProviderKind::Cluster,
            ProviderFactory::Feature(_) => ProviderKind::Feature,
        }
    }
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderFactory({})", self.kind())
    }
}

type RegistryKey = (ProviderKind, String);

/// Registry of cluster and feature provider factories
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<RegistryKey, ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in provider
    pub fn with_builtin() -> ProviderResult<Self> {
        let registry = Self::new();

        registry.register_cluster(
            EtcdClusterKstone::PROVIDER_NAME,
            Arc::new(|ctx: &ClusterContext, cluster: EtcdCluster| {
                Ok(Box::new(EtcdClusterKstone::new(ctx.clone(), cluster)) as Box<dyn ClusterProvider>)
            }),
        )?;
        registry.register_cluster(
            ImportedCluster::PROVIDER_NAME,
            Arc::new(|ctx: &ClusterContext, cluster: EtcdCluster| {
                Ok(Box::new(ImportedCluster::new(ctx.clone(), cluster)) as Box<dyn ClusterProvider>)
            }),
        )?;

        for &feature in INSPECTION_FEATURES {
            registry.register_feature(
                feature,
                Arc::new(move |ctx: &FeatureContext| {
                    Ok(Arc::new(InspectionFeature::new(feature, ctx.clone())) as Arc<dyn FeatureProvider>)
                }),
            )?;
        }

        Ok(registry)
    }

    /// Register a factory under `name`
    pub fn register(&self, name: &str, factory: ProviderFactory) -> ProviderResult<()> {
        let kind = factory.kind();
        let mut factories = self
            .factories
            .write()
            .map_err(|_| ProviderError::Internal("provider registry lock poisoned".to_string()))?;

        let key = (kind, name.to_string());
        if factories.contains_key(&key) {
            return Err(ProviderError::DuplicateProvider {
                kind,
                name: name.to_string(),
            });
        }

        factories.insert(key, factory);
        tracing::debug!(provider = %name, kind = %kind, "Registered provider");
        Ok(())
    }

    pub fn register_cluster(&self, name: &str, factory: ClusterProviderFactory) -> ProviderResult<()> {
        self.register(name, ProviderFactory::Cluster(factory))
    }

    pub fn register_feature(&self, name: &str, factory: FeatureProviderFactory) -> ProviderResult<()> {
        self.register(name, ProviderFactory::Feature(factory))
    }

    /// Factory registered under (kind, name)
    pub fn lookup(&self, kind: ProviderKind, name: &str) -> ProviderResult<ProviderFactory> {
        let factories = self
            .factories
            .read()
            .map_err(|_| ProviderError::Internal("provider registry lock poisoned".to_string()))?;

        factories
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| ProviderError::ProviderNotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Build the cluster provider registered as `name` for `cluster`
    pub fn cluster_provider(
        &self,
        name: &str,
        ctx: &ClusterContext,
        cluster: EtcdCluster,
    ) -> ProviderResult<Box<dyn ClusterProvider>> {
        match self.lookup(ProviderKind::Cluster, name)? {
            ProviderFactory::Cluster(factory) => factory(ctx, cluster),
            ProviderFactory::Feature(_) => Err(ProviderError::Internal(format!(
                "feature factory stored under cluster key '{}'",
                name
            ))),
        }
    }

    /// Build the provider selected by the descriptor's cluster type
    pub fn provider_for(
        &self,
        ctx: &ClusterContext,
        cluster: EtcdCluster,
    ) -> ProviderResult<Box<dyn ClusterProvider>> {
        let name = cluster.spec.cluster_type.clone();
        self.cluster_provider(&name, ctx, cluster)
    }

    /// Build the feature provider registered as `name`
    pub fn feature_provider(
        &self,
        name: &str,
        ctx: &FeatureContext,
    ) -> ProviderResult<Arc<dyn FeatureProvider>> {
        match self.lookup(ProviderKind::Feature, name)? {
            ProviderFactory::Feature(factory) => factory(ctx),
            ProviderFactory::Cluster(_) => Err(ProviderError::Internal(format!(
                "cluster factory stored under feature key '{}'",
                name
            ))),
        }
    }

    /// Registered names of one kind, sorted
    pub fn names(&self, kind: ProviderKind) -> Vec<String> {
        let Ok(factories) = self.factories.read() else {
            return Vec::new();
        };

        let mut names: Vec<String> = factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}
