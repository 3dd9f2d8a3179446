//! Common test doubles and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use kstone_common::{
    ClusterMeta, EtcdCluster, EtcdClusterSpec, InspectionTask, MemberHealth, MemberRole,
};
use kstone_provider::cluster::health::{EndpointDiscovery, MemberProber, TlsInfo};
use kstone_provider::cluster::ClusterContext;
use kstone_provider::config::OperatorConfig;
use kstone_provider::error::{ProviderError, ProviderResult};
use kstone_provider::feature::TaskCollector;
use kstone_provider::store::ResourceStore;
use std::sync::{Arc, Mutex};

/// Discovery returning a fixed endpoint list
#[derive(Default)]
pub struct FixedDiscovery {
    pub endpoints: Mutex<Vec<String>>,
}

impl FixedDiscovery {
    pub fn set(&self, endpoints: &[&str]) {
        *self.endpoints.lock().unwrap() = endpoints.iter().map(|e| e.to_string()).collect();
    }
}

#[async_trait]
impl EndpointDiscovery for FixedDiscovery {
    async fn endpoints(&self, _cluster: &EtcdCluster) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }
}

/// Prober replaying a scripted outcome and recording what it was asked
#[derive(Default)]
pub struct ScriptedProber {
    pub outcome: Mutex<Option<Result<Vec<MemberHealth>, String>>>,
    pub seen_endpoints: Mutex<Vec<String>>,
    pub seen_tls: Mutex<Option<TlsInfo>>,
}

impl ScriptedProber {
    pub fn healthy(&self, count: usize) {
        let members = (0..count)
            .map(|i| MemberHealth {
                name: format!("etcd-a-etcd-{}", i),
                member_id: 100 + i as u64,
                endpoint: format!("http://etcd-a-etcd-{}:2379", i),
                version: Some("3.5.7".to_string()),
                role: Some(if i == 0 {
                    MemberRole::Leader
                } else {
                    MemberRole::Follower
                }),
                reachable: true,
                ..Default::default()
            })
            .collect();
        *self.outcome.lock().unwrap() = Some(Ok(members));
    }

    pub fn fail(&self, message: &str) {
        *self.outcome.lock().unwrap() = Some(Err(message.to_string()));
    }
}

#[async_trait]
impl MemberProber for ScriptedProber {
    async fn probe(
        &self,
        endpoints: &[String],
        _extension_client_urls: Option<&str>,
        tls: Option<&TlsInfo>,
    ) -> ProviderResult<Vec<MemberHealth>> {
        *self.seen_endpoints.lock().unwrap() = endpoints.to_vec();
        *self.seen_tls.lock().unwrap() = tls.cloned();
        match self.outcome.lock().unwrap().clone() {
            Some(Ok(members)) => Ok(members),
            Some(Err(message)) => Err(ProviderError::Probe(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Collector remembering the tasks it was given
#[derive(Default)]
pub struct RecordingCollector {
    pub tasks: Mutex<Vec<InspectionTask>>,
}

#[async_trait]
impl TaskCollector for RecordingCollector {
    async fn collect(&self, task: &InspectionTask) -> ProviderResult<()> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }
}

pub fn test_cluster(cluster_type: &str, size: u32) -> EtcdCluster {
    EtcdCluster {
        metadata: ClusterMeta {
            name: "etcd-a".to_string(),
            namespace: "kstone".to_string(),
            uid: Some("6f1c2d1e-uid".to_string()),
            ..Default::default()
        },
        spec: EtcdClusterSpec {
            cluster_type: cluster_type.to_string(),
            size,
            version: "3.5.7".to_string(),
            disk_size: 20,
            total_cpu: 2,
            total_mem: 4,
            env: Vec::new(),
        },
        status: Default::default(),
    }
}

pub fn test_context(
    store: Arc<dyn ResourceStore>,
    discovery: Arc<FixedDiscovery>,
    prober: Arc<ScriptedProber>,
) -> ClusterContext {
    test_context_with_config(store, discovery, prober, OperatorConfig::default())
}

pub fn test_context_with_config(
    store: Arc<dyn ResourceStore>,
    discovery: Arc<FixedDiscovery>,
    prober: Arc<ScriptedProber>,
    config: OperatorConfig,
) -> ClusterContext {
    ClusterContext::new(store, discovery, prober, Arc::new(config))
}
