//! Common types shared by the kstone providers
//!
//! The cluster descriptor, its status, member health and inspection task
//! records live here so that providers and their callers agree on one shape.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::EnvVar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Annotation selecting the client scheme (`http` or `https`)
pub const ANNO_SCHEME: &str = "scheme";
/// Comma separated extra server certificate SANs
pub const ANNO_EXTRA_SANS: &str = "extraServerCertSANs";
/// Client endpoint of the cluster, written after create
pub const ANNO_IMPORTED_URI: &str = "importedAddr";
/// Client certificate secret reference, written after create for tls clusters
pub const ANNO_CERT_NAME: &str = "certName";
/// Member name to extension client URL mapping
pub const ANNO_EXT_CLIENT_URL: &str = "extClientURL";
/// Enabled inspection features (`request=true,healthy=false`)
pub const ANNO_FEATURE_GATES: &str = "featureGates";

/// Object metadata of a managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Desired state of a managed etcd cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterSpec {
    /// Provider strategy name (e.g. "kstone-etcd-operator", "imported")
    pub cluster_type: String,
    /// Member count
    pub size: u32,
    /// etcd version, with or without a leading `v`
    pub version: String,
    /// Disk size per member in Gi
    pub disk_size: u32,
    /// CPU request in cores
    pub total_cpu: u32,
    /// Memory request in Gi
    pub total_mem: u32,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Managed etcd cluster (the cluster descriptor)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtcdCluster {
    pub metadata: ClusterMeta,
    pub spec: EtcdClusterSpec,
    #[serde(default)]
    pub status: EtcdClusterStatus,
}

impl EtcdCluster {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn security_mode(&self) -> SecurityMode {
        SecurityMode::from_annotations(&self.metadata.annotations)
    }

    /// Check the invariants the providers rely on
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(Error::Validation("cluster name is required".to_string()));
        }
        if self.metadata.namespace.is_empty() {
            return Err(Error::Validation(format!(
                "cluster {} has no namespace",
                self.metadata.name
            )));
        }
        if self.spec.size == 0 {
            return Err(Error::Validation(format!(
                "cluster {} must have at least one member",
                self.metadata.name
            )));
        }

        let mut seen = HashSet::new();
        for env in &self.spec.env {
            if !seen.insert(env.name.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate environment variable {} in cluster {}",
                    env.name, self.metadata.name
                )));
            }
        }

        Ok(())
    }
}

/// Transport security of the managed cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Plain,
    Tls,
}

impl SecurityMode {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        match annotations.get(ANNO_SCHEME).map(String::as_str) {
            Some("https") => Self::Tls,
            _ => Self::Plain,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

/// Coarse cluster health exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterPhase {
    Creating,
    Running,
    Updating,
    Unknown,
    Error,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Updating => write!(f, "Updating"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Role of a member inside the raft group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemberRole {
    Leader,
    #[default]
    Follower,
    Learner,
}

/// Member state as recorded in the cluster status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemberPhase {
    Running,
    #[default]
    Unhealthy,
}

/// Per-member observation returned by a health probe
///
/// Transient: recomputed on every status pass and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberHealth {
    pub name: String,
    pub member_id: u64,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_client_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `None` when the prober cannot tell the raft role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raft_term: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Member entry of the cluster status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub name: String,
    pub member_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub extension_client_url: String,
    #[serde(default)]
    pub version: String,
    pub status: MemberPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
}

/// Observed state of a managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterStatus {
    /// `None` until a provider has computed a phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub members: Vec<MemberStatus>,
}

/// Scheduled inspection for one (cluster, feature) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionTask {
    pub name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub feature: String,
    pub created_at: DateTime<Utc>,
}

impl InspectionTask {
    pub fn new(cluster: &EtcdCluster, feature: &str) -> Self {
        Self {
            name: Self::task_name(cluster.name(), feature),
            namespace: cluster.namespace().to_string(),
            cluster_name: cluster.name().to_string(),
            feature: feature.to_string(),
            created_at: Utc::now(),
        }
    }

    /// One task name per (cluster, feature) pair
    pub fn task_name(cluster_name: &str, feature: &str) -> String {
        format!("{}-{}", cluster_name, feature)
    }
}

/// Features switched on through the `featureGates` annotation
pub fn feature_gates(annotations: &BTreeMap<String, String>) -> BTreeSet<String> {
    let Some(gates) = annotations.get(ANNO_FEATURE_GATES) else {
        return BTreeSet::new();
    };

    gates
        .split(',')
        .filter_map(|gate| {
            let (name, enabled) = gate.split_once('=')?;
            let name = name.trim();
            match enabled.trim().parse::<bool>() {
                Ok(true) if !name.is_empty() => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> EtcdCluster {
        EtcdCluster {
            metadata: ClusterMeta {
                name: "etcd-a".to_string(),
                namespace: "kstone".to_string(),
                ..Default::default()
            },
            spec: EtcdClusterSpec {
                cluster_type: "kstone-etcd-operator".to_string(),
                size: 3,
                version: "3.5.7".to_string(),
                ..Default::default()
            },
            status: EtcdClusterStatus::default(),
        }
    }

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    #[test]
    fn test_security_mode_from_scheme() {
        let mut cluster = cluster();
        assert_eq!(cluster.security_mode(), SecurityMode::Plain);

        cluster
            .metadata
            .annotations
            .insert(ANNO_SCHEME.to_string(), "https".to_string());
        assert_eq!(cluster.security_mode(), SecurityMode::Tls);
        assert_eq!(cluster.security_mode().scheme(), "https");
    }

    #[test]
    fn test_validate_rejects_duplicate_env() {
        let mut cluster = cluster();
        cluster.spec.env = vec![env("A", "1"), env("B", "2")];
        assert!(cluster.validate().is_ok());

        cluster.spec.env.push(env("A", "3"));
        assert!(matches!(cluster.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_empty_cluster() {
        let mut cluster = cluster();
        cluster.spec.size = 0;
        assert!(cluster.validate().is_err());
    }

    #[test]
    fn test_feature_gates() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNO_FEATURE_GATES.to_string(),
            "request=true, healthy=false,consistency = true,broken".to_string(),
        );

        let gates = feature_gates(&annotations);
        assert_eq!(
            gates.into_iter().collect::<Vec<_>>(),
            vec!["consistency".to_string(), "request".to_string()]
        );
        assert!(feature_gates(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_phase_serialization() {
        let status = EtcdClusterStatus {
            phase: Some(ClusterPhase::Running),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Running");

        let empty = serde_json::to_value(EtcdClusterStatus::default()).unwrap();
        assert!(empty.get("phase").is_none());
    }

    #[test]
    fn test_task_name() {
        let task = InspectionTask::new(&cluster(), "request");
        assert_eq!(task.name, "etcd-a-request");
        assert_eq!(task.namespace, "kstone");
    }
}
