//! Cluster health aggregation
//!
//! Folds per-member probe results into one cluster phase. Phase changes are
//! damped: an inconclusive probe never invents a phase, and only a cluster
//! already confirmed `Running` is moved to `Unknown`.

use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use kstone_common::{
    ClusterPhase, EtcdCluster, EtcdClusterStatus, MemberHealth, MemberPhase, MemberRole,
    MemberStatus, ANNO_EXT_CLIENT_URL, ANNO_IMPORTED_URI,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Client TLS material used when probing members
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsInfo {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl TlsInfo {
    pub fn is_empty(&self) -> bool {
        self.ca_file.is_none() && self.cert_file.is_none() && self.key_file.is_none()
    }
}

/// Resolves the storage member endpoints of a cluster
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Empty when no member is known yet
    async fn endpoints(&self, cluster: &EtcdCluster) -> Vec<String>;
}

/// Probes member health through the given endpoints
#[async_trait]
pub trait MemberProber: Send + Sync {
    async fn probe(
        &self,
        endpoints: &[String],
        extension_client_urls: Option<&str>,
        tls: Option<&TlsInfo>,
    ) -> ProviderResult<Vec<MemberHealth>>;
}

/// Endpoints taken from the members already recorded in the cluster status
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMemberDiscovery;

#[async_trait]
impl EndpointDiscovery for StatusMemberDiscovery {
    async fn endpoints(&self, cluster: &EtcdCluster) -> Vec<String> {
        cluster
            .status
            .members
            .iter()
            .filter(|member| member.role != Some(MemberRole::Learner))
            .filter_map(|member| {
                if !member.extension_client_url.is_empty() {
                    Some(member.extension_client_url.clone())
                } else if !member.endpoint.is_empty() {
                    Some(member.endpoint.clone())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Result of a status pass
///
/// The status is always usable; `error` carries a probe failure that only
/// gated the phase decision and is handed back for logging or retry.
#[derive(Debug)]
pub struct StatusReport {
    pub status: EtcdClusterStatus,
    pub error: Option<ProviderError>,
}

impl StatusReport {
    pub fn ok(status: EtcdClusterStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn into_result(self) -> ProviderResult<EtcdClusterStatus> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.status),
        }
    }
}

/// Candidate phase and member view from one complete probe
pub fn aggregate_members(members: &[MemberHealth]) -> (Vec<MemberStatus>, ClusterPhase) {
    let statuses: Vec<MemberStatus> = members
        .iter()
        .map(|member| MemberStatus {
            name: member.name.clone(),
            member_id: format!("{:x}", member.member_id),
            endpoint: member.endpoint.clone(),
            extension_client_url: member.extension_client_url.clone().unwrap_or_default(),
            version: member.version.clone().unwrap_or_default(),
            status: if member.reachable {
                MemberPhase::Running
            } else {
                MemberPhase::Unhealthy
            },
            role: member.role,
        })
        .collect();

    let all_reachable = !members.is_empty() && members.iter().all(|m| m.reachable);
    // Roles are optional probe output; only a reported role set can lack a leader.
    let roles_reported = members.iter().any(|m| m.role.is_some());
    let has_leader = members
        .iter()
        .any(|m| m.reachable && m.role == Some(MemberRole::Leader));

    let phase = if all_reachable && (!roles_reported || has_leader) {
        ClusterPhase::Running
    } else {
        ClusterPhase::Unknown
    };

    (statuses, phase)
}

/// Apply a candidate phase from a successful probe
pub fn resolve_phase(previous: Option<ClusterPhase>, candidate: ClusterPhase) -> Option<ClusterPhase> {
    if previous == Some(ClusterPhase::Running) || candidate != ClusterPhase::Unknown {
        Some(candidate)
    } else {
        previous
    }
}

/// Phase after a failed or incomplete probe
pub fn degrade_phase(previous: Option<ClusterPhase>) -> Option<ClusterPhase> {
    match previous {
        Some(ClusterPhase::Running) => Some(ClusterPhase::Unknown),
        other => other,
    }
}

/// Recompute the status of `cluster` from its live members
pub async fn compute_status(
    cluster: &EtcdCluster,
    discovery: &dyn EndpointDiscovery,
    prober: &dyn MemberProber,
    tls: Option<&TlsInfo>,
) -> StatusReport {
    let mut status = cluster.status.clone();

    let mut endpoints = discovery.endpoints(cluster).await;
    if endpoints.is_empty() {
        match cluster.annotation(ANNO_IMPORTED_URI) {
            Some(addr) => {
                endpoints.push(addr.to_string());
                status.service_name = addr.to_string();
            }
            None => {
                status.phase = Some(ClusterPhase::Creating);
                return StatusReport::ok(status);
            }
        }
    }

    let probed = prober
        .probe(&endpoints, cluster.annotation(ANNO_EXT_CLIENT_URL), tls)
        .await;

    let members = match probed {
        Ok(members) if !members.is_empty() && members.len() == cluster.spec.size as usize => {
            members
        }
        Ok(members) => {
            tracing::info!(
                cluster = %cluster.name(),
                namespace = %cluster.namespace(),
                expected = cluster.spec.size,
                observed = members.len(),
                "Member count does not match cluster size"
            );
            status.phase = degrade_phase(status.phase);
            return StatusReport::ok(status);
        }
        Err(err) => {
            tracing::warn!(
                cluster = %cluster.name(),
                namespace = %cluster.namespace(),
                "Member probe failed: {}",
                err
            );
            status.phase = degrade_phase(status.phase);
            return StatusReport {
                status,
                error: Some(err),
            };
        }
    };

    let (member_statuses, candidate) = aggregate_members(&members);
    status.members = member_statuses;
    status.phase = resolve_phase(status.phase, candidate);

    StatusReport::ok(status)
}
