//! Declarative spec synthesis
//!
//! Renders a cluster descriptor into the document shape expected by the
//! etcd-operator resource. Output depends only on the descriptor.

use crate::error::ProviderResult;
use crate::store::ResourceKind;
use kstone_common::{EtcdCluster, SecurityMode, ANNO_EXTRA_SANS};
use serde_json::{json, Map, Value};

/// Unit suffix of memory and storage quantities
pub const QUANTITY_UNIT: &str = "Gi";

const BASE_ARGS: &[&str] = &["logger=zap"];
const CLIENT_CERT_AUTH_ARG: &str = "client-cert-auth=true";

/// Owner resource written into the ownerReferences of synthesized documents
pub const OWNER_API_VERSION: &str = "kstone.tkestack.io/v1alpha1";
pub const OWNER_KIND: &str = "EtcdCluster";

/// Render an integer quantity with the `Gi` suffix
pub fn gibibytes(count: u32) -> String {
    format!("{}{}", count, QUANTITY_UNIT)
}

/// Extra server certificate SANs from the annotation
///
/// Entries are trimmed and empty ones dropped; no entries at all is `None`.
pub fn parse_extra_sans(raw: Option<&str>) -> Option<Vec<String>> {
    let sans: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|san| !san.is_empty())
        .map(String::from)
        .collect();

    if sans.is_empty() {
        None
    } else {
        Some(sans)
    }
}

fn string_map<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> Value {
    Value::Object(
        entries
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>(),
    )
}

/// Build the `spec` subtree for `cluster`
pub fn synthesize_spec(cluster: &EtcdCluster) -> ProviderResult<Value> {
    let spec = &cluster.spec;
    let mode = cluster.security_mode();

    let env = match serde_json::to_value(&spec.env)? {
        Value::Null => Value::Array(Vec::new()),
        other => other,
    };

    let mut extra_args: Vec<Value> = BASE_ARGS.iter().map(|arg| json!(arg)).collect();
    if mode == SecurityMode::Tls {
        extra_args.push(json!(CLIENT_CERT_AUTH_ARG));
    }

    let cpu = spec.total_cpu.to_string();
    let memory = gibibytes(spec.total_mem);

    let mut document = json!({
        "size": i64::from(spec.size),
        "version": spec.version,
        "template": {
            "extraArgs": extra_args,
            "labels": string_map(cluster.metadata.labels.iter()),
            "annotations": string_map(cluster.metadata.annotations.iter()),
            "env": env,
            "persistentVolumeClaimSpec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": {
                    "requests": {
                        "storage": gibibytes(spec.disk_size),
                    },
                },
            },
            "resources": {
                "requests": {
                    "cpu": cpu,
                    "memory": memory,
                },
                "limits": {
                    "cpu": cpu,
                    "memory": memory,
                },
            },
        },
    });

    if mode == SecurityMode::Tls {
        let mut auto_tls = json!({
            "autoGenerateClientCert": true,
            "autoGeneratePeerCert": true,
            "autoGenerateServerCert": true,
        });
        if let Some(sans) = parse_extra_sans(cluster.annotation(ANNO_EXTRA_SANS)) {
            auto_tls["extraServerCertSANs"] = json!(sans);
        }
        document["secure"] = json!({ "tls": { "autoTLSCert": auto_tls } });
    }

    Ok(document)
}

/// Build the complete remote resource for `cluster`
pub fn synthesize_resource(cluster: &EtcdCluster, kind: &ResourceKind) -> ProviderResult<Value> {
    let mut metadata = json!({
        "name": cluster.name(),
        "namespace": cluster.namespace(),
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

    Ok(json!({
        "apiVersion": kind.api_version(),
        "kind": kind.kind,
        "metadata": metadata,
        "spec": synthesize_spec(cluster)?,
    }))
}
