//! Operator configuration
//!
//! Settings are resolved in three layers:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use crate::cluster::health::TlsInfo;
use crate::logging::LoggingConfig;
use crate::store::ResourceKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration of the provider framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Remote etcd-operator resource managed by the kstone provider
    pub etcd_resource: ResourceKind,
    /// Resource used to schedule inspection tasks
    pub inspection_resource: ResourceKind,
    /// Client endpoint naming
    pub endpoints: EndpointConfig,
    /// Client TLS material for member probes
    pub probe: ProbeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// How in-cluster client endpoints are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// etcd client port
    pub client_port: u16,
    /// DNS domain of the hosting Kubernetes cluster
    pub cluster_domain: String,
}

/// Probe TLS configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            etcd_resource: ResourceKind::new(
                "etcd.tkestack.io",
                "v1alpha1",
                "EtcdCluster",
                "etcdclusters",
            ),
            inspection_resource: ResourceKind::new(
                "kstone.tkestack.io",
                "v1alpha1",
                "EtcdInspection",
                "etcdinspections",
            ),
            endpoints: EndpointConfig::default(),
            probe: ProbeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            client_port: 2379,
            cluster_domain: "cluster.local".to_string(),
        }
    }
}

impl ProbeConfig {
    /// TLS material for probes, `None` when nothing is configured
    pub fn tls_info(&self) -> Option<TlsInfo> {
        let tls = TlsInfo {
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
        };
        if tls.is_empty() {
            None
        } else {
            Some(tls)
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables and optional config file
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(config_path) = Self::find_config_file() {
            match Self::load_from_file(&config_path) {
                Ok(file_config) => config = file_config,
                Err(e) => tracing::warn!("Ignoring config file: {}", e),
            }
        }

        config.apply_env_overrides();

        config
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("KSTONE_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/kstone/config.toml")),
            Some(PathBuf::from("./kstone.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("KSTONE_CLIENT_PORT") {
            if let Ok(port) = port.parse() {
                self.endpoints.client_port = port;
            }
        }
        if let Ok(domain) = std::env::var("KSTONE_CLUSTER_DOMAIN") {
            self.endpoints.cluster_domain = domain;
        }

        if let Ok(path) = std::env::var("KSTONE_PROBE_CA_FILE") {
            self.probe.ca_file = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("KSTONE_PROBE_CERT_FILE") {
            self.probe.cert_file = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("KSTONE_PROBE_KEY_FILE") {
            self.probe.key_file = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("KSTONE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(path) = std::env::var("KSTONE_LOG_PATH") {
            self.logging.file_path = Some(path);
        }
        if let Ok(json) = std::env::var("KSTONE_LOG_JSON") {
            self.logging.json_format = json.parse().unwrap_or(false);
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, kind) in [
            ("etcd_resource", &self.etcd_resource),
            ("inspection_resource", &self.inspection_resource),
        ] {
            if kind.version.is_empty() || kind.kind.is_empty() || kind.plural.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{} needs a version, kind and plural",
                    label
                )));
            }
        }

        if self.endpoints.client_port == 0 {
            return Err(ConfigError::Validation("Client port cannot be 0".to_string()));
        }

        if self.endpoints.cluster_domain.is_empty() {
            return Err(ConfigError::Validation(
                "Cluster domain cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {}", .0.display(), .1)]
    FileRead(PathBuf, String),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for kstone_common::Error {
    fn from(err: ConfigError) -> Self {
        kstone_common::Error::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = OperatorConfig::default();
        assert_eq!(config.etcd_resource.api_version(), "etcd.tkestack.io/v1alpha1");
        assert_eq!(config.inspection_resource.plural, "etcdinspections");
        assert_eq!(config.endpoints.client_port, 2379);
        assert_eq!(config.endpoints.cluster_domain, "cluster.local");
        assert!(config.probe.tls_info().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = OperatorConfig::default();
        config.endpoints.client_port = 0;
        assert!(config.validate().is_err());

        let mut config = OperatorConfig::default();
        config.endpoints.cluster_domain.clear();
        assert!(config.validate().is_err());

        let mut config = OperatorConfig::default();
        config.etcd_resource.plural.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_generate_sample_config() {
        let sample = OperatorConfig::generate_sample();
        assert!(sample.contains("[etcd_resource]"));
        assert!(sample.contains("cluster_domain"));

        let parsed: OperatorConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed, OperatorConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[endpoints]\ncluster_domain = \"corp.internal\"\n\n[probe]\nca_file = \"/etc/etcd/ca.crt\""
        )
        .unwrap();

        let config = OperatorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.endpoints.cluster_domain, "corp.internal");
        assert_eq!(config.endpoints.client_port, 2379);
        assert_eq!(config.etcd_resource.kind, "EtcdCluster");

        let tls = config.probe.tls_info().unwrap();
        assert_eq!(tls.ca_file, Some(PathBuf::from("/etc/etcd/ca.crt")));
        assert!(tls.cert_file.is_none());
    }

    #[test]
    fn test_load_errors() {
        let err = OperatorConfig::load_from_file(Path::new("/nonexistent/kstone.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_, _)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[endpoints\nclient_port = ").unwrap();
        let err = OperatorConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
