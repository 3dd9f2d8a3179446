//! kstone provider framework
//!
//! Pluggable cluster and feature providers for managed etcd clusters. A
//! cluster provider renders a typed cluster descriptor into the remote
//! resources that realize it, keeps them in sync, and folds member health
//! into a cluster phase. A feature provider schedules and runs periodic
//! inspections. Providers are selected by name through an explicit
//! [`registry::ProviderRegistry`].

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Remote store boundary
pub mod document;
pub mod store;

// Providers
pub mod cluster;
pub mod feature;
pub mod registry;

pub use cluster::{ClusterContext, ClusterProvider};
pub use config::OperatorConfig;
pub use error::{ProviderError, ProviderResult};
pub use feature::{FeatureContext, FeatureManager, FeatureProvider};
pub use registry::{ProviderKind, ProviderRegistry};
