//! Connection profile: the client configuration derived from settings.

use super::settings::{CacheSettings, CacheTopology, DeploymentMode};
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::time::Duration;

/// Retries the Redis client performs on its own.
///
/// [`RetryPolicy`] wraps every connect and operation, so the client itself
/// must not retry again underneath it.
pub const CLIENT_RETRIES: u32 = 0;

/// Mode-specific client options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TopologyProfile {
    Cluster {
        read_from_replicas: bool,
        require_full_coverage: bool,
    },
    SingleNode {
        retry_on_timeout: bool,
    },
}

/// Everything an adapter needs to build its client: common fields, the
/// static retry policy, and the mode-specific options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionProfile {
    pub uri: String,
    pub socket_timeout: Duration,
    pub socket_connect_timeout: Duration,
    pub socket_keepalive: bool,
    pub max_connections: u32,
    pub health_check_interval: Duration,
    #[serde(skip)]
    pub retry: RetryPolicy,
    pub topology: TopologyProfile,
}

impl ConnectionProfile {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let topology = match &settings.topology {
            CacheTopology::Cluster(cluster) => TopologyProfile::Cluster {
                read_from_replicas: cluster.read_from_replicas,
                require_full_coverage: cluster.require_full_coverage,
            },
            CacheTopology::SingleNode(single) => TopologyProfile::SingleNode {
                retry_on_timeout: single.retry_on_timeout,
            },
        };

        ConnectionProfile {
            uri: settings.build_uri(),
            socket_timeout: settings.socket_timeout_duration(),
            socket_connect_timeout: settings.socket_connect_timeout_duration(),
            socket_keepalive: settings.socket_keepalive,
            max_connections: settings.max_connections,
            health_check_interval: settings.health_check_interval_duration(),
            retry: RetryPolicy::STATIC,
            topology,
        }
    }

    pub fn deployment_mode(&self) -> DeploymentMode {
        match self.topology {
            TopologyProfile::Cluster { .. } => DeploymentMode::Cluster,
            TopologyProfile::SingleNode { .. } => DeploymentMode::SingleNode,
        }
    }

    /// Worst-case attempts for one connect or operation, across the retry
    /// policy and the client underneath it.
    pub fn effective_attempts(&self) -> u32 {
        self.retry
            .max_attempts()
            .saturating_mul(CLIENT_RETRIES.saturating_add(1))
    }

    /// Whether timeouts count as retryable.
    ///
    /// The cluster client always retries them; a single node follows
    /// `CACHE_RETRY_ON_TIMEOUT`.
    pub fn retry_on_timeout(&self) -> bool {
        match self.topology {
            TopologyProfile::Cluster { .. } => true,
            TopologyProfile::SingleNode { retry_on_timeout } => retry_on_timeout,
        }
    }
}
