//! Cache settings resolved from `CACHE_*` environment variables.
//!
//! | Variable | Field | Default | Bound |
//! |----------|-------|---------|-------|
//! | `CACHE_DEPLOYMENT_MODE` | `deployment_mode` | required | `cluster` / `single_node` |
//! | `CACHE_HOST` | `host` | required | |
//! | `CACHE_PORT` | `port` | 6379 | > 0 |
//! | `CACHE_DB` | `db` | 0 | cluster: 0 only; single node: 0..=15 |
//! | `CACHE_MAX_CONNECTIONS` | `max_connections` | 10 | > 0 |
//! | `CACHE_SOCKET_TIMEOUT` | `socket_timeout` | 5 s | > 0 |
//! | `CACHE_SOCKET_CONNECT_TIMEOUT` | `socket_connect_timeout` | 5 s | > 0 |
//! | `CACHE_SOCKET_KEEPALIVE` | `socket_keepalive` | true | |
//! | `CACHE_HEALTH_CHECK_INTERVAL` | `health_check_interval` | 10 s | > 0 |
//! | `CACHE_READ_FROM_REPLICAS` | `read_from_replicas` (cluster) | true | |
//! | `CACHE_REQUIRE_FULL_COVERAGE` | `require_full_coverage` (cluster) | false | |
//! | `CACHE_RETRY_ON_TIMEOUT` | `retry_on_timeout` (single node) | true | |

use crate::error::Result;
use crate::settings::{field_violation, EnvSource, FieldReader};
use config::Config;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

const PREFIX: &str = "CACHE";

/// Highest logical database a single node accepts.
pub const MAX_SINGLE_NODE_DB: u32 = 15;

/// Redis deployment topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Cluster,
    #[default]
    SingleNode,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Cluster => "cluster",
            DeploymentMode::SingleNode => "single_node",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, String> {
        match raw.to_ascii_lowercase().as_str() {
            "cluster" => Ok(DeploymentMode::Cluster),
            "single_node" => Ok(DeploymentMode::SingleNode),
            _ => Err(format!(
                "'{}' is not a valid deployment mode (expected 'cluster' or 'single_node')",
                raw
            )),
        }
    }
}

fn reader(source: &EnvSource) -> Result<FieldReader> {
    let config = Config::builder()
        .set_default("port", 6379)?
        .set_default("db", 0)?
        .set_default("max_connections", 10)?
        .set_default("socket_timeout", 5)?
        .set_default("socket_connect_timeout", 5)?
        .set_default("socket_keepalive", true)?
        .set_default("health_check_interval", 10)?
        .set_default("read_from_replicas", true)?
        .set_default("require_full_coverage", false)?
        .set_default("retry_on_timeout", true)?
        .add_source(source.environment(PREFIX))
        .build()?;
    Ok(FieldReader::new(config, PREFIX))
}

/// Only the deployment mode, used to pick which full settings to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CacheModeSettings {
    pub deployment_mode: DeploymentMode,
}

impl CacheModeSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(source)?;
        let settings = CacheModeSettings {
            deployment_mode: reader.required_with("deployment_mode", DeploymentMode::from_str),
        };
        Ok(reader.finish(settings)?)
    }
}

/// Settings that only apply to a Redis Cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub read_from_replicas: bool,
    pub require_full_coverage: bool,
}

/// Settings that only apply to a single Redis node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleNodeSettings {
    pub retry_on_timeout: bool,
}

/// Mode-specific part of [`CacheSettings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "deployment_mode", rename_all = "snake_case")]
pub enum CacheTopology {
    Cluster(ClusterSettings),
    SingleNode(SingleNodeSettings),
}

/// Validated cache settings.
///
/// Durations are kept in whole seconds, as they appear in the environment;
/// use the `*_duration` accessors to get a [`Duration`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_db_for_topology", skip_on_field_errors = false))]
pub struct CacheSettings {
    pub host: String,
    #[validate(range(min = 1, message = "CACHE_PORT must be greater than 0"))]
    pub port: u16,
    pub db: u32,
    #[validate(range(min = 1, message = "CACHE_MAX_CONNECTIONS must be greater than 0"))]
    pub max_connections: u32,
    #[validate(range(min = 1, message = "CACHE_SOCKET_TIMEOUT must be greater than 0"))]
    pub socket_timeout: u64,
    #[validate(range(min = 1, message = "CACHE_SOCKET_CONNECT_TIMEOUT must be greater than 0"))]
    pub socket_connect_timeout: u64,
    pub socket_keepalive: bool,
    #[validate(range(min = 1, message = "CACHE_HEALTH_CHECK_INTERVAL must be greater than 0"))]
    pub health_check_interval: u64,
    #[serde(flatten)]
    pub topology: CacheTopology,
}

/// A cluster only serves db 0; a single node serves 0..=15.
fn validate_db_for_topology(settings: &CacheSettings) -> std::result::Result<(), ValidationError> {
    match settings.topology {
        CacheTopology::Cluster(_) if settings.db != 0 => Err(field_violation(
            "cluster_db",
            "db",
            format!("CACHE_DB must be 0 or unset in cluster mode, got {}", settings.db),
        )),
        CacheTopology::SingleNode(_) if settings.db > MAX_SINGLE_NODE_DB => Err(field_violation(
            "db_range",
            "db",
            format!(
                "CACHE_DB {} is outside the allowed range 0..={}",
                settings.db, MAX_SINGLE_NODE_DB
            ),
        )),
        _ => Ok(()),
    }
}

impl CacheSettings {
    /// Resolve settings from the process environment, choosing the topology
    /// from `CACHE_DEPLOYMENT_MODE`.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    /// Resolve settings from `source`, choosing the topology from
    /// `CACHE_DEPLOYMENT_MODE`.
    ///
    /// When the mode is missing or invalid only the shared fields are
    /// checked alongside it; `db` and the topology fields depend on the mode.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(source)?;
        let mode = reader.optional_with("deployment_mode", DeploymentMode::from_str);
        if mode.is_none() && !reader.has_error("deployment_mode") {
            let message = format!("{} is required", reader.variable("deployment_mode"));
            reader.reject("deployment_mode", "required", message);
        }
        Self::resolve(reader, mode)
    }

    /// Resolve Redis Cluster settings.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field, including a
    /// `CACHE_DB` other than 0.
    pub fn cluster_from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(source)?;
        Self::expect_mode(&mut reader, DeploymentMode::Cluster);
        Self::resolve(reader, Some(DeploymentMode::Cluster))
    }

    /// Resolve single-node settings.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn single_node_from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(source)?;
        Self::expect_mode(&mut reader, DeploymentMode::SingleNode);
        Self::resolve(reader, Some(DeploymentMode::SingleNode))
    }

    fn expect_mode(reader: &mut FieldReader, expected: DeploymentMode) {
        let declared = reader.optional_with("deployment_mode", DeploymentMode::from_str);
        if let Some(declared) = declared.filter(|declared| *declared != expected) {
            let message = format!(
                "{} declares '{}' but {} settings were requested",
                reader.variable("deployment_mode"),
                declared,
                expected
            );
            reader.reject("deployment_mode", "mode_mismatch", message);
        }
    }

    fn resolve(mut reader: FieldReader, mode: Option<DeploymentMode>) -> Result<Self> {
        let host = reader.required("host");
        let port = reader.required("port");
        let max_connections = reader.required("max_connections");
        let socket_timeout = reader.required("socket_timeout");
        let socket_connect_timeout = reader.required("socket_connect_timeout");
        let socket_keepalive = reader.required("socket_keepalive");
        let health_check_interval = reader.required("health_check_interval");

        let (db, topology) = match mode {
            Some(DeploymentMode::Cluster) => {
                let cluster = ClusterSettings {
                    read_from_replicas: reader.required("read_from_replicas"),
                    require_full_coverage: reader.required("require_full_coverage"),
                };
                (reader.required("db"), CacheTopology::Cluster(cluster))
            }
            Some(DeploymentMode::SingleNode) => {
                let single = SingleNodeSettings {
                    retry_on_timeout: reader.required("retry_on_timeout"),
                };
                (reader.required("db"), CacheTopology::SingleNode(single))
            }
            // The mode already failed; leave mode-specific fields unchecked.
            None => (
                0,
                CacheTopology::SingleNode(SingleNodeSettings {
                    retry_on_timeout: true,
                }),
            ),
        };

        let settings = CacheSettings {
            host,
            port,
            db,
            max_connections,
            socket_timeout,
            socket_connect_timeout,
            socket_keepalive,
            health_check_interval,
            topology,
        };
        Ok(reader.finish(settings)?)
    }

    pub fn deployment_mode(&self) -> DeploymentMode {
        match self.topology {
            CacheTopology::Cluster(_) => DeploymentMode::Cluster,
            CacheTopology::SingleNode(_) => DeploymentMode::SingleNode,
        }
    }

    /// Connection URI, `redis://{host}:{port}/{db}`.
    pub fn build_uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn socket_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.socket_timeout)
    }

    pub fn socket_connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.socket_connect_timeout)
    }

    pub fn health_check_interval_duration(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }
}
