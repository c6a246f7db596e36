//! Redis connection adapter.
//!
//! Owns at most one live handle: a connection pool for a single node, or a
//! multiplexed cluster connection. Which one is decided by the settings the
//! adapter is built with and cannot change afterwards.

use super::profile::{ConnectionProfile, TopologyProfile, CLIENT_RETRIES};
use super::settings::{CacheSettings, DeploymentMode};
use crate::error::{Error, Result};
use crate::protocol::{ConnectionAdapter, Health, HealthCheck};
use crate::settings::EnvSource;
use deadpool_redis::redis::cluster::ClusterClientBuilder;
use deadpool_redis::redis::cluster_async::ClusterConnection;
use deadpool_redis::redis::{self, Cmd, FromRedisValue};
use deadpool_redis::{Config as RedisPoolConfig, Connection, Pool, PoolConfig, Runtime};

/// The live client handle, one variant per deployment mode.
enum LiveHandle {
    SingleNode(Pool),
    Cluster(ClusterConnection),
}

/// A connection borrowed from the adapter for the duration of one use.
///
/// Single-node sessions are pooled connections that go back to the pool on
/// drop. Cluster sessions are clones of the shared multiplexed connection.
pub enum CacheSession {
    SingleNode(Connection),
    Cluster(ClusterConnection),
}

impl CacheSession {
    /// Run one command on this session.
    ///
    /// # Errors
    /// Returns `Err` if the command fails or the reply has an unexpected type.
    pub async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> Result<T> {
        let value: T = match self {
            CacheSession::SingleNode(conn) => cmd.query_async(&mut **conn).await?,
            CacheSession::Cluster(conn) => cmd.query_async(conn).await?,
        };
        Ok(value)
    }
}

/// Redis adapter for single-node and cluster deployments.
///
/// # Example
///
/// ```no_run
/// # use connector_kit::cache::CacheAdapter;
/// # use connector_kit::protocol::ConnectionAdapter;
/// # use connector_kit::error::Result;
/// # async fn example() -> Result<()> {
/// // CACHE_DEPLOYMENT_MODE=single_node CACHE_HOST=localhost
/// let mut adapter = CacheAdapter::config()?;
/// adapter.connect().await?;
///
/// let mut session = adapter.get_session().await?;
/// let pong: String = session.query(&connector_kit::redis::cmd("PING")).await?;
///
/// adapter.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheAdapter {
    settings: CacheSettings,
    profile: ConnectionProfile,
    handle: Option<LiveHandle>,
}

impl CacheAdapter {
    /// Create an adapter without connecting.
    pub fn new(settings: CacheSettings) -> Self {
        let profile = ConnectionProfile::from_settings(&settings);
        CacheAdapter {
            settings,
            profile,
            handle: None,
        }
    }

    /// Build from the process environment, topology chosen by
    /// `CACHE_DEPLOYMENT_MODE`.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the settings are invalid.
    pub fn config() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    /// Build from an explicit environment source.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the settings are invalid.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        Ok(Self::new(CacheSettings::from_source(source)?))
    }

    /// Build a cluster adapter from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the settings are invalid.
    pub fn cluster_config() -> Result<Self> {
        Ok(Self::new(CacheSettings::cluster_from_source(
            &EnvSource::from_env(),
        )?))
    }

    /// Build a single-node adapter from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the settings are invalid.
    pub fn single_node_config() -> Result<Self> {
        Ok(Self::new(CacheSettings::single_node_from_source(
            &EnvSource::from_env(),
        )?))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub fn deployment_mode(&self) -> DeploymentMode {
        self.profile.deployment_mode()
    }

    /// Borrow the live handle.
    ///
    /// Does not retry; callers wrap it in the retry policy when needed.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` before `connect()` or after
    /// `disconnect()`, or a pool error if no connection can be checked out.
    pub async fn get_session(&self) -> Result<CacheSession> {
        match &self.handle {
            None => Err(Error::NotConnected(
                "cache adapter has no live connection; call connect() first".to_string(),
            )),
            Some(LiveHandle::SingleNode(pool)) => {
                let conn = pool.get().await?;
                Ok(CacheSession::SingleNode(conn))
            }
            Some(LiveHandle::Cluster(conn)) => Ok(CacheSession::Cluster(conn.clone())),
        }
    }

    fn create_pool(&self) -> Result<Pool> {
        let mut cfg = RedisPoolConfig::from_url(self.profile.uri.clone());
        let mut pool = PoolConfig::new(self.profile.max_connections as usize);
        pool.timeouts.wait = Some(self.profile.socket_timeout);
        pool.timeouts.create = Some(self.profile.socket_connect_timeout);
        pool.timeouts.recycle = Some(self.profile.socket_timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("Failed to create Redis pool: {}", e)))
    }

    async fn connect_single_node(&self) -> Result<LiveHandle> {
        let pool = self.create_pool()?;

        let pong: String = self
            .profile
            .retry
            .run(self.profile.retry_on_timeout(), || async {
                let mut conn = pool.get().await?;
                let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
                Ok::<String, Error>(pong)
            })
            .await?;

        let status = pool.status();
        info!(
            "✓ Redis single node connected: {} (PING: {}, pool: {}/{})",
            self.profile.uri, pong, status.size, status.max_size
        );

        Ok(LiveHandle::SingleNode(pool))
    }

    async fn connect_cluster(
        &self,
        read_from_replicas: bool,
        require_full_coverage: bool,
    ) -> Result<LiveHandle> {
        let retry = self.profile.retry;
        let mut builder = ClusterClientBuilder::new(vec![self.profile.uri.clone()])
            .connection_timeout(self.profile.socket_connect_timeout)
            .response_timeout(self.profile.socket_timeout)
            .retries(CLIENT_RETRIES);
        if read_from_replicas {
            builder = builder.read_from_replicas();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build Redis cluster client: {}", e)))?;

        let mut conn = retry
            .run(true, || async {
                client.get_async_connection().await.map_err(Error::from)
            })
            .await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        if require_full_coverage {
            let info: String = redis::cmd("CLUSTER").arg("INFO").query_async(&mut conn).await?;
            if !info.lines().any(|line| line.trim() == "cluster_state:ok") {
                return Err(Error::Connection(
                    "Redis cluster does not cover all hash slots (cluster_state is not ok)"
                        .to_string(),
                ));
            }
        }

        let nodes: String = redis::cmd("CLUSTER").arg("NODES").query_async(&mut conn).await?;
        info!(
            "✓ Redis cluster connected: {} (PING: {}, nodes: {})",
            self.profile.uri,
            pong,
            nodes.lines().filter(|l| !l.trim().is_empty()).count()
        );
        debug!("Redis cluster nodes:\n{}", nodes);

        Ok(LiveHandle::Cluster(conn))
    }
}

impl ConnectionAdapter for CacheAdapter {
    async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("Redis adapter already connected, reconnecting");
            self.disconnect().await?;
        }

        info!(
            "Redis adapter connecting: {} (mode: {})",
            self.profile.uri,
            self.deployment_mode()
        );

        let handle = match self.profile.topology {
            TopologyProfile::SingleNode { .. } => self.connect_single_node().await?,
            TopologyProfile::Cluster {
                read_from_replicas,
                require_full_coverage,
            } => {
                self.connect_cluster(read_from_replicas, require_full_coverage)
                    .await?
            }
        };

        self.handle = Some(handle);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(LiveHandle::SingleNode(pool)) => {
                pool.close();
                info!("✓ Redis single node disconnected");
            }
            Some(LiveHandle::Cluster(conn)) => {
                drop(conn);
                info!("✓ Redis cluster disconnected");
            }
            None => debug!("Redis adapter already disconnected"),
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }
}

impl HealthCheck for CacheAdapter {
    async fn healthcheck(&self) -> Health {
        let result = async {
            let mut session = self.get_session().await?;
            let _: String = session.query(&redis::cmd("PING")).await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = &result {
            warn!("⚠ Redis healthcheck failed: {}", e);
        }
        result.into()
    }
}
