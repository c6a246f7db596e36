//! Cache repository: key-value operations over a connected [`CacheAdapter`].

use super::adapter::CacheAdapter;
use super::KeyTtl;
use crate::error::{Error, Result};
use crate::protocol::{CacheStore, Health, HealthCheck};
use deadpool_redis::redis::{self, Cmd, FromRedisValue, Value};

/// Stateless façade over a [`CacheAdapter`].
///
/// Each call checks a session out of the adapter, so the adapter must be
/// connected. Connection errors and timeouts are retried with the adapter's
/// static policy.
///
/// # Example
///
/// ```no_run
/// # use connector_kit::cache::{CacheAdapter, CacheRepository};
/// # use connector_kit::protocol::{CacheStore, ConnectionAdapter};
/// # use connector_kit::error::Result;
/// # async fn example() -> Result<()> {
/// let mut adapter = CacheAdapter::config()?;
/// adapter.connect().await?;
///
/// let cache = CacheRepository::new(&adapter);
/// cache.set("greeting", b"hello").await?;
/// cache.expire("greeting", 60).await?;
/// assert_eq!(cache.get("greeting").await?, Some(b"hello".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct CacheRepository<'a> {
    adapter: &'a CacheAdapter,
}

impl<'a> CacheRepository<'a> {
    pub fn new(adapter: &'a CacheAdapter) -> Self {
        CacheRepository { adapter }
    }

    pub fn adapter(&self) -> &'a CacheAdapter {
        self.adapter
    }

    async fn run<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let profile = self.adapter.profile();
        profile
            .retry
            .run(profile.retry_on_timeout(), || async {
                let mut session = self.adapter.get_session().await?;
                session.query(cmd).await
            })
            .await
    }
}

impl CacheStore for CacheRepository<'_> {
    async fn set(&self, key: &str, value: &[u8]) -> Result<bool> {
        let reply: Value = self.run(redis::cmd("SET").arg(key).arg(value)).await?;
        let stored = match reply {
            Value::Okay => true,
            Value::SimpleString(status) => status == "OK",
            _ => false,
        };
        debug!("✓ Redis SET {} -> {}", key, stored);
        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self.run(redis::cmd("GET").arg(key)).await?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.run(redis::cmd("DEL").arg(keys)).await?;
        debug!("✓ Redis DEL {} keys -> {} removed", keys.len(), removed);
        Ok(removed)
    }

    async fn exists(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let present: u64 = self.run(redis::cmd("EXISTS").arg(keys)).await?;
        Ok(present)
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        let applied: i64 = self.run(redis::cmd("EXPIRE").arg(key).arg(seconds)).await?;
        debug!("✓ Redis EXPIRE {} {}s -> {}", key, seconds, applied == 1);
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let seconds: i64 = self.run(redis::cmd("TTL").arg(key)).await?;
        Ok(KeyTtl::from_reply(seconds))
    }
}

impl HealthCheck for CacheRepository<'_> {
    async fn healthcheck(&self) -> Health {
        let result = async {
            let mut session = self.adapter.get_session().await?;
            let _: String = session.query(&redis::cmd("PING")).await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = &result {
            warn!("⚠ Cache repository healthcheck failed: {}", e);
        }
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::settings::EnvSource;

    fn adapter() -> CacheAdapter {
        let source = EnvSource::from_pairs([
            ("CACHE_DEPLOYMENT_MODE", "single_node"),
            ("CACHE_HOST", "localhost"),
        ]);
        CacheAdapter::new(CacheSettings::from_source(&source).expect("valid settings"))
    }

    #[tokio::test]
    async fn test_operations_fail_when_disconnected() {
        let adapter = adapter();
        let cache = CacheRepository::new(&adapter);

        assert!(matches!(cache.get("k").await, Err(Error::NotConnected(_))));
        assert!(matches!(cache.set("k", b"v").await, Err(Error::NotConnected(_))));
        assert!(matches!(cache.ttl("k").await, Err(Error::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_empty_key_lists_short_circuit() {
        let adapter = adapter();
        let cache = CacheRepository::new(&adapter);

        assert_eq!(cache.delete(&[]).await.expect("no round trip"), 0);
        assert_eq!(cache.exists(&[]).await.expect("no round trip"), 0);
    }

    #[tokio::test]
    async fn test_healthcheck_never_errors() {
        let adapter = adapter();
        let health = CacheRepository::new(&adapter).healthcheck().await;
        assert!(!health.ok);
        assert!(health.diagnostic.is_some());
    }
}
