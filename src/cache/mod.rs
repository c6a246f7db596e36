//! Redis cache adapter, settings, and repository.
//!
//! Settings and the connection profile are always available; the adapter and
//! repository need the `redis` feature.

#[cfg(feature = "redis")]
pub mod adapter;
pub mod profile;
#[cfg(feature = "redis")]
pub mod repository;
pub mod settings;

#[cfg(feature = "redis")]
pub use adapter::{CacheAdapter, CacheSession};
pub use profile::{ConnectionProfile, TopologyProfile, CLIENT_RETRIES};
#[cfg(feature = "redis")]
pub use repository::CacheRepository;
pub use settings::{
    CacheModeSettings, CacheSettings, CacheTopology, ClusterSettings, DeploymentMode,
    SingleNodeSettings, MAX_SINGLE_NODE_DB,
};

use std::time::Duration;

/// Remaining lifetime of a key, as reported by `TTL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after this many seconds.
    Expires(Duration),
}

impl KeyTtl {
    /// Interpret the integer reply of `TTL` (`-2` missing, `-1` no expiry).
    pub fn from_reply(seconds: i64) -> Self {
        match seconds {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            s => KeyTtl::Expires(Duration::from_secs(s as u64)),
        }
    }

    /// The raw `TTL` reply this value corresponds to.
    pub fn as_seconds(&self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::Persistent => -1,
            KeyTtl::Expires(d) => d.as_secs() as i64,
        }
    }
}
