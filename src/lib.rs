//! # connector-kit
//!
//! Environment-configured adapters for Redis and Kafka behind uniform
//! repository interfaces.
//!
//! ## Features
//!
//! - **Validated settings:** Every adapter is built from `CACHE_*` or
//!   `BROKER_*` variables; all invalid fields are reported together
//! - **Two cache topologies:** Single node (pooled) or Redis Cluster, chosen
//!   once by `CACHE_DEPLOYMENT_MODE`
//! - **Independent producer and consumer:** Either, both, or neither can run
//! - **Explicit lifecycle:** `connect` / `disconnect` / `healthcheck` on every
//!   adapter; data operations on a disconnected adapter fail with
//!   [`Error::NotConnected`]
//! - **Swappable contracts:** [`protocol`] traits let callers depend on
//!   capabilities instead of concrete adapters
//!
//! ## Quick Start
//!
//! ### Cache
//!
//! ```ignore
//! use connector_kit::cache::{CacheAdapter, CacheRepository};
//! use connector_kit::protocol::{CacheStore, ConnectionAdapter};
//!
//! // CACHE_DEPLOYMENT_MODE=single_node CACHE_HOST=localhost
//! let mut adapter = CacheAdapter::config()?;
//! adapter.connect().await?;
//!
//! let cache = CacheRepository::new(&adapter);
//! cache.set("user:1", b"alice").await?;
//! assert_eq!(cache.get("user:1").await?, Some(b"alice".to_vec()));
//!
//! adapter.disconnect().await?;
//! ```
//!
//! ### Broker
//!
//! ```ignore
//! use connector_kit::broker::{BrokerAdapter, BrokerRepository};
//! use connector_kit::protocol::{ConnectionAdapter, MessagePublisher, MessageSubscriber};
//!
//! let mut adapter = BrokerAdapter::config()?;
//! adapter.connect().await?;
//!
//! let broker = BrokerRepository::new(&adapter);
//! broker.produce("orders", &order).await?;
//! broker.consume(|message| async move {
//!     let order: Order = message.json()?;
//!     process(order).await
//! }).await?;
//! ```
//!
//! ## Cargo features
//!
//! - `redis` (default): [`cache::CacheAdapter`] and [`cache::CacheRepository`]
//! - `kafka`: [`broker::BrokerAdapter`] and [`broker::BrokerRepository`]
//! - `all`: both
//!
//! Settings types and the [`protocol`] traits are always available.

#[macro_use]
extern crate log;

pub mod broker;
pub mod cache;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod settings;

// Re-exports for convenience
pub use cache::KeyTtl;
pub use error::{Error, Result};
pub use protocol::{
    CacheStore, ConnectionAdapter, Health, HealthCheck, MessagePublisher, MessageSubscriber,
};
pub use settings::{EnvSource, FieldReport, ValidationErrors};

#[cfg(feature = "redis")]
pub use cache::{CacheAdapter, CacheRepository};
#[cfg(feature = "redis")]
pub use deadpool_redis::redis;

#[cfg(feature = "kafka")]
pub use broker::{BrokerAdapter, BrokerRepository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
