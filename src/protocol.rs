//! Capability contracts exposed to calling code.
//!
//! These traits describe *what* an adapter or repository offers so that
//! application code can depend on the capability instead of the concrete
//! Redis or Kafka type. They carry no behavior of their own.
//!
//! | Contract | Implemented by |
//! |----------|----------------|
//! | [`HealthCheck`] | `CacheAdapter`, `CacheRepository`, `BrokerAdapter`, `BrokerRepository` |
//! | [`ConnectionAdapter`] | `CacheAdapter`, `BrokerAdapter` |
//! | [`CacheStore`] | `CacheRepository` |
//! | [`MessagePublisher`] | `BrokerRepository` |
//! | [`MessageSubscriber`] | `BrokerRepository` |
//!
//! # Substituting an implementation
//!
//! ```
//! use connector_kit::protocol::{Health, HealthCheck};
//!
//! struct AlwaysUp;
//!
//! impl HealthCheck for AlwaysUp {
//!     async fn healthcheck(&self) -> Health {
//!         Health::healthy()
//!     }
//! }
//!
//! async fn readiness(target: &impl HealthCheck) -> bool {
//!     target.healthcheck().await.ok
//! }
//! ```

use crate::error::Result;
use serde::Serialize;
use std::future::Future;

/// Outcome of a liveness check.
///
/// Checks never fail; transport errors become `ok == false` with the error
/// text as diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Health {
    pub ok: bool,
    pub diagnostic: Option<String>,
}

impl Health {
    pub fn healthy() -> Self {
        Health {
            ok: true,
            diagnostic: None,
        }
    }

    /// An empty message is replaced so the diagnostic is never blank.
    pub fn unhealthy(diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Health {
            ok: false,
            diagnostic: Some(if diagnostic.trim().is_empty() {
                "unknown failure".to_string()
            } else {
                diagnostic
            }),
        }
    }

    /// `(ok, diagnostic)` pair.
    pub fn into_parts(self) -> (bool, Option<String>) {
        (self.ok, self.diagnostic)
    }
}

impl<E: std::fmt::Display> From<std::result::Result<(), E>> for Health {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Health::healthy(),
            Err(e) => Health::unhealthy(e.to_string()),
        }
    }
}

/// Liveness check.
#[allow(async_fn_in_trait)]
pub trait HealthCheck {
    /// Check the underlying system. Never returns an error.
    async fn healthcheck(&self) -> Health;
}

/// Connect/disconnect lifecycle shared by adapters.
#[allow(async_fn_in_trait)]
pub trait ConnectionAdapter: HealthCheck {
    /// Establish the live handle(s).
    ///
    /// # Errors
    /// Returns `Err` if the client cannot be configured or reached.
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the live handle(s). Calling it twice is a no-op.
    ///
    /// # Errors
    /// Returns `Err` if the client fails while flushing or closing.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether at least one live handle exists.
    fn is_connected(&self) -> bool;
}

/// Key-value cache operations.
#[allow(async_fn_in_trait)]
pub trait CacheStore: HealthCheck {
    /// Store `value` at `key`. Returns whether the server acknowledged the write.
    async fn set(&self, key: &str, value: &[u8]) -> Result<bool>;

    /// Fetch the value at `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove keys, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> Result<u64>;

    /// Count how many of `keys` exist.
    async fn exists(&self, keys: &[&str]) -> Result<u64>;

    /// Set a timeout in seconds on `key`. `false` when the key does not exist.
    async fn expire(&self, key: &str, seconds: i64) -> Result<bool>;

    /// Remaining time to live of `key`.
    async fn ttl(&self, key: &str) -> Result<crate::KeyTtl>;
}

/// Publishing side of a message broker.
#[allow(async_fn_in_trait)]
pub trait MessagePublisher {
    /// Serialize `message` as JSON and wait for the broker acknowledgement.
    async fn produce<M>(&self, topic: &str, message: &M) -> Result<()>
    where
        M: Serialize + ?Sized;
}

/// Consuming side of a message broker.
#[allow(async_fn_in_trait)]
pub trait MessageSubscriber {
    type Message;

    /// Feed every incoming message to `handler`, in arrival order.
    ///
    /// Runs until the handler or the consumer fails; drop the future to stop.
    async fn consume<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: FnMut(Self::Message) -> Fut,
        Fut: Future<Output = Result<()>>;
}
