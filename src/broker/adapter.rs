//! Kafka connection adapter.
//!
//! Producer and consumer are independent: each is started when its settings
//! were supplied and stopped on its own during `disconnect`. Blocking client
//! calls (metadata, flush, close) run on the blocking thread pool.

use super::settings::{ConsumerSettings, ProducerSettings};
use crate::error::{Error, Result};
use crate::protocol::{ConnectionAdapter, Health, HealthCheck};
use crate::settings::EnvSource;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, Producer};
use std::sync::Arc;

/// What the cluster reported in one metadata round trip.
#[derive(Debug, Default)]
struct ClusterSummary {
    brokers: usize,
    topics: Vec<(String, usize)>,
}

impl ClusterSummary {
    fn from_metadata(metadata: &Metadata) -> Self {
        ClusterSummary {
            brokers: metadata.brokers().len(),
            topics: metadata
                .topics()
                .iter()
                .map(|t| (t.name().to_string(), t.partitions().len()))
                .collect(),
        }
    }

    fn partitions(&self, topic: &str) -> Option<usize> {
        self.topics
            .iter()
            .find(|(name, _)| name == topic)
            .map(|(_, partitions)| *partitions)
    }
}

/// Client properties for the producer.
pub fn producer_client_config(settings: &ProducerSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.broker.bootstrap_servers)
        .set(
            "request.timeout.ms",
            settings.broker.request_timeout_ms.to_string(),
        )
        .set("acks", settings.acks.parsed().to_string())
        .set(
            "connections.max.idle.ms",
            settings.connections_max_idle_ms.to_string(),
        );
    config
}

/// Client properties for the consumer.
pub fn consumer_client_config(settings: &ConsumerSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.broker.bootstrap_servers)
        .set(
            "socket.timeout.ms",
            settings.broker.request_timeout_ms.to_string(),
        )
        .set("group.id", &settings.group_id)
        .set("enable.auto.commit", settings.enable_auto_commit.to_string())
        .set(
            "max.poll.interval.ms",
            settings.max_poll_interval_ms.to_string(),
        )
        .set("session.timeout.ms", settings.session_timeout_ms.to_string())
        .set(
            "heartbeat.interval.ms",
            settings.heartbeat_interval_ms.to_string(),
        )
        .set("isolation.level", settings.isolation_level.as_str())
        .set("auto.offset.reset", settings.auto_offset_reset.as_str());
    config
}

/// Run a blocking client call off the async runtime.
async fn blocking<T, F>(what: &'static str, call: F) -> Result<T>
where
    F: FnOnce() -> KafkaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| Error::Broker(format!("Kafka {} task failed: {}", what, e)))?
        .map_err(Error::from)
}

/// Kafka adapter with an optional producer and an optional consumer.
///
/// # Example
///
/// ```no_run
/// # use connector_kit::broker::BrokerAdapter;
/// # use connector_kit::protocol::{ConnectionAdapter, HealthCheck};
/// # use connector_kit::error::Result;
/// # async fn example() -> Result<()> {
/// // BROKER_BOOTSTRAP_SERVERS=localhost:9092
/// let mut adapter = BrokerAdapter::producer_config()?;
/// adapter.connect().await?;
/// assert!(adapter.healthcheck().await.ok);
/// adapter.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct BrokerAdapter {
    producer_settings: Option<ProducerSettings>,
    consumer_settings: Option<ConsumerSettings>,
    producer: Option<FutureProducer>,
    consumer: Option<Arc<StreamConsumer>>,
}

impl BrokerAdapter {
    /// Create an adapter without connecting.
    pub fn new(
        producer_settings: Option<ProducerSettings>,
        consumer_settings: Option<ConsumerSettings>,
    ) -> Self {
        BrokerAdapter {
            producer_settings,
            consumer_settings,
            producer: None,
            consumer: None,
        }
    }

    /// Producer-only adapter from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the producer settings are invalid.
    pub fn producer_config() -> Result<Self> {
        Ok(Self::new(Some(ProducerSettings::from_env()?), None))
    }

    /// Consumer-only adapter from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the consumer settings are invalid.
    pub fn consumer_config() -> Result<Self> {
        Ok(Self::new(None, Some(ConsumerSettings::from_env()?)))
    }

    /// Producer and consumer from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Validation` if either side is invalid.
    pub fn config() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    /// Producer and consumer from an explicit environment source.
    ///
    /// # Errors
    /// Returns `Error::Validation` if either side is invalid.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        Ok(Self::new(
            Some(ProducerSettings::from_source(source)?),
            Some(ConsumerSettings::from_source(source)?),
        ))
    }

    pub fn producer_settings(&self) -> Option<&ProducerSettings> {
        self.producer_settings.as_ref()
    }

    pub fn consumer_settings(&self) -> Option<&ConsumerSettings> {
        self.consumer_settings.as_ref()
    }

    pub fn is_producer_running(&self) -> bool {
        self.producer.is_some()
    }

    pub fn is_consumer_running(&self) -> bool {
        self.consumer.is_some()
    }

    /// The running producer with its settings.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` when no producer is running.
    pub fn live_producer(&self) -> Result<(&FutureProducer, &ProducerSettings)> {
        match (&self.producer, &self.producer_settings) {
            (Some(producer), Some(settings)) => Ok((producer, settings)),
            _ => Err(Error::NotConnected(
                "broker adapter has no running producer; call connect() first".to_string(),
            )),
        }
    }

    /// The running consumer with its settings.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` when no consumer is running.
    pub fn live_consumer(&self) -> Result<(&StreamConsumer, &ConsumerSettings)> {
        match (&self.consumer, &self.consumer_settings) {
            (Some(consumer), Some(settings)) => Ok((consumer.as_ref(), settings)),
            _ => Err(Error::NotConnected(
                "broker adapter has no running consumer; call connect() first".to_string(),
            )),
        }
    }

    fn create_producer(settings: &ProducerSettings) -> Result<FutureProducer> {
        Ok(producer_client_config(settings).create()?)
    }

    async fn verify_producer(producer: &FutureProducer, settings: &ProducerSettings) -> Result<()> {
        let client = producer.clone();
        let timeout = settings.broker.request_timeout();
        let summary = blocking("metadata", move || {
            client
                .client()
                .fetch_metadata(None, timeout)
                .map(|m| ClusterSummary::from_metadata(&m))
        })
        .await?;

        info!(
            "✓ Kafka producer started: {} (acks: {}, brokers: {})",
            settings.broker.bootstrap_servers,
            settings.acks.parsed(),
            summary.brokers
        );
        Ok(())
    }

    fn create_consumer(settings: &ConsumerSettings) -> Result<Arc<StreamConsumer>> {
        let consumer: StreamConsumer = consumer_client_config(settings).create()?;
        let topics: Vec<&str> = settings.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;
        Ok(Arc::new(consumer))
    }

    async fn verify_consumer(
        consumer: &Arc<StreamConsumer>,
        settings: &ConsumerSettings,
    ) -> Result<()> {
        let client = Arc::clone(consumer);
        let timeout = settings.broker.request_timeout();
        let summary = blocking("metadata", move || {
            client
                .fetch_metadata(None, timeout)
                .map(|m| ClusterSummary::from_metadata(&m))
        })
        .await?;

        info!(
            "✓ Kafka consumer started: {} (group: {}, brokers: {})",
            settings.broker.bootstrap_servers, settings.group_id, summary.brokers
        );
        for topic in &settings.topics {
            match summary.partitions(topic) {
                Some(partitions) => {
                    info!("✓ Kafka topic '{}' available ({} partitions)", topic, partitions)
                }
                None => warn!("⚠ Kafka topic '{}' not found in cluster metadata", topic),
            }
        }

        Ok(())
    }
}

impl ConnectionAdapter for BrokerAdapter {
    /// Start every configured side that is not already running.
    ///
    /// Nothing is kept unless every requested side starts: clients are
    /// created first, then checked against the cluster, and only stored once
    /// both checks pass. A failed connect leaves the adapter as it was.
    async fn connect(&mut self) -> Result<()> {
        if self.producer_settings.is_none() && self.consumer_settings.is_none() {
            warn!("⚠ Kafka adapter has neither producer nor consumer settings; nothing to start");
            return Ok(());
        }

        let producer = match (&self.producer, &self.producer_settings) {
            (None, Some(settings)) => Some(Self::create_producer(settings)?),
            _ => None,
        };
        let consumer = match (&self.consumer, &self.consumer_settings) {
            (None, Some(settings)) => Some(Self::create_consumer(settings)?),
            _ => None,
        };

        if let (Some(producer), Some(settings)) = (&producer, &self.producer_settings) {
            Self::verify_producer(producer, settings).await?;
        }
        if let (Some(consumer), Some(settings)) = (&consumer, &self.consumer_settings) {
            Self::verify_consumer(consumer, settings).await?;
        }

        if producer.is_some() {
            self.producer = producer;
        }
        if consumer.is_some() {
            self.consumer = consumer;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut first_error = None;

        match (self.producer.take(), &self.producer_settings) {
            (Some(producer), Some(settings)) => {
                let timeout = settings.broker.request_timeout();
                match blocking("flush", move || producer.flush(timeout)).await {
                    Ok(()) => info!("✓ Kafka producer stopped"),
                    Err(e) => {
                        warn!("⚠ Kafka producer flush failed: {}", e);
                        first_error = Some(e);
                    }
                }
            }
            (Some(_), None) => info!("✓ Kafka producer stopped"),
            (None, _) => debug!("Kafka producer already stopped"),
        }

        match self.consumer.take() {
            Some(consumer) => {
                let stopped = blocking("close", move || {
                    consumer.unsubscribe();
                    drop(consumer);
                    Ok(())
                })
                .await;
                match stopped {
                    Ok(()) => info!("✓ Kafka consumer stopped"),
                    Err(e) => {
                        warn!("⚠ Kafka consumer close failed: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            None => debug!("Kafka consumer already stopped"),
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.producer.is_some() || self.consumer.is_some()
    }
}

impl HealthCheck for BrokerAdapter {
    async fn healthcheck(&self) -> Health {
        let result = if let Ok((producer, settings)) = self.live_producer() {
            let client = producer.clone();
            let timeout = settings.broker.request_timeout();
            blocking("metadata", move || {
                client.client().fetch_metadata(None, timeout).map(|_| ())
            })
            .await
        } else if let (Some(consumer), Some(settings)) = (&self.consumer, &self.consumer_settings)
        {
            let client = Arc::clone(consumer);
            let timeout = settings.broker.request_timeout();
            blocking("metadata", move || client.fetch_metadata(None, timeout).map(|_| ())).await
        } else {
            Err(Error::NotConnected(
                "broker adapter has no running producer or consumer".to_string(),
            ))
        };

        if let Err(e) = &result {
            warn!("⚠ Kafka healthcheck failed: {}", e);
        }
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> EnvSource {
        EnvSource::from_pairs([
            ("BROKER_BOOTSTRAP_SERVERS", "127.0.0.1:1"),
            ("BROKER_ACKS", "1"),
            ("BROKER_TOPICS", "orders"),
            ("BROKER_GROUP_ID", "billing"),
            ("BROKER_MAX_POLL_RECORDS", "10"),
            ("BROKER_ENABLE_AUTO_COMMIT", "false"),
            ("BROKER_MAX_POLL_INTERVAL_MS", "100000"),
            ("BROKER_SESSION_TIMEOUT_MS", "30000"),
            ("BROKER_HEARTBEAT_INTERVAL_MS", "10000"),
            ("BROKER_CONSUMER_TIMEOUT_MS", "500"),
            ("BROKER_ISOLATION_LEVEL", "read_committed"),
        ])
    }

    #[test]
    fn test_producer_client_config() {
        let settings = ProducerSettings::from_source(&source()).expect("valid settings");
        let config = producer_client_config(&settings);
        assert_eq!(config.get("bootstrap.servers"), Some("127.0.0.1:1"));
        assert_eq!(config.get("acks"), Some("1"));
        assert_eq!(config.get("request.timeout.ms"), Some("5000"));
        assert_eq!(config.get("connections.max.idle.ms"), Some("10000"));
    }

    #[test]
    fn test_consumer_client_config() {
        let settings = ConsumerSettings::from_source(&source()).expect("valid settings");
        let config = consumer_client_config(&settings);
        assert_eq!(config.get("group.id"), Some("billing"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("session.timeout.ms"), Some("30000"));
        assert_eq!(config.get("heartbeat.interval.ms"), Some("10000"));
        assert_eq!(config.get("isolation.level"), Some("read_committed"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
    }

    #[tokio::test]
    async fn test_healthcheck_when_disconnected() {
        let adapter = BrokerAdapter::from_source(&source()).expect("valid settings");
        let (ok, diagnostic) = adapter.healthcheck().await.into_parts();
        assert!(!ok);
        assert!(diagnostic.is_some_and(|d| !d.is_empty()));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut adapter = BrokerAdapter::from_source(&source()).expect("valid settings");
        adapter.disconnect().await.expect("first disconnect");
        adapter.disconnect().await.expect("second disconnect");
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_connect_without_settings_is_noop() {
        let mut adapter = BrokerAdapter::new(None, None);
        adapter.connect().await.expect("nothing to start");
        assert!(!adapter.is_connected());
        assert!(matches!(adapter.live_producer(), Err(Error::NotConnected(_))));
        assert!(matches!(adapter.live_consumer(), Err(Error::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_failed_consumer_leaves_nothing_running() {
        // Passes validation, but the client caps session.timeout.ms at 3600000.
        let source = source()
            .with("BROKER_SESSION_TIMEOUT_MS", "4000000")
            .with("BROKER_MAX_POLL_INTERVAL_MS", "5000000");
        let mut adapter = BrokerAdapter::from_source(&source).expect("valid settings");

        let err = adapter.connect().await.expect_err("consumer client is rejected");
        assert!(matches!(err, Error::Config(_)), "{}", err);
        assert!(!adapter.is_connected());
        assert!(!adapter.is_producer_running());
        assert!(!adapter.is_consumer_running());
    }
}
