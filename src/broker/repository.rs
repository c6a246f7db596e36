//! Broker repository: produce and consume over a connected [`BrokerAdapter`].

use super::adapter::BrokerAdapter;
use super::message::BrokerMessage;
use crate::error::{Error, Result};
use crate::protocol::{Health, HealthCheck, MessagePublisher, MessageSubscriber};
use futures::{Stream, StreamExt};
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::producer::FutureRecord;
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use std::future::Future;

/// Stateless façade over a [`BrokerAdapter`].
///
/// # Example
///
/// ```no_run
/// # use connector_kit::broker::{BrokerAdapter, BrokerMessage, BrokerRepository};
/// # use connector_kit::protocol::{ConnectionAdapter, MessagePublisher, MessageSubscriber};
/// # use connector_kit::error::Result;
/// # async fn example() -> Result<()> {
/// let mut adapter = BrokerAdapter::config()?;
/// adapter.connect().await?;
///
/// let broker = BrokerRepository::new(&adapter);
/// broker.produce("orders", &serde_json::json!({"id": 7})).await?;
/// broker
///     .consume(|message: BrokerMessage| async move {
///         let order: serde_json::Value = message.json()?;
///         println!("{}", order);
///         Ok::<(), connector_kit::Error>(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct BrokerRepository<'a> {
    adapter: &'a BrokerAdapter,
}

impl<'a> BrokerRepository<'a> {
    pub fn new(adapter: &'a BrokerAdapter) -> Self {
        BrokerRepository { adapter }
    }

    pub fn adapter(&self) -> &'a BrokerAdapter {
        self.adapter
    }

    /// Send a pre-encoded payload and wait for the acknowledgement.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` without a running producer, or
    /// `Error::Broker` if delivery fails.
    pub async fn produce_raw(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let (producer, settings) = self.adapter.live_producer()?;

        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match producer.send(record, settings.broker.request_timeout()).await {
            Ok(delivery) => {
                debug!("✓ Kafka produce {} ({} bytes) -> {:?}", topic, payload.len(), delivery);
                Ok(())
            }
            Err((e, _)) => Err(Error::from(e)),
        }
    }

    /// Commit the offset following `message` for its partition.
    ///
    /// `consume` does this on its own when auto-commit is off; call it after
    /// handling messages returned by [`poll`](Self::poll).
    ///
    /// # Errors
    /// Returns `Error::NotConnected` without a running consumer, or
    /// `Error::Broker` if the commit is rejected.
    pub fn commit(&self, message: &BrokerMessage) -> Result<()> {
        let (consumer, _) = self.adapter.live_consumer()?;
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        consumer.commit(&offsets, CommitMode::Async)?;
        debug!(
            "✓ Kafka commit {}/{}@{}",
            message.topic,
            message.partition,
            message.offset + 1
        );
        Ok(())
    }

    /// Run the consume loop until `shutdown` resolves.
    ///
    /// Returns `Ok(())` on shutdown. A handler error or a consumer error ends
    /// the loop and is returned.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` without a running consumer.
    pub async fn consume_until<F, Fut, S>(&self, mut handler: F, shutdown: S) -> Result<()>
    where
        F: FnMut(BrokerMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
        S: Future<Output = ()>,
    {
        let (consumer, settings) = self.adapter.live_consumer()?;
        let manual_commit = !settings.enable_auto_commit;
        tokio::pin!(shutdown);

        info!("Kafka consume loop started: {:?}", settings.topics);

        loop {
            let message = tokio::select! {
                _ = &mut shutdown => {
                    info!("✓ Kafka consume loop stopped");
                    return Ok(());
                }
                received = consumer.recv() => BrokerMessage::from_kafka(&received?),
            };

            debug!(
                "Kafka message {}/{}@{}",
                message.topic, message.partition, message.offset
            );

            let position = manual_commit.then(|| message.clone());
            if let Err(e) = handler(message).await {
                warn!("⚠ Kafka handler failed, stopping consume loop: {}", e);
                return Err(e);
            }

            if let Some(handled) = position {
                self.commit(&handled)?;
            }
        }
    }

    /// The consumer as a stream of owned messages.
    ///
    /// Offsets are not committed by the stream itself.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` without a running consumer.
    pub fn messages(&self) -> Result<impl Stream<Item = Result<BrokerMessage>> + 'a> {
        let (consumer, _) = self.adapter.live_consumer()?;
        Ok(consumer.stream().map(|received| {
            received
                .map(|message| BrokerMessage::from_kafka(&message))
                .map_err(Error::from)
        }))
    }

    /// Collect up to `max_poll_records` messages, waiting at most
    /// `consumer_timeout_ms` in total.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` without a running consumer, or the first
    /// consumer error.
    pub async fn poll(&self) -> Result<Vec<BrokerMessage>> {
        let (consumer, settings) = self.adapter.live_consumer()?;
        let max_records = settings.max_poll_records as usize;
        let deadline = tokio::time::Instant::now() + settings.consumer_timeout();

        let mut batch = Vec::with_capacity(max_records);
        while batch.len() < max_records {
            match tokio::time::timeout_at(deadline, consumer.recv()).await {
                Ok(received) => batch.push(BrokerMessage::from_kafka(&received?)),
                Err(_) => break,
            }
        }

        debug!("✓ Kafka poll -> {} messages", batch.len());
        Ok(batch)
    }
}

impl MessagePublisher for BrokerRepository<'_> {
    async fn produce<M>(&self, topic: &str, message: &M) -> Result<()>
    where
        M: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(message)
            .map_err(|e| Error::Serialization(format!("Failed to encode message: {}", e)))?;
        self.produce_raw(topic, None, &payload).await
    }
}

impl MessageSubscriber for BrokerRepository<'_> {
    type Message = BrokerMessage;

    async fn consume<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: FnMut(BrokerMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.consume_until(handler, std::future::pending()).await
    }
}

impl HealthCheck for BrokerRepository<'_> {
    async fn healthcheck(&self) -> Health {
        self.adapter.healthcheck().await
    }
}
