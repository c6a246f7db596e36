//! Kafka adapter, settings, repository, and messages.
//!
//! Settings and messages are always available; the adapter and repository
//! need the `kafka` feature.

#[cfg(feature = "kafka")]
pub mod adapter;
pub mod message;
#[cfg(feature = "kafka")]
pub mod repository;
pub mod settings;

#[cfg(feature = "kafka")]
pub use adapter::{consumer_client_config, producer_client_config, BrokerAdapter};
pub use message::BrokerMessage;
#[cfg(feature = "kafka")]
pub use repository::BrokerRepository;
pub use settings::{
    parse_topic_list, parse_topics, AckLevel, AcksValue, BrokerSettings, ConsumerSettings,
    IsolationLevel, OffsetReset, ProducerSettings,
};
