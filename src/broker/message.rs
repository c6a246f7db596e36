//! Owned broker messages handed to consume handlers.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A message detached from the consumer that received it.
///
/// Handlers receive owned messages so their futures can be held across
/// awaits without borrowing the consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Milliseconds since the epoch, when the broker recorded one.
    pub timestamp: Option<i64>,
}

impl BrokerMessage {
    /// Decode the JSON payload into `T`.
    ///
    /// # Errors
    /// Returns `Error::Deserialization` if the payload is absent or is not
    /// valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.payload.as_deref().ok_or_else(|| {
            Error::Deserialization(format!(
                "message {}/{}@{} has no payload",
                self.topic, self.partition, self.offset
            ))
        })?;
        Ok(serde_json::from_slice(payload)?)
    }

    /// The payload as UTF-8 text, if it is present and valid.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .and_then(|p| std::str::from_utf8(p).ok())
    }

    /// The key as UTF-8 text, if it is present and valid.
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }

    #[cfg(feature = "kafka")]
    pub(crate) fn from_kafka<M: rdkafka::Message>(message: &M) -> Self {
        BrokerMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            timestamp: message.timestamp().to_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u32,
        total: f64,
    }

    fn message(payload: Option<&[u8]>) -> BrokerMessage {
        BrokerMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset: 42,
            key: Some(b"order-7".to_vec()),
            payload: payload.map(<[u8]>::to_vec),
            timestamp: None,
        }
    }

    #[test]
    fn test_json_decoding() {
        let msg = message(Some(br#"{"id":7,"total":19.5}"#));
        let order: Order = msg.json().expect("valid json");
        assert_eq!(order, Order { id: 7, total: 19.5 });
        assert_eq!(msg.key_str(), Some("order-7"));
    }

    #[test]
    fn test_json_errors() {
        let missing = message(None).json::<Order>();
        assert!(matches!(missing, Err(Error::Deserialization(_))));

        let garbage = message(Some(b"not json")).json::<Order>();
        assert!(matches!(garbage, Err(Error::Deserialization(_))));
        assert_eq!(message(Some(b"not json")).payload_str(), Some("not json"));
    }
}
