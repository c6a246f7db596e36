//! Broker settings resolved from `BROKER_*` environment variables.
//!
//! Producer and consumer settings share the connection fields in
//! [`BrokerSettings`] and add their own on top.
//!
//! Consumer liveness parameters must satisfy:
//!
//! ```text
//! max_poll_interval_ms >  session_timeout_ms
//! session_timeout_ms   >= 3 * heartbeat_interval_ms
//! ```

use crate::error::Result;
use crate::settings::{field_violation, EnvSource, FieldReader};
use config::Config;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

const PREFIX: &str = "BROKER";

/// Minimum number of heartbeats that must fit in one session timeout.
pub const MIN_HEARTBEATS_PER_SESSION: u64 = 3;

/// Separator for `BROKER_TOPICS`.
pub const TOPIC_DELIMITER: char = ',';

/// Producer acknowledgement level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AckLevel {
    /// Every in-sync replica must acknowledge.
    #[default]
    All,
    /// Fire and forget.
    Zero,
    /// The partition leader acknowledges.
    One,
}

/// Acknowledgement level as the broker client expects it: `all` is a
/// string token, `0` and `1` are integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AcksValue {
    Token(&'static str),
    Count(u8),
}

impl fmt::Display for AcksValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcksValue::Token(token) => f.write_str(token),
            AcksValue::Count(count) => write!(f, "{}", count),
        }
    }
}

impl AckLevel {
    pub fn parsed(&self) -> AcksValue {
        match self {
            AckLevel::All => AcksValue::Token("all"),
            AckLevel::Zero => AcksValue::Count(0),
            AckLevel::One => AcksValue::Count(1),
        }
    }
}

impl FromStr for AckLevel {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, String> {
        match raw.to_ascii_lowercase().as_str() {
            "all" | "-1" => Ok(AckLevel::All),
            "0" => Ok(AckLevel::Zero),
            "1" => Ok(AckLevel::One),
            _ => Err(format!(
                "'{}' is not a valid acks value (expected 'all', '0' or '1')",
                raw
            )),
        }
    }
}

impl Serialize for AckLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.parsed().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AckLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(i64),
            Token(String),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Count(count) => count.to_string(),
            Raw::Token(token) => token,
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which records a consumer may read inside open transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, String> {
        match raw.to_ascii_lowercase().as_str() {
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            _ => Err(format!(
                "'{}' is not a valid isolation level (expected 'read_uncommitted' or 'read_committed')",
                raw
            )),
        }
    }
}

/// Where a consumer group without a committed offset starts reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetReset {
    Earliest,
    #[default]
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl FromStr for OffsetReset {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, String> {
        match raw.to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            _ => Err(format!(
                "'{}' is not a valid offset reset policy (expected 'earliest' or 'latest')",
                raw
            )),
        }
    }
}

/// Split a delimited topic string into trimmed, non-empty names, in order.
pub fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(TOPIC_DELIMITER)
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

/// [`parse_topics`], rejecting a value that names no topic at all.
pub fn parse_topic_list(raw: &str) -> std::result::Result<Vec<String>, String> {
    let topics = parse_topics(raw);
    if topics.is_empty() {
        Err(format!("'{}' contains no topic names", raw))
    } else {
        Ok(topics)
    }
}

fn reader(source: &EnvSource, defaults: &[(&str, config::Value)]) -> Result<FieldReader> {
    let mut builder = Config::builder().set_default("request_timeout_ms", 5000)?;
    for (key, value) in defaults {
        builder = builder.set_default(*key, value.clone())?;
    }
    let config = builder.add_source(source.environment(PREFIX)).build()?;
    Ok(FieldReader::new(config, PREFIX))
}

/// Connection fields shared by producer and consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BrokerSettings {
    pub bootstrap_servers: String,
    #[validate(range(min = 1, message = "BROKER_REQUEST_TIMEOUT_MS must be greater than 0"))]
    pub request_timeout_ms: u64,
}

impl BrokerSettings {
    fn read(reader: &mut FieldReader) -> Self {
        BrokerSettings {
            bootstrap_servers: reader.required("bootstrap_servers"),
            request_timeout_ms: reader.required("request_timeout_ms"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Validated producer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProducerSettings {
    #[serde(flatten)]
    #[validate(nested)]
    pub broker: BrokerSettings,
    pub acks: AckLevel,
    pub connections_max_idle_ms: u64,
}

impl ProducerSettings {
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(
            source,
            &[
                ("acks", "all".into()),
                ("connections_max_idle_ms", 10_000.into()),
            ],
        )?;
        let settings = ProducerSettings {
            broker: BrokerSettings::read(&mut reader),
            acks: reader.required_with("acks", AckLevel::from_str),
            connections_max_idle_ms: reader.required("connections_max_idle_ms"),
        };
        Ok(reader.finish(settings)?)
    }
}

/// Validated consumer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_poll_interval", skip_on_field_errors = false))]
#[validate(schema(function = "validate_heartbeats", skip_on_field_errors = false))]
pub struct ConsumerSettings {
    #[serde(flatten)]
    #[validate(nested)]
    pub broker: BrokerSettings,
    pub topics: Vec<String>,
    pub group_id: String,
    #[validate(range(min = 1, max = 500, message = "BROKER_MAX_POLL_RECORDS must be within 1..=500"))]
    pub max_poll_records: u32,
    pub enable_auto_commit: bool,
    #[validate(range(min = 1, message = "BROKER_MAX_POLL_INTERVAL_MS must be greater than 0"))]
    pub max_poll_interval_ms: u64,
    #[validate(range(min = 1, message = "BROKER_SESSION_TIMEOUT_MS must be greater than 0"))]
    pub session_timeout_ms: u64,
    #[validate(range(min = 1, message = "BROKER_HEARTBEAT_INTERVAL_MS must be greater than 0"))]
    pub heartbeat_interval_ms: u64,
    #[validate(range(min = 1, message = "BROKER_CONSUMER_TIMEOUT_MS must be greater than 0"))]
    pub consumer_timeout_ms: u64,
    pub isolation_level: IsolationLevel,
    pub auto_offset_reset: OffsetReset,
}

fn validate_poll_interval(settings: &ConsumerSettings) -> std::result::Result<(), ValidationError> {
    if settings.max_poll_interval_ms > settings.session_timeout_ms {
        return Ok(());
    }
    Err(field_violation(
        "poll_interval_within_session",
        "max_poll_interval_ms",
        format!(
            "BROKER_MAX_POLL_INTERVAL_MS {} must be greater than session_timeout_ms ({})",
            settings.max_poll_interval_ms, settings.session_timeout_ms
        ),
    ))
}

fn validate_heartbeats(settings: &ConsumerSettings) -> std::result::Result<(), ValidationError> {
    let required = settings
        .heartbeat_interval_ms
        .saturating_mul(MIN_HEARTBEATS_PER_SESSION);
    if settings.session_timeout_ms >= required {
        return Ok(());
    }
    Err(field_violation(
        "too_few_heartbeats",
        "session_timeout_ms",
        format!(
            "BROKER_SESSION_TIMEOUT_MS {} must be at least {}x heartbeat_interval_ms ({})",
            settings.session_timeout_ms, MIN_HEARTBEATS_PER_SESSION, settings.heartbeat_interval_ms
        ),
    ))
}

impl ConsumerSettings {
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::from_env())
    }

    /// # Errors
    /// Returns `Error::Validation` listing every invalid field, including
    /// violations of the poll/session/heartbeat invariants.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let mut reader = reader(source, &[("auto_offset_reset", "latest".into())])?;
        let settings = ConsumerSettings {
            broker: BrokerSettings::read(&mut reader),
            topics: reader.required_with("topics", parse_topic_list),
            group_id: reader.required("group_id"),
            max_poll_records: reader.required("max_poll_records"),
            enable_auto_commit: reader.required("enable_auto_commit"),
            max_poll_interval_ms: reader.required("max_poll_interval_ms"),
            session_timeout_ms: reader.required("session_timeout_ms"),
            heartbeat_interval_ms: reader.required("heartbeat_interval_ms"),
            consumer_timeout_ms: reader.required("consumer_timeout_ms"),
            isolation_level: reader.required_with("isolation_level", IsolationLevel::from_str),
            auto_offset_reset: reader.required_with("auto_offset_reset", OffsetReset::from_str),
        };
        Ok(reader.finish(settings)?)
    }

    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_timeout_ms)
    }
}
