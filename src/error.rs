//! Error types for the connector adapters.

use std::fmt;
use validator::ValidationErrors;

/// Result type for adapter and repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for connector-kit.
///
/// All fallible operations return `Result<T>` where `Result` is defined as `std::result::Result<T, Error>`.
/// Variants follow the lifecycle of an adapter: settings are validated first,
/// then a connection is established, then operations run against it.
#[derive(Debug, Clone)]
pub enum Error {
    /// Settings resolution failed.
    ///
    /// Carries every violated field, not only the first one found.
    /// Raised when:
    /// - A required variable is missing
    /// - A value cannot be coerced to the field type
    /// - A value is out of its declared bounds
    /// - A cross-field invariant does not hold
    ///
    /// **Recovery:** Fix the environment and restart.
    Validation(ValidationErrors),

    /// The underlying client rejected the derived configuration.
    ///
    /// Common causes:
    /// - Malformed connection URI
    /// - A client property the library does not accept
    ///
    /// **Recovery:** Fix configuration and restart.
    Config(String),

    /// Connection could not be established or was lost.
    ///
    /// Common causes:
    /// - Server unreachable or refusing connections
    /// - Connection dropped mid-command
    ///
    /// **Recovery:** Retried by the static backoff policy, then surfaced.
    Connection(String),

    /// Operation exceeded the configured socket or pool timeout.
    Timeout(String),

    /// A data operation was attempted on an adapter without a live handle.
    ///
    /// **Recovery:** Call `connect()` before issuing operations.
    NotConnected(String),

    /// Cache command failed on the server side.
    Backend(String),

    /// Produce or consume failed in the broker client.
    Broker(String),

    /// Message could not be encoded to JSON.
    Serialization(String),

    /// Message payload could not be decoded.
    Deserialization(String),

    /// A consume handler reported a failure; consumption stops.
    Handler(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether the static retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(errors) => write!(f, "Validation error: {}", errors),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::Connection(msg) => write!(f, "Connection error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::NotConnected(msg) => write!(f, "Not connected: {}", msg),
            Error::Backend(msg) => write!(f, "Backend error: {}", msg),
            Error::Broker(msg) => write!(f, "Broker error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Deserialization(msg) => write!(f, "Deserialization error: {}", msg),
            Error::Handler(msg) => write!(f, "Handler error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<ValidationErrors> for Error {
    fn from(e: ValidationErrors) -> Self {
        Error::Validation(e)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(format!("Settings source error: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() || e.is_data() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Serialization(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Connection(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::redis::RedisError> for Error {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        if e.is_timeout() {
            Error::Timeout(format!("Redis error: {}", e))
        } else if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            Error::Connection(format!("Redis error: {}", e))
        } else {
            Error::Backend(format!("Redis error: {}", e))
        }
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        match e {
            deadpool_redis::PoolError::Backend(inner) => inner.into(),
            deadpool_redis::PoolError::Timeout(kind) => {
                Error::Timeout(format!("Redis pool timed out ({:?})", kind))
            }
            deadpool_redis::PoolError::Closed => {
                Error::NotConnected("Redis pool is closed".to_string())
            }
            other => Error::Connection(format!("Redis pool error: {}", other)),
        }
    }
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for Error {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        use rdkafka::error::KafkaError;
        match e {
            KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
                Error::Config(format!("Kafka error: {}", e))
            }
            other => Error::Broker(format!("Kafka error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected("cache adapter".to_string());
        assert_eq!(err.to_string(), "Not connected: cache adapter");
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("host", ValidationError::new("required"));
        let mut port = ValidationError::new("range");
        port.message = Some("CACHE_PORT must be greater than 0".into());
        errors.add("port", port);

        let err: Error = errors.into();
        let rendered = err.to_string();
        assert!(rendered.contains("host"));
        assert!(rendered.contains("CACHE_PORT"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Connection("reset".into()).is_retryable());
        assert!(Error::Timeout("read".into()).is_retryable());
        assert!(!Error::Backend("WRONGTYPE".into()).is_retryable());
        assert!(!Error::NotConnected("cache".into()).is_retryable());
    }

    #[test]
    fn test_json_syntax_error_maps_to_deserialization() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
