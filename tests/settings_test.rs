//! Settings resolution tests for connector-kit
//!
//! These tests resolve cache and broker settings from literal environment
//! sources, end to end through the public API. No services are required.

use connector_kit::broker::{AckLevel, ConsumerSettings, IsolationLevel, ProducerSettings};
use connector_kit::cache::{CacheModeSettings, CacheSettings, CacheTopology, DeploymentMode};
use connector_kit::{EnvSource, Error, FieldReport};

fn validation_fields<T: std::fmt::Debug>(result: connector_kit::Result<T>) -> Vec<String> {
    match result {
        Err(Error::Validation(errors)) => errors.fields(),
        other => panic!("expected a validation error, got {:?}", other),
    }
}

fn consumer_pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("BROKER_BOOTSTRAP_SERVERS", "kafka-1:9092,kafka-2:9092"),
        ("BROKER_TOPICS", "orders, payments ,refunds"),
        ("BROKER_GROUP_ID", "billing"),
        ("BROKER_MAX_POLL_RECORDS", "500"),
        ("BROKER_ENABLE_AUTO_COMMIT", "no"),
        ("BROKER_MAX_POLL_INTERVAL_MS", "300000"),
        ("BROKER_SESSION_TIMEOUT_MS", "45000"),
        ("BROKER_HEARTBEAT_INTERVAL_MS", "3000"),
        ("BROKER_CONSUMER_TIMEOUT_MS", "1000"),
        ("BROKER_ISOLATION_LEVEL", "READ_UNCOMMITTED"),
    ]
}

// ============================================================================
// Cache settings
// ============================================================================

#[test]
fn test_deployment_mode_round_trip() {
    for (raw, mode) in [
        ("cluster", DeploymentMode::Cluster),
        ("single_node", DeploymentMode::SingleNode),
        ("Cluster", DeploymentMode::Cluster),
    ] {
        let source = EnvSource::from_pairs([("CACHE_DEPLOYMENT_MODE", raw)]);
        let settings = CacheModeSettings::from_source(&source).expect("valid mode");
        assert_eq!(settings.deployment_mode, mode);
        assert_eq!(
            settings.deployment_mode.as_str(),
            raw.to_ascii_lowercase()
        );
    }

    let source = EnvSource::from_pairs([("CACHE_DEPLOYMENT_MODE", "sentinel")]);
    assert_eq!(
        validation_fields(CacheModeSettings::from_source(&source)),
        vec!["deployment_mode"]
    );
}

#[test]
fn test_single_node_uri() {
    let source = EnvSource::from_pairs([
        ("CACHE_DEPLOYMENT_MODE", "single_node"),
        ("CACHE_HOST", "redis.example.com"),
        ("CACHE_PORT", "6380"),
        ("CACHE_DB", "5"),
    ]);
    let settings = CacheSettings::from_source(&source).expect("valid settings");
    assert_eq!(settings.build_uri(), "redis://redis.example.com:6380/5");
    assert!(matches!(settings.topology, CacheTopology::SingleNode(_)));
}

#[test]
fn test_cluster_rejects_nonzero_db() {
    let base = EnvSource::from_pairs([
        ("CACHE_DEPLOYMENT_MODE", "cluster"),
        ("CACHE_HOST", "redis-cluster"),
    ]);

    let settings = CacheSettings::from_source(&base).expect("unset db is valid");
    assert_eq!(settings.db, 0);
    assert!(CacheSettings::from_source(&base.clone().with("CACHE_DB", "0")).is_ok());

    assert_eq!(
        validation_fields(CacheSettings::from_source(&base.with("CACHE_DB", "3"))),
        vec!["db"]
    );
}

#[test]
fn test_cache_reports_all_invalid_fields() {
    let source = EnvSource::from_pairs([
        ("CACHE_DEPLOYMENT_MODE", "single_node"),
        ("CACHE_PORT", "not-a-port"),
        ("CACHE_DB", "16"),
        ("CACHE_MAX_CONNECTIONS", "0"),
    ]);
    let fields = validation_fields(CacheSettings::from_source(&source));
    assert_eq!(fields, vec!["db", "host", "max_connections", "port"]);
}

#[test]
fn test_invalid_mode_reports_only_the_mode() {
    let source = EnvSource::from_pairs([
        ("CACHE_DEPLOYMENT_MODE", "sentinel"),
        ("CACHE_HOST", "localhost"),
        ("CACHE_DB", "20"),
    ]);
    assert_eq!(
        validation_fields(CacheSettings::from_source(&source)),
        vec!["deployment_mode"]
    );
}

#[cfg(unix)]
#[test]
fn test_from_env_tolerates_non_unicode_variables() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::env::set_var("UNRELATED_BLOB", OsStr::from_bytes(b"f\xffo"));
    std::env::set_var("CACHE_DEPLOYMENT_MODE", "single_node");
    std::env::set_var("CACHE_HOST", "localhost");

    let settings = CacheSettings::from_env();

    std::env::remove_var("UNRELATED_BLOB");
    std::env::remove_var("CACHE_DEPLOYMENT_MODE");
    std::env::remove_var("CACHE_HOST");

    let settings = settings.expect("non-unicode variables are skipped");
    assert_eq!(settings.host, "localhost");
    assert_eq!(settings.deployment_mode(), DeploymentMode::SingleNode);
}

// ============================================================================
// Broker settings
// ============================================================================

#[test]
fn test_producer_settings() {
    let source = EnvSource::from_pairs([
        ("BROKER_BOOTSTRAP_SERVERS", "kafka:9092"),
        ("BROKER_ACKS", "0"),
        ("BROKER_REQUEST_TIMEOUT_MS", "2500"),
    ]);
    let settings = ProducerSettings::from_source(&source).expect("valid settings");
    assert_eq!(settings.acks, AckLevel::Zero);
    assert_eq!(settings.broker.request_timeout_ms, 2500);

    let dumped = serde_json::to_value(&settings).expect("serializable");
    assert_eq!(dumped["acks"], serde_json::json!(0));
    assert_eq!(dumped["bootstrap_servers"], "kafka:9092");
}

#[test]
fn test_consumer_settings() {
    let source = EnvSource::from_pairs(consumer_pairs());
    let settings = ConsumerSettings::from_source(&source).expect("valid settings");

    assert_eq!(settings.topics, vec!["orders", "payments", "refunds"]);
    assert!(!settings.enable_auto_commit);
    assert_eq!(settings.max_poll_records, 500);
    assert_eq!(settings.isolation_level, IsolationLevel::ReadUncommitted);
}

#[test]
fn test_consumer_rejects_invalid_enums() {
    let source = EnvSource::from_pairs(consumer_pairs())
        .with("BROKER_ISOLATION_LEVEL", "serializable")
        .with("BROKER_TOPICS", " , ");
    let fields = validation_fields(ConsumerSettings::from_source(&source));
    assert_eq!(fields, vec!["isolation_level", "topics"]);
}

#[test]
fn test_validation_message_names_variables() {
    let source = EnvSource::from_pairs(consumer_pairs())
        .with("BROKER_MAX_POLL_INTERVAL_MS", "1000")
        .with("BROKER_HEARTBEAT_INTERVAL_MS", "20000");

    let err = ConsumerSettings::from_source(&source).expect_err("two invariants broken");
    let rendered = err.to_string();
    assert!(rendered.contains("BROKER_MAX_POLL_INTERVAL_MS"), "{}", rendered);
    assert!(rendered.contains("BROKER_SESSION_TIMEOUT_MS"), "{}", rendered);
}
