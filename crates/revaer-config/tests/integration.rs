use revaer_config::{ConfigError, load_from};
use std::collections::HashMap;

fn base_env() -> HashMap<&'static str, String> {
    [
        ("TORRENT_DOWNLOAD_PATH", "/var/lib/revaer/downloads"),
        ("REDIS_CONNECTION_STRING", "redis://localhost:6379"),
        ("DATABASE_URL", "postgres://localhost/revaer"),
        ("BACKBLAZE_KEY_ID", "000abc123"),
        ("BACKBLAZE_APP_KEY", "supersecret"),
        ("BACKBLAZE_BUCKET", "revaer-archive"),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect()
}

#[test]
fn loads_full_config_from_environment() {
    let mut env = base_env();
    env.insert("JOB_HEALTH_CHECK_INTERVAL", "15".to_string());
    env.insert("JOB_HEALTH_STALE_THRESHOLD", "120".to_string());
    env.insert("REVAER_HEALTH_BIND_ADDR", "127.0.0.1:9800".to_string());
    env.insert("REVAER_ENABLE_OTEL", "true".to_string());
    env.insert("REVAER_OTEL_SERVICE_NAME", "revaer-download".to_string());
    env.insert("REVAER_OTEL_EXPORTER", "http://otel-collector:4317".to_string());

    let config = load_from(|name| env.get(name).cloned()).expect("config should load");

    assert_eq!(config.backblaze.bucket, "revaer-archive");
    assert_eq!(config.job_health_check_interval.as_secs(), 15);
    assert_eq!(config.job_health_stale_threshold.as_secs(), 120);
    assert_eq!(config.health_bind_addr.to_string(), "127.0.0.1:9800");
    assert!(config.telemetry.otel_enabled);
    assert_eq!(config.telemetry.otel_service_name, "revaer-download");
    assert_eq!(
        config.telemetry.otel_exporter.as_deref(),
        Some("http://otel-collector:4317")
    );
}

#[test]
fn rejects_unparseable_bind_addr() {
    let mut env = base_env();
    env.insert("REVAER_HEALTH_BIND_ADDR", "not-an-address".to_string());

    let err = load_from(|name| env.get(name).cloned()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            name: "REVAER_HEALTH_BIND_ADDR",
            ..
        }
    ));
}

#[test]
fn reports_each_missing_required_var_independently() {
    for missing in [
        "TORRENT_DOWNLOAD_PATH",
        "REDIS_CONNECTION_STRING",
        "DATABASE_URL",
        "BACKBLAZE_KEY_ID",
        "BACKBLAZE_APP_KEY",
        "BACKBLAZE_BUCKET",
    ] {
        let mut env = base_env();
        env.remove(missing);
        let err = load_from(|name| env.get(name).cloned()).unwrap_err();
        match err {
            ConfigError::MissingVar { name } => assert_eq!(name, missing),
            other => panic!("expected MissingVar for {missing}, got {other:?}"),
        }
    }
}
