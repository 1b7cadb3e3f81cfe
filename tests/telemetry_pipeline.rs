//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Configuration to wire payload, end to end over the in-memory transport."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone};
use lumicert_common::{AppConfig, OperatingMode};
use lumicert_core::{FixedClock, PublishLoop};
use lumicert_msg::{InMemoryTransport, Transport};
use serde_json::Value;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[broker]
host = "broker.invalid"
port = 8883
tls = true

[telemetry]
topic = "test"
interval_ms = 10

[simulation]
mode = "auto"
seed = 2024
bank = [false, true, false]

[simulation.probabilities]
fail = 0.5
overcurrent = 0.5
theft = 0.5
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

fn decimals(value: &Value) -> usize {
    let text = value.to_string();
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

#[test]
fn explicit_config_file_is_loaded_and_validated() {
    let file = write_config(CONFIG);
    let loaded = AppConfig::load_with_source(Some(file.path()), &[] as &[&Path]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(file.path()));
    assert_eq!(loaded.config.telemetry.interval, Duration::from_millis(10));
    assert_eq!(loaded.config.simulation.mode, OperatingMode::Auto);
    assert_eq!(loaded.config.simulation.probabilities.fail, 0.5);
    assert_eq!(loaded.config.simulation.probabilities.day_consumption, 0.10);
    assert!(loaded.config.broker.tls);
}

#[test]
fn invalid_probability_is_rejected_at_load() {
    let file = write_config("[simulation.probabilities]\novercurrent = 1.2\n");
    let err = AppConfig::load_with_source(Some(file.path()), &[] as &[&Path]).unwrap_err();
    assert!(format!("{err:#}").contains("overcurrent"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let result = AppConfig::load_with_source(
        Some(Path::new("/nonexistent/lumicert.toml")),
        &[] as &[&Path],
    );
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn night_run_publishes_stable_wire_schema() {
    let file = write_config(CONFIG);
    let config = AppConfig::load_with_source(Some(file.path()), &[] as &[&Path])
        .unwrap()
        .config;
    let transport = InMemoryTransport::new();
    let night = FixedOffset::east_opt(-5 * 3600)
        .and_then(|offset| offset.with_ymd_and_hms(2024, 11, 20, 21, 30, 5).single())
        .unwrap();
    let mut publish_loop = PublishLoop::new(&config, Arc::new(transport.clone()))
        .unwrap()
        .with_clock(FixedClock(night))
        .with_tick_limit(6);

    let stats = publish_loop.run(std::future::pending::<()>()).await.unwrap();
    assert_eq!(stats.ticks, 6);
    assert_eq!(transport.name(), "in_memory");

    let telemetry = transport.published_on("test");
    assert_eq!(telemetry.len(), 6);
    for message in telemetry {
        let json: Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(json["ts"], night.timestamp());
        assert_eq!(json["ts_iso"], "2024-11-20T21:30:05");
        assert_eq!(json["modo"], "AUTO");
        assert!(decimals(&json["lux"]) <= 1);
        assert_eq!(json["bank"]["C2"], true);
        assert!(json["alarms"]["bh1_fail"].is_boolean());
        assert!(json["alarms"]["bh_discrep"].is_boolean());

        let luminarias = json["luminarias"].as_array().unwrap();
        assert_eq!(luminarias.len(), 3);
        for (record, id) in luminarias.iter().zip([4u64, 5, 6]) {
            assert_eq!(record["id"], id);
            assert_eq!(record["relay"], true);
            assert_eq!(record["ok"], true);
            assert_eq!(record["theft"], false);
            assert!(decimals(&record["V"]) <= 2);
            assert!(decimals(&record["mA"]) <= 1);
            assert!(decimals(&record["W"]) <= 3);
        }
    }
    let status: Vec<String> = transport
        .published_on("test/status")
        .iter()
        .map(|message| message.payload_str())
        .collect();
    assert_eq!(status, vec!["online", "offline"]);
}
