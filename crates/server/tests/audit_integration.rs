use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::sleep;

const CASE: &str = "0001234-56.2023.8.13.0024";

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config with a database in `dir` and an unreachable WebDriver
fn config_with_db(port: u16, dir: &Path) -> NamedTempFile {
    let content = format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[database]
path = "{}"

[storage]
data_dir = "{}"

[acquisition]
max_retries = 1
retry_backoff_ms = 10

[webdriver]
url = "http://127.0.0.1:9"
"#,
        port,
        dir.join("audit.db").display(),
        dir.join("data").display(),
    );

    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_dossier"))
        .env("DOSSIER_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn audit_events(port: u16, query: &str) -> serde_json::Value {
    Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/audit{}", port, query))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON")
}

#[tokio::test]
async fn test_audit_endpoint_returns_service_started_event() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = config_with_db(port, dir.path());

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    // Give the audit writer a moment to write the event
    sleep(Duration::from_millis(100)).await;

    let json = audit_events(port, "").await;
    let events = json["events"]
        .as_array()
        .expect("events should be an array");

    let started = events
        .iter()
        .find(|e| e["event_type"] == "service_started")
        .expect("Should have a service_started event");
    assert!(started["data"]["version"].is_string());
    assert_eq!(started["data"]["config_hash"].as_str().unwrap().len(), 16);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_audit_query_filter_by_event_type() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = config_with_db(port, dir.path());

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );
    sleep(Duration::from_millis(100)).await;

    let json = audit_events(port, "?event_type=service_started").await;
    let events = json["events"].as_array().unwrap();
    assert!(!events.is_empty());
    for event in events {
        assert_eq!(event["event_type"], "service_started");
    }

    let json = audit_events(port, "?event_type=acquisition_completed").await;
    assert!(json["events"].as_array().unwrap().is_empty());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_audit_query_pagination() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = config_with_db(port, dir.path());

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );
    sleep(Duration::from_millis(100)).await;

    let json = audit_events(port, "?limit=10&offset=0").await;
    assert!(json["total"].is_i64());
    assert_eq!(json["limit"], 10);
    assert_eq!(json["offset"], 0);

    // Out-of-range limits are clamped
    let json = audit_events(port, "?limit=5000").await;
    assert_eq!(json["limit"], 1000);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_acquisition_request_is_audited_by_case_number() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = config_with_db(port, dir.path());

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .post(format!("http://127.0.0.1:{}/api/v1/cases", port))
        .json(&json!({ "case_number": CASE }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 202);

    sleep(Duration::from_millis(200)).await;

    let json = audit_events(port, &format!("?case_number={}", CASE)).await;
    let events = json["events"].as_array().unwrap();
    let requested = events
        .iter()
        .find(|e| e["event_type"] == "acquisition_requested")
        .expect("Should have an acquisition_requested event");
    assert_eq!(requested["data"]["disposition"], "accepted");
    assert!(events.iter().all(|e| e["case_number"] == CASE));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_database_persists_across_restarts() {
    let dir = TempDir::new().unwrap();

    let port1 = get_available_port();
    let config1 = config_with_db(port1, dir.path());
    let mut server1 = spawn_server(config1.path()).await;
    assert!(
        wait_for_server(port1, 40).await,
        "Server 1 did not start in time"
    );
    sleep(Duration::from_millis(100)).await;
    server1.kill().await.ok();
    sleep(Duration::from_millis(100)).await;

    let port2 = get_available_port();
    let config2 = config_with_db(port2, dir.path());
    let mut server2 = spawn_server(config2.path()).await;
    assert!(
        wait_for_server(port2, 40).await,
        "Server 2 did not start in time"
    );
    sleep(Duration::from_millis(100)).await;

    let json = audit_events(port2, "?event_type=service_started").await;
    let events = json["events"].as_array().unwrap();
    assert!(
        events.len() >= 2,
        "Should have at least 2 service_started events after restart, got {}",
        events.len()
    );

    server2.kill().await.ok();
}
