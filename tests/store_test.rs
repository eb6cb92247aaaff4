//! Integration tests for the record store service

use chrono::Utc;
use pulseox_agent::store::{run, HealthRecord, RecordSink, StoreConfig};
use std::path::PathBuf;
use std::time::Duration;

fn test_data_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pulseox-store-test-{tag}"));
    // Start each test from an empty records file.
    let _ = std::fs::remove_file(dir.join("health_records.json"));
    dir
}

#[tokio::test]
async fn test_health_endpoint() {
    let config = StoreConfig::new(0, test_data_dir("health"));
    let (addr, shutdown_tx) = run(config).await.expect("Failed to start store");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_save_and_list_records() {
    let config = StoreConfig::new(0, test_data_dir("save"));
    let (addr, shutdown_tx) = run(config).await.expect("Failed to start store");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let sink = RecordSink::new(format!("http://{addr}"));
    assert!(sink.health_check().await.expect("health check"));

    let record = HealthRecord {
        name: "Example User".to_string(),
        pulse: 75,
        spo2: 98,
        stress_score: 34,
        recorded_at: Utc::now(),
    };
    sink.save(&record).await.expect("Failed to save record");

    let listed: Vec<HealthRecord> = reqwest::Client::new()
        .get(format!("http://{addr}/api/records"))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    let saved = listed.last().expect("No records listed");
    assert_eq!(saved.name, "Example User");
    assert_eq!(saved.pulse, 75);
    assert_eq!(saved.spo2, 98);
    assert_eq!(saved.stress_score, 34);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_records_accumulate_across_saves() {
    let config = StoreConfig::new(0, test_data_dir("accumulate"));
    let (addr, shutdown_tx) = run(config).await.expect("Failed to start store");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let sink = RecordSink::new(format!("http://{addr}"));
    for (name, pulse) in [("First", 70), ("Second", 80)] {
        sink.save(&HealthRecord {
            name: name.to_string(),
            pulse,
            spo2: 97,
            stress_score: 30,
            recorded_at: Utc::now(),
        })
        .await
        .expect("Failed to save record");
    }

    let listed: Vec<HealthRecord> = reqwest::Client::new()
        .get(format!("http://{addr}/api/records"))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "First");
    assert_eq!(listed[1].name, "Second");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_cors_preflight() {
    let config = StoreConfig::new(0, test_data_dir("cors"));
    let (addr, shutdown_tx) = run(config).await.expect("Failed to start store");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{addr}/api/records"),
        )
        .header("Origin", "http://localhost")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("Failed to send request");

    // CORS preflight should succeed
    assert!(
        response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
        "CORS preflight failed: {}",
        response.status()
    );

    let _ = shutdown_tx.send(());
}
