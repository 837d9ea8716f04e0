#![cfg(feature = "integration-tests")]

use chrono::DateTime;
use common::clickhouse::{ClickHouseClient, ClickHouseConfig};
use common::domain::{BackendError, ScanRecord};
use scan_worker::clickhouse::{ClickHouseConnector, ClickHouseScanStore};
use scan_worker::domain::{ScanProcessor, ScanStoreConnector, SessionStatus, StorageProcessor};
use std::sync::Arc;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::clickhouse::ClickHouse;

const TABLE: &str = "services";

async fn start_clickhouse() -> (ContainerAsync<ClickHouse>, ClickHouseConfig) {
    let clickhouse = ClickHouse::default().start().await.unwrap();

    let host = clickhouse.get_host().await.unwrap();
    let port = clickhouse.get_host_port_ipv4(8123).await.unwrap();

    let config = ClickHouseConfig {
        url: format!("http://{}:{}", host, port),
        database: "scans".to_string(),
        username: "default".to_string(),
        password: "".to_string(),
    };

    (clickhouse, config)
}

fn scan(timestamp: i64, payload: &str) -> ScanRecord {
    ScanRecord {
        address: "10.0.0.5".parse().unwrap(),
        port: 22,
        service: "ssh".to_string(),
        timestamp: DateTime::from_timestamp(timestamp, 0).unwrap(),
        payload: payload.to_string(),
    }
}

fn reader(config: &ClickHouseConfig) -> ClickHouseScanStore {
    ClickHouseScanStore::new(ClickHouseClient::from_config(config), TABLE.to_string())
}

#[tokio::test]
async fn test_connect_creates_database_and_table() {
    let (_clickhouse, config) = start_clickhouse().await;

    let connector = ClickHouseConnector::new(config.clone(), TABLE.to_string());
    connector.connect().await.unwrap();

    // A second session reuses the existing schema.
    connector.connect().await.unwrap();

    let latest = reader(&config)
        .latest("10.0.0.5".parse().unwrap(), 22, "ssh")
        .await
        .unwrap();
    assert!(latest.is_none());
}

#[tokio::test]
async fn test_newer_scan_replaces_older() {
    let (_clickhouse, config) = start_clickhouse().await;

    let store = ClickHouseConnector::new(config.clone(), TABLE.to_string())
        .connect()
        .await
        .unwrap();

    store.upsert(&scan(1_700_000_000, "SSH-2.0-old")).await.unwrap();
    store.upsert(&scan(1_700_000_100, "SSH-2.0-new")).await.unwrap();

    let row = reader(&config)
        .latest("10.0.0.5".parse().unwrap(), 22, "ssh")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row.data, "SSH-2.0-new");
    assert_eq!(row.timestamp.timestamp(), 1_700_000_100);
}

#[tokio::test]
async fn test_late_arriving_older_scan_does_not_overwrite() {
    let (_clickhouse, config) = start_clickhouse().await;

    let store = ClickHouseConnector::new(config.clone(), TABLE.to_string())
        .connect()
        .await
        .unwrap();

    store.upsert(&scan(1_700_000_100, "SSH-2.0-new")).await.unwrap();
    store.upsert(&scan(1_700_000_000, "SSH-2.0-old")).await.unwrap();

    let row = reader(&config)
        .latest("10.0.0.5".parse().unwrap(), 22, "ssh")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row.data, "SSH-2.0-new");
    assert_eq!(row.timestamp.timestamp(), 1_700_000_100);
}

#[tokio::test]
async fn test_keys_are_independent() {
    let (_clickhouse, config) = start_clickhouse().await;

    let store = ClickHouseConnector::new(config.clone(), TABLE.to_string())
        .connect()
        .await
        .unwrap();

    let ssh = scan(1_700_000_000, "SSH-2.0");
    let mut http = scan(1_600_000_000, "HTTP/1.1 200 OK");
    http.port = 80;
    http.service = "http".to_string();

    store.upsert(&ssh).await.unwrap();
    store.upsert(&http).await.unwrap();

    let reader = reader(&config);
    let ssh_row = reader
        .latest(ssh.address, 22, "ssh")
        .await
        .unwrap()
        .unwrap();
    let http_row = reader
        .latest(http.address, 80, "http")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ssh_row.data, "SSH-2.0");
    assert_eq!(http_row.data, "HTTP/1.1 200 OK");
}

#[tokio::test]
async fn test_storage_processor_persists_through_lazy_session() {
    let (_clickhouse, config) = start_clickhouse().await;

    let processor = StorageProcessor::new(Arc::new(ClickHouseConnector::new(
        config.clone(),
        TABLE.to_string(),
    )));
    assert_eq!(processor.status().await, SessionStatus::Unconnected);

    processor.process(&scan(1_700_000_200, "first")).await.unwrap();
    processor.process(&scan(1_700_000_100, "stale")).await.unwrap();
    assert_eq!(processor.status().await, SessionStatus::Ready);

    let row = reader(&config)
        .latest("10.0.0.5".parse().unwrap(), 22, "ssh")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.data, "first");

    processor.close().await;
    assert_eq!(processor.status().await, SessionStatus::Closed);
}

#[tokio::test]
async fn test_unreachable_backend_fails_sticky() {
    let config = ClickHouseConfig {
        url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let processor = StorageProcessor::new(Arc::new(ClickHouseConnector::new(
        config,
        TABLE.to_string(),
    )));

    let first = processor.process(&scan(1, "a")).await.unwrap_err();
    let second = processor.process(&scan(2, "b")).await.unwrap_err();

    assert!(matches!(first, BackendError::Connect(_)));
    assert_eq!(first, second);
}
