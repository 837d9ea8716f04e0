#![cfg(feature = "integration-tests")]

use async_nats::jetstream::consumer::pull;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::domain::{BackendError, ProcessResult, ScanRecord};
use common::nats::NatsClient;
use scan_worker::domain::ScanProcessor;
use scan_worker::{ScanWorker, ScanWorkerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use tokio_util::sync::CancellationToken;

/// NATS image with JetStream enabled
#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

/// Processor that remembers what it saw and can be told to fail.
#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<ScanRecord>>,
    fail: bool,
}

impl RecordingProcessor {
    fn seen(&self) -> Vec<ScanRecord> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanProcessor for RecordingProcessor {
    async fn process(&self, scan: &ScanRecord) -> ProcessResult<()> {
        if self.fail {
            return Err(BackendError::Write("disk full".to_string()));
        }
        self.seen.lock().unwrap().push(scan.clone());
        Ok(())
    }

    async fn close(&self) {}
}

fn worker_config() -> ScanWorkerConfig {
    ScanWorkerConfig {
        stream: "scans".to_string(),
        consumer_name: "scan-sub".to_string(),
        subject: "scans.>".to_string(),
        batch_size: 10,
        batch_wait_secs: 1,
    }
}

fn v1_scan(ip: &str, port: u64, timestamp: i64, response: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "ip": ip,
        "port": port,
        "service": "http",
        "timestamp": timestamp,
        "data_version": 1,
        "data": { "response_bytes_utf8": STANDARD.encode(response) },
    }))
    .unwrap()
}

async fn start_nats() -> (ContainerAsync<NatsWithJetStream>, NatsClient) {
    let nats = NatsWithJetStream::default().start().await.unwrap();
    let host = nats.get_host().await.unwrap();
    let port = nats.get_host_port_ipv4(4222).await.unwrap();

    let client = NatsClient::connect(&format!("nats://{}:{}", host, port), Duration::from_secs(10))
        .await
        .unwrap();
    client.ensure_stream("scans", "scans.>").await.unwrap();

    (nats, client)
}

async fn publish(client: &NatsClient, payloads: Vec<Vec<u8>>) {
    for payload in payloads {
        client
            .jetstream()
            .publish("scans.results", payload.into())
            .await
            .unwrap()
            .await
            .unwrap();
    }
}

/// Wait until every message on the durable consumer has been settled.
async fn wait_until_settled(client: &NatsClient) {
    let stream = client.jetstream().get_stream("scans").await.unwrap();
    let mut consumer = stream
        .get_consumer::<pull::Config>("scan-sub")
        .await
        .unwrap();

    for _ in 0..50 {
        let info = consumer.info().await.unwrap();
        if info.num_pending == 0 && info.num_ack_pending == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("messages were not settled in time");
}

#[tokio::test]
async fn test_workers_process_valid_and_drop_invalid_scans() {
    let (_nats, client) = start_nats().await;
    let processor = Arc::new(RecordingProcessor::default());

    let ctx = CancellationToken::new();
    let mut handles = Vec::new();
    for worker_id in 1..=2 {
        let worker = ScanWorker::new(
            worker_id,
            client.create_consumer_client(),
            processor.clone(),
            &worker_config(),
        )
        .await
        .unwrap();
        handles.push(tokio::spawn(worker.run(ctx.clone())));
    }

    publish(
        &client,
        vec![
            v1_scan("1.1.1.1", 80, 1_700_000_000, "hello"),
            b"not json".to_vec(),
            v1_scan("1.1.1.1", 99_999, 1_700_000_000, "bad port"),
            v1_scan("2002::1", 443, 1_700_000_100, "world"),
        ],
    )
    .await;

    wait_until_settled(&client).await;

    ctx.cancel();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let mut payloads: Vec<_> = processor.seen().into_iter().map(|s| s.payload).collect();
    payloads.sort();
    assert_eq!(payloads, vec!["hello".to_string(), "world".to_string()]);
}

#[tokio::test]
async fn test_backend_failure_stops_worker_with_error() {
    let (_nats, client) = start_nats().await;
    let processor = Arc::new(RecordingProcessor {
        fail: true,
        ..Default::default()
    });

    let worker = ScanWorker::new(
        1,
        client.create_consumer_client(),
        processor,
        &worker_config(),
    )
    .await
    .unwrap();

    publish(&client, vec![v1_scan("1.1.1.1", 80, 1_700_000_000, "hello")]).await;

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        worker.run(CancellationToken::new()),
    )
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("disk full"));
}
