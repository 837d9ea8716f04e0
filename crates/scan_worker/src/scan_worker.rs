use crate::domain::ScanProcessor;
use crate::nats::{ScanConsumer, ScanConsumerService};
use common::nats::JetStreamConsumer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span};

#[derive(Debug, Clone)]
pub struct ScanWorkerConfig {
    pub stream: String,
    pub consumer_name: String,
    pub subject: String,
    pub batch_size: usize,
    pub batch_wait_secs: u64,
}

/// One concurrent consumption unit bound to the shared subscription.
pub struct ScanWorker {
    name: String,
    consumer: ScanConsumer<ScanConsumerService>,
}

impl ScanWorker {
    pub async fn new(
        worker_id: usize,
        jetstream: Arc<dyn JetStreamConsumer>,
        processor: Arc<dyn ScanProcessor>,
        config: &ScanWorkerConfig,
    ) -> anyhow::Result<Self> {
        let name = worker_name(worker_id);
        let span = info_span!("scan_worker", worker = %name);

        let consumer = ScanConsumer::new(
            jetstream,
            &config.stream,
            &config.consumer_name,
            &config.subject,
            config.batch_size,
            config.batch_wait_secs,
            ScanConsumerService::new(processor),
            span,
        )
        .await?;

        info!(worker = %name, subscription = %config.consumer_name, "scan worker subscribed");

        Ok(Self { name, consumer })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume until cancelled; returns an error on a fatal backend failure.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(ctx).await
    }
}

fn worker_name(worker_id: usize) -> String {
    format!("processor{:02}", worker_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockScanProcessor;
    use async_nats::jetstream::consumer::pull;
    use common::nats::{MockJetStreamConsumer, MockPullConsumer};

    fn config() -> ScanWorkerConfig {
        ScanWorkerConfig {
            stream: "scans".to_string(),
            consumer_name: "scan-sub".to_string(),
            subject: "scans.>".to_string(),
            batch_size: 10,
            batch_wait_secs: 1,
        }
    }

    #[test]
    fn test_worker_names() {
        assert_eq!(worker_name(1), "processor01");
        assert_eq!(worker_name(12), "processor12");
    }

    #[tokio::test]
    async fn test_workers_share_one_durable_consumer() {
        let mut jetstream = MockJetStreamConsumer::new();
        jetstream
            .expect_create_consumer()
            .withf(|config: &pull::Config, stream_name: &str| {
                config.durable_name.as_deref() == Some("scan-sub") && stream_name == "scans"
            })
            .times(2)
            .returning(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let jetstream: Arc<dyn JetStreamConsumer> = Arc::new(jetstream);
        let processor: Arc<dyn ScanProcessor> = Arc::new(MockScanProcessor::new());

        let first = ScanWorker::new(1, jetstream.clone(), processor.clone(), &config())
            .await
            .unwrap();
        let second = ScanWorker::new(2, jetstream, processor, &config())
            .await
            .unwrap();

        assert_eq!(first.name(), "processor01");
        assert_eq!(second.name(), "processor02");
    }

    #[tokio::test]
    async fn test_cancelled_worker_stops_cleanly() {
        let mut jetstream = MockJetStreamConsumer::new();
        jetstream.expect_create_consumer().times(1).returning(|_, _| {
            let mut pull = MockPullConsumer::new();
            pull.expect_fetch_messages().never();
            Ok(Box::new(pull))
        });

        let worker = ScanWorker::new(
            1,
            Arc::new(jetstream),
            Arc::new(MockScanProcessor::new()),
            &config(),
        )
        .await
        .unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(worker.run(ctx).await.is_ok());
    }
}
