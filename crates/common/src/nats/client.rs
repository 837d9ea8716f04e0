use crate::nats::traits::{Delivery, JetStreamConsumer, MessageAcker, PullConsumer};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JetStream connection used to bind scan subscriptions.
pub struct NatsClient {
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .name("scan-processor")
            .connection_timeout(timeout)
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to NATS at {}", url))?;

        info!("connected to NATS");
        Ok(Self {
            jetstream: jetstream::new(client),
        })
    }

    /// Make sure the stream carrying scan results exists and captures `subject`.
    pub async fn ensure_stream(&self, stream_name: &str, subject: &str) -> Result<()> {
        let mut stream = self
            .jetstream
            .get_or_create_stream(StreamConfig {
                name: stream_name.to_string(),
                subjects: vec![subject.to_string()],
                description: Some("Scan results awaiting ingestion".to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to ensure stream {}", stream_name))?;

        let info = stream
            .info()
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to read stream info")?;

        if !info.config.subjects.iter().any(|s| s == subject) {
            warn!(
                stream = %stream_name,
                subject = %subject,
                subjects = ?info.config.subjects,
                "existing stream does not list the scan subject"
            );
        }

        info!(
            stream = %stream_name,
            pending = info.state.messages,
            "scan stream ready"
        );
        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Handle that workers use to bind the shared durable consumer.
    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(JetStreamConsumerClient {
            context: self.jetstream.clone(),
        })
    }
}

struct JetStreamConsumerClient {
    context: jetstream::Context,
}

#[async_trait]
impl JetStreamConsumer for JetStreamConsumerClient {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to bind consumer on stream {}", stream_name))?;

        Ok(Box::new(JetStreamPullConsumer { consumer }))
    }
}

struct JetStreamPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for JetStreamPullConsumer {
    async fn fetch_messages(&self, max_messages: usize, expires: Duration) -> Result<Vec<Delivery>> {
        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to fetch scan batch")?;

        let mut deliveries = Vec::with_capacity(max_messages);
        let mut skipped = 0usize;
        while let Some(next) = batch.next().await {
            match next {
                Ok(message) => deliveries.push(Delivery::new(
                    message.subject.to_string(),
                    message.payload.clone(),
                    Box::new(JetStreamAcker { message }),
                )),
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "error receiving message from batch");
                }
            }
        }

        if skipped > 0 {
            debug!(skipped, received = deliveries.len(), "batch had receive errors");
        }
        Ok(deliveries)
    }
}

/// Settles a JetStream message with explicit ack / nak.
struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl MessageAcker for JetStreamAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to acknowledge message")
    }

    async fn nak(&self) -> Result<()> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to reject message")
    }
}
