use crate::nats::{ScanOutcome, WorkerError};
use anyhow::{Context, Result};
use async_nats::jetstream;
use common::nats::{ConsumeRequest, Delivery, JetStreamConsumer, PullConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn, Instrument, Span};

/// Lifecycle of one consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

/// Pulls scan messages from a durable JetStream consumer and feeds them,
/// one at a time, through a Tower service.
///
/// Only the fetch races the cancellation token: a message that has been
/// handed to the service always runs to completion and is settled. Once
/// cancelled, or after a fatal error, messages of the current batch that
/// were not started are rejected so the broker redelivers them promptly.
pub struct ScanConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    stream_name: String,
    consumer_name: String,
    batch_size: usize,
    max_wait: Duration,
    service: S,
    span: Span,
    state: WorkerState,
}

impl<S> ScanConsumer<S>
where
    S: Service<ConsumeRequest, Response = ScanOutcome, Error = WorkerError> + Send + 'static,
    S::Future: Send + 'static,
{
    /// Bind to the durable consumer `consumer_name` on `stream_name`.
    ///
    /// Every worker binds to the same durable consumer, so the broker
    /// spreads messages across them.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
        batch_size: usize,
        max_wait_secs: u64,
        service: S,
        span: Span,
    ) -> Result<Self> {
        debug!(
            stream = %stream_name,
            consumer = %consumer_name,
            filter_subject = %subject_filter,
            "creating scan consumer"
        );

        let config = jetstream::consumer::pull::Config {
            name: Some(consumer_name.to_string()),
            durable_name: Some(consumer_name.to_string()),
            filter_subject: subject_filter.to_string(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, stream_name)
            .await
            .context("failed to create consumer")?;

        Ok(Self {
            consumer,
            stream_name: stream_name.to_string(),
            consumer_name: consumer_name.to_string(),
            batch_size,
            max_wait: Duration::from_secs(max_wait_secs),
            service,
            span,
            state: WorkerState::Running,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the consume loop until cancellation or a fatal processing error.
    pub async fn run(&mut self, ctx: CancellationToken) -> Result<()> {
        let span = self.span.clone();
        let result = self.consume(ctx).instrument(span).await;
        self.state = WorkerState::Stopped;
        result
    }

    async fn consume(&mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "starting scan consumer"
        );
        self.state = WorkerState::Running;

        loop {
            if ctx.is_cancelled() {
                self.state = WorkerState::Draining;
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = ctx.cancelled() => None,
                result = self.consumer.fetch_messages(self.batch_size, self.max_wait) => Some(result),
            };
            let Some(fetched) = fetched else {
                self.state = WorkerState::Draining;
                break;
            };

            match fetched {
                Ok(deliveries) => self.process_batch(deliveries, &ctx).await?,
                Err(e) => {
                    error!(
                        stream = %self.stream_name,
                        consumer = %self.consumer_name,
                        error = %e,
                        "error fetching batch"
                    );
                    // Back off before retrying, unless shutting down
                    tokio::select! {
                        _ = ctx.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }

            if self.state == WorkerState::Draining {
                break;
            }
        }

        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "scan consumer stopped gracefully"
        );
        Ok(())
    }

    async fn process_batch(
        &mut self,
        deliveries: Vec<Delivery>,
        ctx: &CancellationToken,
    ) -> Result<()> {
        if deliveries.is_empty() {
            debug!("no messages in batch");
            return Ok(());
        }

        debug!(message_count = deliveries.len(), "received message batch");

        let mut pending = deliveries.into_iter();
        while let Some(delivery) = pending.next() {
            if ctx.is_cancelled() {
                self.state = WorkerState::Draining;
                release(std::iter::once(delivery).chain(pending)).await;
                break;
            }
            if let Err(e) = self.handle(delivery).await {
                release(pending).await;
                return Err(e);
            }
        }

        Ok(())
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<()> {
        let request = delivery.to_request();

        let result = match ServiceExt::<ConsumeRequest>::ready(&mut self.service).await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                if let Err(e) = delivery.ack().await {
                    error!(
                        subject = %delivery.subject,
                        error = %e,
                        "failed to acknowledge message"
                    );
                }
                if let ScanOutcome::Dropped(reason) = outcome {
                    debug!(subject = %delivery.subject, kind = reason.kind(), "acknowledged dropped scan");
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    subject = %delivery.subject,
                    error = %e,
                    "fatal processing error, rejecting message and stopping worker"
                );
                if let Err(nak_err) = delivery.nak().await {
                    error!(
                        subject = %delivery.subject,
                        error = %nak_err,
                        "failed to reject message"
                    );
                }
                Err(e).context("scan worker stopped on backend failure")
            }
        }
    }
}

/// Reject deliveries that were fetched but never started.
async fn release(deliveries: impl Iterator<Item = Delivery>) {
    let mut released = 0usize;
    for delivery in deliveries {
        if let Err(e) = delivery.nak().await {
            warn!(
                subject = %delivery.subject,
                error = %e,
                "failed to release message"
            );
        }
        released += 1;
    }
    debug!(released, "released unstarted messages for redelivery");
}
