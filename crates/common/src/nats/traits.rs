use crate::nats::ConsumeRequest;
use anyhow::Result;
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Trait for JetStream consumer operations
/// Abstracts the operations needed to create and use a NATS JetStream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create (or bind to) a durable pull consumer on a stream
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Trait for pull consumer operations
/// Abstracts the fetch operation on a pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch messages from the consumer
    /// Returns a batch of deliveries up to max_messages, waiting up to expires duration
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<Delivery>>;
}

/// Settles a single delivered message with the broker.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageAcker: Send + Sync {
    /// Acknowledge: the message is done and must not be redelivered.
    async fn ack(&self) -> Result<()>;

    /// Negative-acknowledge: request redelivery.
    async fn nak(&self) -> Result<()>;
}

/// A message received from the subscription together with its settlement handle.
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
    acker: Box<dyn MessageAcker>,
}

impl Delivery {
    pub fn new(subject: impl Into<String>, payload: Bytes, acker: Box<dyn MessageAcker>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            acker,
        }
    }

    pub fn to_request(&self) -> ConsumeRequest {
        ConsumeRequest::new(self.subject.clone(), self.payload.clone())
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nak(&self) -> Result<()> {
        self.acker.nak().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
