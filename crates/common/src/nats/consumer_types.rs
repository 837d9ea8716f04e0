use bytes::Bytes;

/// Request type for consuming a single NATS message through Tower.
///
/// Owns the message data so it can be handed to a service without
/// borrowing from the delivery.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// The NATS subject the message was published to
    pub subject: String,
    /// The message payload
    pub payload: Bytes,
}

impl ConsumeRequest {
    pub fn new(subject: String, payload: Bytes) -> Self {
        Self { subject, payload }
    }
}
