use crate::domain::ScanProcessor;
use common::domain::{BackendError, ScanError, ScanRecord};
use common::nats::ConsumeRequest;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::Service;
use tracing::{debug, warn};

/// Result of handling one message. Both outcomes settle with an ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Decoded and accepted by the processor.
    Processed,
    /// Rejected by the decoder; redelivery would not help.
    Dropped(ScanError),
}

/// Fatal worker failure. The message is rejected and the worker stops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("scan processing failed: {0}")]
    Backend(#[from] BackendError),
}

/// Tower service for processing individual scan messages.
///
/// This service:
/// 1. Decodes and validates the JSON envelope
/// 2. Drops invalid scans (logged with their classification)
/// 3. Hands valid scans to the shared processor
#[derive(Clone)]
pub struct ScanConsumerService {
    processor: Arc<dyn ScanProcessor>,
}

impl ScanConsumerService {
    pub fn new(processor: Arc<dyn ScanProcessor>) -> Self {
        Self { processor }
    }
}

impl Service<ConsumeRequest> for ScanConsumerService {
    type Response = ScanOutcome;
    type Error = WorkerError;
    type Future = BoxFuture<'static, Result<ScanOutcome, WorkerError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let processor = Arc::clone(&self.processor);

        Box::pin(async move {
            let scan = match ScanRecord::decode(&req.payload) {
                Ok(scan) => scan,
                Err(e) => {
                    warn!(
                        subject = %req.subject,
                        kind = e.kind(),
                        error = %e,
                        "dropping invalid scan data"
                    );
                    return Ok(ScanOutcome::Dropped(e));
                }
            };

            processor.process(&scan).await?;

            debug!(
                subject = %req.subject,
                ip = %scan.address,
                port = scan.port,
                service = %scan.service,
                "processed scan"
            );
            Ok(ScanOutcome::Processed)
        })
    }
}
