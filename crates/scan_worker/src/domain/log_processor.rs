use crate::domain::ScanProcessor;
use async_trait::async_trait;
use common::domain::{ProcessResult, ScanRecord};
use tracing::info;

/// Diagnostic backend: writes each scan as a human-readable log line.
#[derive(Debug, Default, Clone)]
pub struct LogProcessor;

impl LogProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScanProcessor for LogProcessor {
    async fn process(&self, scan: &ScanRecord) -> ProcessResult<()> {
        info!(
            ip = %scan.address,
            port = scan.port,
            service = %scan.service,
            "{}",
            scan
        );
        Ok(())
    }

    async fn close(&self) {}
}
