use crate::clickhouse::ClickHouseConnector;
use crate::domain::{BackendKind, LogProcessor, ProcessorConfig, StorageProcessor};
use async_trait::async_trait;
use common::domain::{ProcessResult, ScanRecord};
use std::sync::Arc;
use tracing::info;

/// Consumes validated scans.
///
/// One instance is shared by every worker. `close` must only be called
/// once no `process` call can still be running.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ScanProcessor: Send + Sync {
    async fn process(&self, scan: &ScanRecord) -> ProcessResult<()>;

    async fn close(&self);
}

/// The processor backend selected for this process.
pub enum ProcessorBackend {
    Logger(LogProcessor),
    Storage(StorageProcessor),
}

impl ProcessorBackend {
    /// Build the backend named by the configuration. Performs no I/O; the
    /// storage backend connects on its first `process` call.
    pub fn from_config(config: &ProcessorConfig) -> Self {
        info!(backend = ?config.backend_type, "creating scan processor backend");

        match config.backend_type {
            BackendKind::Logger => ProcessorBackend::Logger(LogProcessor::new()),
            BackendKind::Storage => {
                let connector =
                    ClickHouseConnector::new(config.clickhouse_config(), config.table.clone());
                ProcessorBackend::Storage(StorageProcessor::new(Arc::new(connector)))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            ProcessorBackend::Logger(_) => BackendKind::Logger,
            ProcessorBackend::Storage(_) => BackendKind::Storage,
        }
    }
}

#[async_trait]
impl ScanProcessor for ProcessorBackend {
    async fn process(&self, scan: &ScanRecord) -> ProcessResult<()> {
        match self {
            ProcessorBackend::Logger(processor) => processor.process(scan).await,
            ProcessorBackend::Storage(processor) => processor.process(scan).await,
        }
    }

    async fn close(&self) {
        match self {
            ProcessorBackend::Logger(processor) => processor.close().await,
            ProcessorBackend::Storage(processor) => processor.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selected_from_config() {
        let logger = ProcessorBackend::from_config(&ProcessorConfig::default());
        assert_eq!(logger.kind(), BackendKind::Logger);

        let storage = ProcessorBackend::from_config(&ProcessorConfig {
            backend_type: BackendKind::Storage,
            ..Default::default()
        });
        assert_eq!(storage.kind(), BackendKind::Storage);
    }

    #[tokio::test]
    async fn test_logger_backend_processes_and_closes() {
        let backend = ProcessorBackend::from_config(&ProcessorConfig::default());
        let scan = ScanRecord {
            address: "1.1.1.1".parse().unwrap(),
            port: 80,
            service: "http".to_string(),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            payload: "hello".to_string(),
        };

        assert!(backend.process(&scan).await.is_ok());
        backend.close().await;
        assert!(backend.process(&scan).await.is_ok());
    }
}
