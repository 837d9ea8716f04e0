use anyhow::Result;
use async_trait::async_trait;
use common::domain::ScanRecord;
use std::sync::Arc;

/// Durable, timestamp-ordered scan storage.
///
/// Implementations must tag each write with the record's declared
/// timestamp so that rows sharing (address, port, service) converge to the
/// one with the greatest timestamp, whatever order they arrive in.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn upsert(&self, scan: &ScanRecord) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Opens a session with the store. Called at most once per process.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ScanStoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ScanStore>>;
}
