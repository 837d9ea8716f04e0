use crate::domain::{ScanProcessor, ScanStore, ScanStoreConnector};
use async_trait::async_trait;
use common::domain::{BackendError, ProcessResult, ScanRecord};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle of the storage session.
///
/// A caller that finds `Unconnected` keeps the lock for the whole connect
/// attempt, so concurrent first callers wait for that single attempt and
/// then observe `Ready` or `Failed`. `Failed` is terminal until restart.
enum SessionState {
    Unconnected,
    Ready(Arc<dyn ScanStore>),
    Failed(BackendError),
    Closed,
}

/// Observable summary of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unconnected,
    Ready,
    Failed(BackendError),
    Closed,
}

/// Durable backend persisting scans through a lazily opened store session.
pub struct StorageProcessor {
    connector: Arc<dyn ScanStoreConnector>,
    state: Mutex<SessionState>,
}

impl StorageProcessor {
    pub fn new(connector: Arc<dyn ScanStoreConnector>) -> Self {
        Self {
            connector,
            state: Mutex::new(SessionState::Unconnected),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        match &*self.state.lock().await {
            SessionState::Unconnected => SessionStatus::Unconnected,
            SessionState::Ready(_) => SessionStatus::Ready,
            SessionState::Failed(err) => SessionStatus::Failed(err.clone()),
            SessionState::Closed => SessionStatus::Closed,
        }
    }

    async fn acquire_store(&self) -> ProcessResult<Arc<dyn ScanStore>> {
        let mut state = self.state.lock().await;

        match &*state {
            SessionState::Ready(store) => return Ok(Arc::clone(store)),
            SessionState::Failed(err) => return Err(err.clone()),
            SessionState::Closed => return Err(BackendError::Closed),
            SessionState::Unconnected => {}
        }

        info!("opening storage session");
        match self.connector.connect().await {
            Ok(store) => {
                info!("storage session ready");
                *state = SessionState::Ready(Arc::clone(&store));
                Ok(store)
            }
            Err(e) => {
                let err = BackendError::connect(&e);
                error!(error = %err, "failed to open storage session, failure is cached");
                *state = SessionState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ScanProcessor for StorageProcessor {
    async fn process(&self, scan: &ScanRecord) -> ProcessResult<()> {
        let store = self.acquire_store().await?;

        store.upsert(scan).await.map_err(|e| {
            error!(
                ip = %scan.address,
                port = scan.port,
                service = %scan.service,
                error = %e,
                "failed to store scan"
            );
            BackendError::write(&e)
        })?;

        debug!(
            ip = %scan.address,
            port = scan.port,
            service = %scan.service,
            "stored scan"
        );
        Ok(())
    }

    async fn close(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Closed)
        };

        if let SessionState::Ready(store) = previous {
            info!("closing storage session");
            if let Err(e) = store.close().await {
                warn!(error = %e, "error closing storage session");
            }
        }
    }
}
