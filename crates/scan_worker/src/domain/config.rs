use common::clickhouse::ClickHouseConfig;
use serde::{Deserialize, Serialize};

/// Processor backend, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Render each scan to the log.
    #[default]
    Logger,
    /// Persist each scan to ClickHouse.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub backend_type: BackendKind,
    /// ClickHouse HTTP endpoint; ignored by the logger backend.
    pub backend_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub table: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let clickhouse = ClickHouseConfig::default();
        Self {
            backend_type: BackendKind::Logger,
            backend_url: clickhouse.url,
            database: clickhouse.database,
            username: clickhouse.username,
            password: clickhouse.password,
            table: "services".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn clickhouse_config(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            url: self.backend_url.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
