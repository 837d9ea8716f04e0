use common::clickhouse::ClickHouseConfig;
use config::{Config, ConfigError, Environment};
use scan_worker::domain::{BackendKind, ProcessorConfig};
use scan_worker::ScanWorkerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of the compact format
    #[serde(default = "default_log_json")]
    pub log_json: bool,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// NATS JetStream stream holding scan results
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// Subject pattern bound to the stream and the consumer filter
    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    /// Durable consumer shared by all workers
    #[serde(default = "default_nats_consumer")]
    pub nats_consumer: String,

    /// Batch size for each fetch
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Worker configuration
    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Seconds to wait for the backend to close during shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    // Backend configuration
    /// Backend kind (logger, storage)
    #[serde(default)]
    pub backend_type: BackendKind,

    /// ClickHouse HTTP URL used by the storage backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// ClickHouse database name
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    /// ClickHouse username
    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    /// ClickHouse password
    #[serde(default)]
    pub clickhouse_password: String,

    /// Table holding the latest scan per (ip, port, service)
    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_json() -> bool {
    true
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "scans".to_string()
}

fn default_nats_subject() -> String {
    "scans.>".to_string()
}

fn default_nats_consumer() -> String {
    "scan-sub".to_string()
}

fn default_nats_batch_size() -> usize {
    10
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// Worker defaults
fn default_concurrency() -> usize {
    2
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

// ClickHouse defaults
fn default_backend_url() -> String {
    ClickHouseConfig::default().url
}

fn default_clickhouse_database() -> String {
    ClickHouseConfig::default().database
}

fn default_clickhouse_username() -> String {
    ClickHouseConfig::default().username
}

fn default_clickhouse_table() -> String {
    "services".to_string()
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("SCAN"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Message(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.nats_batch_size == 0 {
            return Err(ConfigError::Message(
                "nats_batch_size must be at least 1".to_string(),
            ));
        }
        for (key, name) in [
            ("clickhouse_database", &self.clickhouse_database),
            ("clickhouse_table", &self.clickhouse_table),
        ] {
            if !is_plain_identifier(name) {
                return Err(ConfigError::Message(format!(
                    "{} must match [A-Za-z0-9_]+, got {:?}",
                    key, name
                )));
            }
        }
        Ok(())
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            backend_type: self.backend_type,
            backend_url: self.backend_url.clone(),
            database: self.clickhouse_database.clone(),
            username: self.clickhouse_username.clone(),
            password: self.clickhouse_password.clone(),
            table: self.clickhouse_table.clone(),
        }
    }

    pub fn worker_config(&self) -> ScanWorkerConfig {
        ScanWorkerConfig {
            stream: self.nats_stream.clone(),
            consumer_name: self.nats_consumer.clone(),
            subject: self.nats_subject.clone(),
            batch_size: self.nats_batch_size,
            batch_wait_secs: self.nats_batch_wait_secs,
        }
    }
}
