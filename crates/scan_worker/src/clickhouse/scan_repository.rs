use crate::domain::{ScanStore, ScanStoreConnector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::sql::Identifier;
use clickhouse::Row;
use common::clickhouse::{ClickHouseClient, ClickHouseConfig};
use common::domain::ScanRecord;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Schema for the scan table.
///
/// `ReplacingMergeTree(timestamp)` keyed on (ip, port, service) keeps, per
/// key, the row with the greatest declared scan timestamp no matter in which
/// order rows were inserted. Reads must use `FINAL` to see the merged view.
pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            ip String, \
            port UInt16, \
            service String, \
            data String, \
            timestamp DateTime64(0, 'UTC')\
        ) ENGINE = ReplacingMergeTree(timestamp) \
        ORDER BY (ip, port, service)",
        quote_identifier(table)
    )
}

pub fn create_database_statement(database: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {}",
        quote_identifier(database)
    )
}

/// Backtick-quote a configured database or table name for use in DDL.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ScanRow {
    pub ip: String,
    pub port: u16,
    pub service: String,
    pub data: String,
    // Version column of the ReplacingMergeTree: the scan's own timestamp,
    // never the time the row was written.
    #[serde(with = "clickhouse::serde::chrono::datetime64::secs")]
    pub timestamp: DateTime<Utc>,
}

impl From<&ScanRecord> for ScanRow {
    fn from(scan: &ScanRecord) -> Self {
        ScanRow {
            ip: scan.address.to_string(),
            port: scan.port,
            service: scan.service.clone(),
            data: scan.payload.clone(),
            timestamp: scan.timestamp,
        }
    }
}

/// Opens ClickHouse sessions: checks connectivity and ensures the schema.
pub struct ClickHouseConnector {
    config: ClickHouseConfig,
    table: String,
}

impl ClickHouseConnector {
    pub fn new(config: ClickHouseConfig, table: String) -> Self {
        Self { config, table }
    }
}

#[async_trait]
impl ScanStoreConnector for ClickHouseConnector {
    async fn connect(&self) -> Result<Arc<dyn ScanStore>> {
        info!(
            url = %self.config.url,
            database = %self.config.database,
            table = %self.table,
            "connecting to ClickHouse"
        );

        // The target database may not exist yet, so bootstrap through `default`.
        let admin = ClickHouseClient::new(
            &self.config.url,
            "default",
            &self.config.username,
            &self.config.password,
        );
        admin.ping().await?;
        admin
            .execute(&create_database_statement(&self.config.database))
            .await
            .context("failed to create scan database")?;

        let client = ClickHouseClient::from_config(&self.config);
        client
            .execute(&create_table_statement(&self.table))
            .await
            .context("failed to create scan table")?;

        info!(table = %self.table, "ClickHouse scan table ready");
        Ok(Arc::new(ClickHouseScanStore::new(client, self.table.clone())))
    }
}

/// ClickHouse implementation of ScanStore
#[derive(Clone)]
pub struct ClickHouseScanStore {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseScanStore {
    pub fn new(client: ClickHouseClient, table: String) -> Self {
        Self { client, table }
    }

    /// Converged row for one (address, port, service) key.
    pub async fn latest(
        &self,
        address: IpAddr,
        port: u16,
        service: &str,
    ) -> Result<Option<ScanRow>> {
        self.client
            .get_client()
            .query("SELECT ?fields FROM ? FINAL WHERE ip = ? AND port = ? AND service = ?")
            .bind(Identifier(&self.table))
            .bind(address.to_string())
            .bind(port)
            .bind(service)
            .fetch_optional::<ScanRow>()
            .await
            .context("failed to read latest scan")
    }
}

#[async_trait]
impl ScanStore for ClickHouseScanStore {
    async fn upsert(&self, scan: &ScanRecord) -> Result<()> {
        let row = ScanRow::from(scan);

        let mut insert = self
            .client
            .get_client()
            .insert::<ScanRow>(&self.table)
            .await
            .context("failed to create ClickHouse inserter")?;

        insert
            .write(&row)
            .await
            .context("failed to write scan row to ClickHouse")?;

        insert
            .end()
            .await
            .context("failed to finalize ClickHouse insert")?;

        debug!(ip = %row.ip, port = row.port, service = %row.service, "inserted scan row");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // HTTP client keeps no session; pooled connections are dropped with it.
        debug!(table = %self.table, "ClickHouse scan store closed");
        Ok(())
    }
}
