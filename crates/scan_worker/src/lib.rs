pub mod clickhouse;
pub mod domain;
pub mod nats;
pub mod scan_worker;

pub use scan_worker::*;
