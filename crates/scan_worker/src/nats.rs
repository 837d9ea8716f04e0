mod scan_consumer;
mod scan_consumer_service;

pub use scan_consumer::*;
pub use scan_consumer_service::*;
