mod config;
mod log_processor;
mod processor;
mod storage_processor;
mod store;

pub use config::*;
pub use log_processor::*;
pub use processor::*;
pub use storage_processor::*;
pub use store::*;
