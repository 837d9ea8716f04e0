mod error;
mod scan;

pub use error::*;
pub use scan::*;
