//! Process-wide tracing setup. See `bin/logger_demo.rs` for a binary
//! that bootstraps and reloads the filter.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
