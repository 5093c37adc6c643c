//! Marionette Common Types
//!
//! Shared wire protocol, value encoding and error types used by the
//! marionette client and any agent implementation.

pub mod error;
pub mod logging;
pub mod primitives;
pub mod screening;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use logging::{init_debug_logging, init_host_logging, init_logging, LogConfig};
pub use types::*;

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
