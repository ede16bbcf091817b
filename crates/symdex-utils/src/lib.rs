//! # symdex Utilities
//!
//! Shared logging and configuration helpers for the symdex workspace.
//!
//! The core library stays free of global state; front ends call into this
//! crate once at startup to install a `tracing` subscriber and to resolve
//! [`IndexSettings`] from flags and `SYMDEX_*` environment variables.

pub mod config;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::{ConfigError, IndexSettings};
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
