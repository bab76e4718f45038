//! # Keyward Log
//!
//! Thin initialisation layer over `tracing-subscriber` shared by Keyward
//! binaries and integration harnesses.
//!
//! ```no_run
//! let _guard = keyward_log::init()?;
//! tracing::info!(target = "analytics", "connection established");
//! # Ok::<(), keyward_log::LogError>(())
//! ```

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Fields, Format};
pub use error::{LogError, LogResult};

/// Initialise logging from `KEYWARD_LOG` / `RUST_LOG` and friends.
pub fn init() -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(Config::from_env()).build()
}

/// Initialise logging with an explicit configuration.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
