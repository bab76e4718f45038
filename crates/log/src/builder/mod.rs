//! Logger builder implementation

mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the root span (when global fields are configured) and the reload
/// handle. Drop it at the end of `main`.
#[derive(Debug)]
pub struct LoggerGuard {
    reload_handle: Option<ReloadHandle>,
    _root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerGuard {
    /// Handle for swapping the filter at runtime, if the logger was built reloadable.
    #[must_use]
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload_handle.as_ref()
    }
}

/// Build the fmt layer for a format arm and install the subscriber.
macro_rules! init_subscriber {
    ($filter_layer:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter_layer)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if the filter string cannot be parsed or a global
    /// subscriber is already installed.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {e}", self.config.level)))?;

        let (filter_layer, reload_handle) =
            reload::create_filter_layer(filter, &self.config.level, self.config.reloadable);

        let display = &self.config.display;
        let base = tracing_subscriber::fmt::layer()
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source);

        match self.config.format {
            Format::Pretty => init_subscriber!(filter_layer, base.pretty()),
            Format::Compact => init_subscriber!(filter_layer, base.compact()),
            Format::Json => {
                init_subscriber!(filter_layer, base.json().flatten_event(display.flatten));
            }
        }

        let fields = &self.config.fields;
        let root_span = (!fields.is_empty()).then(|| {
            tracing::info_span!(
                "app",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or(""),
                instance = fields.instance.as_deref().unwrap_or("")
            )
            .entered()
        });

        Ok(LoggerGuard {
            reload_handle,
            _root_span: root_span,
        })
    }
}
