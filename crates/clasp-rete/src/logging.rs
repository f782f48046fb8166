//! Tracing subscriber setup for embedding applications and tests

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for log output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives
    pub filter: String,
    pub format: LogFormat,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "clasp_core=info,clasp_rete=info".to_string(),
            format: LogFormat::Pretty,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Create configuration from environment variables
    ///
    /// `CLASP_LOG` holds filter directives and `CLASP_LOG_FORMAT` selects
    /// `pretty` or `json`; anything else falls back to the default.
    pub fn from_environment() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("CLASP_LOG").unwrap_or(defaults.filter),
            format: match std::env::var("CLASP_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            with_target: std::env::var("CLASP_LOG_TARGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.with_target),
        }
    }
}

/// Install a global subscriber
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(config.with_target))
            .try_init()?,
    }

    info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    Ok(())
}
