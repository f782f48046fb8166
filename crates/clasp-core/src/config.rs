//! Engine configuration
//!
//! Settings can come from code, a YAML document, or process environment
//! variables. Unset keys fall back to the defaults of [`EngineConfig`].

use crate::error::{ClaspError, ClaspResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Runtime configuration shared by the fact store and the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allow asserting a fact equal to a live one. When false the existing
    /// fact id is returned instead.
    pub fact_duplication: bool,
    /// Interning calls tolerated between sweeps of dead symbol table entries
    pub symbol_purge_threshold: usize,
    /// Log every match event at debug level
    pub trace_matches: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { fact_duplication: false, symbol_purge_threshold: 4096, trace_matches: false }
    }
}

impl EngineConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> ClaspResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ClaspResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading engine configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Create configuration from environment variables
    ///
    /// Reads `CLASP_FACT_DUPLICATION`, `CLASP_SYMBOL_PURGE_THRESHOLD` and
    /// `CLASP_TRACE_MATCHES`; unparsable values are rejected.
    pub fn from_environment() -> ClaspResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("CLASP_FACT_DUPLICATION") {
            config.fact_duplication = parse_setting("CLASP_FACT_DUPLICATION", &value)?;
        }
        if let Ok(value) = std::env::var("CLASP_SYMBOL_PURGE_THRESHOLD") {
            config.symbol_purge_threshold =
                parse_setting("CLASP_SYMBOL_PURGE_THRESHOLD", &value)?;
        }
        if let Ok(value) = std::env::var("CLASP_TRACE_MATCHES") {
            config.trace_matches = parse_setting("CLASP_TRACE_MATCHES", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> ClaspResult<()> {
        if self.symbol_purge_threshold == 0 {
            return Err(ClaspError::configuration(
                "symbol_purge_threshold",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_setting<T: std::str::FromStr>(name: &str, value: &str) -> ClaspResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ClaspError::configuration(name, format!("cannot parse '{value}'")))
}
