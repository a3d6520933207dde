//! Logging Setup

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output logs as JSON
    pub json: bool,
    /// Extra `target=level` directives
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directives: vec!["kube=info".to_string(), "hyper=warn".to_string()],
        }
    }
}

impl LogConfig {
    fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter: `RUST_LOG` first, then the configured level and
    /// directives
    pub fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level().into());
        for directive in &self.directives {
            let parsed = directive.parse().map_err(|e| {
                Error::Configuration(format!("invalid log directive {:?}: {}", directive, e))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    installed.map_err(|e| Error::Internal(format!("failed to install subscriber: {}", e)))
}
