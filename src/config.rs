//! Client configuration
//!
//! Loaded from YAML; every field has a default so partial files work.

use crate::client::consistency::RetryPlan;
use crate::domain::types::ResourceType;
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Retry Settings
// =============================================================================

/// Write-visibility polling budget, in config-file units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff_ms: 1000,
            max_backoff_ms: 5000,
        }
    }
}

impl From<&RetrySettings> for RetryPlan {
    fn from(settings: &RetrySettings) -> Self {
        RetryPlan::new(
            settings.max_attempts,
            Duration::from_millis(settings.min_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
        )
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for one resource client stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Resource type; `version` is the primary version reads start from
    pub resource: ResourceType,
    /// Cloud stack ID. When set, every org maps to `stacks-<id>`.
    pub stack_id: Option<String>,
    /// Polling budget for write visibility
    pub retry: RetrySettings,
    /// Wait for search visibility after writes
    pub consistent_writes: bool,
    /// Logging
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resource: ResourceType::new("dashboard.grafana.app", "v1", "Dashboard", "dashboards"),
            stack_id: None,
            retry: RetrySettings::default(),
            consistent_writes: true,
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn retry_plan(&self) -> RetryPlan {
        RetryPlan::from(&self.retry)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource.group.is_empty() {
            return Err(Error::Configuration("resource.group must not be empty".into()));
        }
        if self.resource.version.is_empty() {
            return Err(Error::Configuration("resource.version must not be empty".into()));
        }
        if self.resource.plural.is_empty() {
            return Err(Error::Configuration("resource.plural must not be empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::Configuration(format!(
                "retry.min_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.min_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        Ok(())
    }
}
