use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigurationError;
use crate::request::PublishingOptions;

/// What happens to units already running when a run is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Let running units complete; only unstarted units are skipped.
    #[default]
    FinishInFlight,
    /// Stop running units at their current stage and record a retryable failure.
    AbandonInFlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_unit_timeout_ms")]
    pub unit_timeout_ms: u64,
    #[serde(default)]
    pub cancellation_policy: CancellationPolicy,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_unit_timeout_ms() -> u64 {
    120_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            unit_timeout_ms: default_unit_timeout_ms(),
            cancellation_policy: CancellationPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::InvalidConcurrency);
        }
        if self.unit_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidTimeout);
        }
        Ok(())
    }

    /// Applies per-request overrides.
    pub fn for_request(&self, publishing: &PublishingOptions) -> Self {
        Self {
            max_concurrency: publishing.max_concurrency.unwrap_or(self.max_concurrency),
            unit_timeout_ms: publishing.unit_timeout_ms.unwrap_or(self.unit_timeout_ms),
            cancellation_policy: self.cancellation_policy,
        }
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            max_concurrency = self.max_concurrency,
            unit_timeout_ms = self.unit_timeout_ms,
            cancellation_policy = ?self.cancellation_policy,
            "Loaded OrchestratorConfig"
        );
        debug!(?self, "OrchestratorConfig loaded (full debug)");
    }
}
