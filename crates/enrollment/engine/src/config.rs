//! Orchestrator configuration

use enrollment_types::{OrchestratorError, OrchestratorResult, StepName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Tunables for the chain runner and registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of terminal chains retained for the history API
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Timeout applied to every step invocation unless overridden
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,

    /// Per-step timeout overrides, keyed by step name
    #[serde(default)]
    pub step_timeouts: HashMap<String, u64>,

    /// Capacity of the chain event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            default_step_timeout_ms: default_step_timeout_ms(),
            step_timeouts: HashMap::new(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_history_capacity() -> usize {
    100
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    1024
}

impl OrchestratorConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_step_timeout(mut self, step: impl Into<String>, timeout: Duration) -> Self {
        self.step_timeouts
            .insert(step.into(), timeout.as_millis() as u64);
        self
    }

    /// Reject values the runner cannot operate with
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.history_capacity == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "history_capacity must be at least 1".into(),
            ));
        }
        if self.default_step_timeout_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "default_step_timeout_ms must be greater than 0".into(),
            ));
        }
        if let Some((step, _)) = self.step_timeouts.iter().find(|(_, ms)| **ms == 0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "timeout for step '{}' must be greater than 0",
                step
            )));
        }
        if self.event_buffer == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "event_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Effective timeout for one step
    pub fn step_timeout(&self, step: &StepName) -> Duration {
        let ms = self
            .step_timeouts
            .get(step.as_str())
            .copied()
            .unwrap_or(self.default_step_timeout_ms);
        Duration::from_millis(ms)
    }
}
