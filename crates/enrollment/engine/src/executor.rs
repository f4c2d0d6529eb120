//! Step executor contract
//!
//! A StepExecutor performs one named side effect. Expected failures are
//! returned as [`StepError`]; [`execute_step`] classifies them as soft or
//! hard according to the step's `critical` flag and enforces the step
//! timeout. Executors never see a missing dependency: a dependency that
//! soft-failed resolves to its documented fallback output.

use crate::steps::ServiceError;
use async_trait::async_trait;
use chrono::Utc;
use enrollment_types::{ChainId, Event, StepDefinition, StepName, StepResult, StepStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Sentinel returned for a dependency name the step did not declare
pub static MISSING_DEPENDENCY: Value = Value::Null;

/// Expected failure of a step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("step timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("unusable output: {0}")]
    Output(String),
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::Output(err.to_string())
    }
}

/// Result type for step executors
pub type StepOutcome = std::result::Result<Value, StepError>;

/// Output of a completed dependency as seen by a dependent step
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyOutput {
    pub value: Value,
    /// True when the dependency soft-failed and `value` is its fallback
    pub fallback: bool,
}

impl DependencyOutput {
    /// Resolve what dependents see for a recorded step result
    pub fn from_result(result: &StepResult) -> Self {
        Self {
            value: result.output.clone(),
            fallback: result.status != StepStatus::Success,
        }
    }
}

/// Everything a step may read: the event plus its dependencies' outputs
#[derive(Debug, Clone)]
pub struct StepContext {
    chain_id: ChainId,
    event: Arc<Event>,
    dependencies: HashMap<StepName, DependencyOutput>,
}

impl StepContext {
    pub fn new(
        chain_id: ChainId,
        event: Arc<Event>,
        dependencies: HashMap<StepName, DependencyOutput>,
    ) -> Self {
        Self {
            chain_id,
            event,
            dependencies,
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Output of a dependency, or [`MISSING_DEPENDENCY`] for an undeclared name
    pub fn output(&self, step: &str) -> &Value {
        self.dependencies
            .get(step)
            .map(|d| &d.value)
            .unwrap_or(&MISSING_DEPENDENCY)
    }

    /// Whether a dependency's output is a fallback rather than a real result
    pub fn is_fallback(&self, step: &str) -> bool {
        self.dependencies
            .get(step)
            .map(|d| d.fallback)
            .unwrap_or(true)
    }
}

/// One side-effecting step
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Perform the step. Expected failures are errors, never panics.
    async fn run(&self, ctx: &StepContext) -> StepOutcome;

    /// Output recorded for, and handed to dependents of, a soft failure
    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        Value::Null
    }
}

/// Run one step under its timeout and classify the outcome
pub async fn execute_step(
    definition: &StepDefinition,
    executor: &dyn StepExecutor,
    ctx: &StepContext,
    timeout: Duration,
) -> StepResult {
    let started_at = Utc::now();

    let error = match tokio::time::timeout(timeout, executor.run(ctx)).await {
        Ok(Ok(output)) => return StepResult::success(definition, output, started_at),
        Ok(Err(err)) => err,
        Err(_) => StepError::Timeout {
            after_ms: timeout.as_millis() as u64,
        },
    };

    if definition.critical {
        error!(
            chain_id = %ctx.chain_id(),
            step = %definition.name,
            dedupe_key = %ctx.event().dedupe_key(),
            error = %error,
            "Critical step failed"
        );
    } else {
        warn!(
            chain_id = %ctx.chain_id(),
            step = %definition.name,
            error = %error,
            "Step failed; dependents continue with fallback output"
        );
    }
    StepResult::failure(
        definition,
        error.to_string(),
        executor.fallback_output(ctx),
        started_at,
    )
}
