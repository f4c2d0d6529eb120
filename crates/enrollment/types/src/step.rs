//! Step definitions and step outcomes
//!
//! A StepDefinition is static configuration loaded once at startup. A
//! StepResult is the recorded outcome of one step inside one chain; once a
//! result is appended to a chain it is never rewritten.

use crate::StepName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// ── Step Definition ──────────────────────────────────────────────────

/// Declarative description of one step in a dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step name within its graph
    pub name: StepName,
    /// Steps whose outputs this step requires
    #[serde(default)]
    pub depends_on: BTreeSet<StepName>,
    /// A hard failure here aborts (skips) every dependent
    #[serde(default)]
    pub critical: bool,
}

impl StepDefinition {
    /// A non-critical step with no dependencies
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: StepName::new(name),
            depends_on: BTreeSet::new(),
            critical: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.insert(StepName::new(step));
        self
    }
}

// ── Step Outcome ─────────────────────────────────────────────────────

/// Outcome status of a step within a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Completed and produced its output
    Success,
    /// Failed; dependents still run against the step's fallback output
    SoftFailure,
    /// Failed; dependents are skipped
    HardFailure,
    /// Not executed because a dependency hard-failed or was skipped
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether dependents of a step with this status may still run
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Success | Self::SoftFailure)
    }
}

/// Recorded outcome of one executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: StepName,
    pub status: StepStatus,
    /// Whether the step was declared critical
    pub critical: bool,
    /// Opaque payload handed to dependents
    #[serde(default)]
    pub output: Value,
    /// Present iff status is not `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(
        definition: &StepDefinition,
        output: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_name: definition.name.clone(),
            status: StepStatus::Success,
            critical: definition.critical,
            output,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// An expected failure, classified by the definition's `critical` flag.
    ///
    /// Non-critical failures carry the step's fallback output so dependents
    /// keep running; critical failures carry no output.
    pub fn failure(
        definition: &StepDefinition,
        error: impl Into<String>,
        fallback: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (status, output) = if definition.critical {
            (StepStatus::HardFailure, Value::Null)
        } else {
            (StepStatus::SoftFailure, fallback)
        };
        Self {
            step_name: definition.name.clone(),
            status,
            critical: definition.critical,
            output,
            error: Some(error.into()),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// An unexpected defect; always a hard failure regardless of `critical`
    pub fn defect(
        definition: &StepDefinition,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_name: definition.name.clone(),
            status: StepStatus::HardFailure,
            critical: definition.critical,
            output: Value::Null,
            error: Some(error.into()),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(definition: &StepDefinition, blocked_by: &StepName) -> Self {
        let now = Utc::now();
        Self {
            step_name: definition.name.clone(),
            status: StepStatus::Skipped,
            critical: definition.critical,
            output: Value::Null,
            error: Some(format!("skipped: dependency '{}' did not complete", blocked_by)),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
