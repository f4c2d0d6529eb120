//! Chains: one orchestration run for one event
//!
//! A Chain is created `pending`, becomes `running` when its first step
//! starts, and ends in `success`, `partial` or `failed`. Terminal chains
//! are frozen; a re-run produces a new chain that points back at the old one.

use crate::{
    ChainId, ContentId, CourseId, DedupeKey, Event, EventKind, SessionId, StepResult, StepStatus,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Chain Status ─────────────────────────────────────────────────────

/// Lifecycle state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Created, no step started yet
    #[default]
    Pending,
    /// Steps are executing
    Running,
    /// Every step succeeded
    Success,
    /// Some steps failed, but no critical step hard-failed
    Partial,
    /// A critical step hard-failed
    Failed,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Partial | Self::Failed)
    }

    /// Terminal status implied by a set of step results.
    ///
    /// `failed` iff any critical step hard-failed, `success` iff every step
    /// succeeded, `partial` otherwise.
    pub fn from_steps(steps: &[StepResult]) -> Self {
        if steps
            .iter()
            .any(|s| s.critical && s.status == StepStatus::HardFailure)
        {
            ChainStatus::Failed
        } else if steps.iter().all(|s| s.status.is_success()) {
            ChainStatus::Success
        } else {
            ChainStatus::Partial
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Chain ────────────────────────────────────────────────────────────

/// Snapshot of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub event_kind: EventKind,
    pub user_id: UserId,
    pub course_id: CourseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_value: Option<f64>,
    pub session_id: SessionId,
    pub dedupe_key: DedupeKey,
    pub status: ChainStatus,
    /// Step outcomes in dependency order
    pub steps: Vec<StepResult>,
    /// Chain this one re-runs the failed steps of
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerun_of: Option<ChainId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Chain {
    /// Create a pending chain for an event
    pub fn new(event: &Event) -> Self {
        Self {
            id: ChainId::generate(),
            event_kind: event.kind,
            user_id: event.user_id,
            course_id: event.course_id,
            content_id: event.content_id.clone(),
            progress_value: event.progress_value,
            session_id: event.session_id.clone(),
            dedupe_key: event.dedupe_key(),
            status: ChainStatus::Pending,
            steps: Vec::new(),
            rerun_of: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_rerun_of(mut self, original: ChainId) -> Self {
        self.rerun_of = Some(original);
        self
    }

    /// Rebuild the triggering event from the fields this chain retained
    pub fn to_event(&self) -> Event {
        Event {
            kind: self.event_kind,
            user_id: self.user_id,
            course_id: self.course_id,
            content_id: self.content_id.clone(),
            progress_value: self.progress_value,
            session_id: self.session_id.clone(),
            occurred_at: self.created_at,
        }
    }

    pub fn mark_running(&mut self) {
        if self.status == ChainStatus::Pending {
            self.status = ChainStatus::Running;
        }
    }

    /// Append a step outcome. Ignored once the chain is terminal.
    pub fn record_step(&mut self, result: StepResult) {
        if self.is_terminal() {
            return;
        }
        self.steps.push(result);
    }

    /// Derive the terminal status and stamp completion
    pub fn finish(&mut self) -> ChainStatus {
        if !self.is_terminal() {
            self.status = ChainStatus::from_steps(&self.steps);
            self.completed_at = Some(Utc::now());
        }
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_name.as_str() == name)
    }

    /// Wall-clock duration, available once terminal
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds())
    }
}
