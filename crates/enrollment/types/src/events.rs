//! Chain lifecycle events for observers

use crate::{ChainId, ChainStatus, DedupeKey, EventKind, StepName, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something observable that happened to a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    ChainStarted {
        chain_id: ChainId,
        event_kind: EventKind,
        dedupe_key: DedupeKey,
        at: DateTime<Utc>,
    },
    /// A trigger was answered with an existing in-flight chain
    DuplicateSuppressed {
        chain_id: ChainId,
        dedupe_key: DedupeKey,
        at: DateTime<Utc>,
    },
    StepFinished {
        chain_id: ChainId,
        step: StepName,
        status: StepStatus,
        at: DateTime<Utc>,
    },
    ChainCompleted {
        chain_id: ChainId,
        status: ChainStatus,
        duration_ms: i64,
        at: DateTime<Utc>,
    },
}

impl ChainEvent {
    pub fn chain_id(&self) -> &ChainId {
        match self {
            ChainEvent::ChainStarted { chain_id, .. }
            | ChainEvent::DuplicateSuppressed { chain_id, .. }
            | ChainEvent::StepFinished { chain_id, .. }
            | ChainEvent::ChainCompleted { chain_id, .. } => chain_id,
        }
    }
}
