//! Enrollment orchestration domain types
//!
//! Pure data shared by the orchestrator engine and its callers:
//!
//! - **Event**: what happened (enrollment, completion, progress)
//! - **StepDefinition / StepResult**: static step config and per-chain outcome
//! - **Chain**: one run of the orchestrator for one event
//! - **ChainStats / ChainEvent**: introspection data
//!
//! Everything here serializes to the JSON snapshots served by the read API.

#![deny(unsafe_code)]

pub mod chain;
pub mod error;
pub mod event;
pub mod events;
pub mod ids;
pub mod stats;
pub mod step;

pub use chain::{Chain, ChainStatus};
pub use error::{GraphError, OrchestratorError, OrchestratorResult};
pub use event::{Event, EventKind};
pub use events::ChainEvent;
pub use ids::{ChainId, ContentId, CourseId, DedupeKey, SessionId, StepName, UserId};
pub use stats::{ChainStats, StepFailureCounts};
pub use step::{StepDefinition, StepResult, StepStatus};
