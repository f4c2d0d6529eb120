//! Error taxonomy for orchestration configuration and the public façade
//!
//! Nothing inside a running chain surfaces as one of these errors; chain
//! outcomes are data. These cover startup validation and lookups.

use crate::{ChainId, ChainStatus, EventKind, StepName};
use thiserror::Error;

/// Dependency graph configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<StepName> },

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepName, dependency: StepName },

    #[error("Duplicate step name: {0}")]
    DuplicateStep(StepName),

    #[error("Dependency graph has no steps")]
    Empty,
}

fn format_cycle(cycle: &[StepName]) -> String {
    cycle
        .iter()
        .map(StepName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid dependency graph for {kind}: {source}")]
    Graph {
        kind: EventKind,
        #[source]
        source: GraphError,
    },

    #[error("No executor registered for step '{step}' in {kind} pipeline")]
    MissingExecutor { kind: EventKind, step: StepName },

    #[error("Executor registered for undeclared step '{step}' in {kind} pipeline")]
    UndeclaredExecutor { kind: EventKind, step: StepName },

    #[error("No pipeline configured for {0} events")]
    MissingPipeline(EventKind),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(ChainId),

    #[error("Chain {chain_id} cannot be re-run while {status}")]
    NotRerunnable { chain_id: ChainId, status: ChainStatus },
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = GraphError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_graph_error_wrapped_with_kind() {
        let err = OrchestratorError::Graph {
            kind: EventKind::Progress,
            source: GraphError::Empty,
        };
        assert!(err.to_string().contains("progress"));
    }
}
