//! Enrollment Integration Orchestrator runtime
//!
//! Fans one domain event (enrollment, completion, progress) out into a
//! chain of dependent, independently-failable steps:
//!
//! - [`DependencyGraph`]: validated step DAG and its execution levels
//! - [`StepExecutor`]: one side effect, failing as data rather than panics
//! - [`Pipeline`]: a graph plus one executor per step, per event kind
//! - [`ChainRunner`]: dedupes triggers and drives chains in the background
//! - [`ChainRegistry`]: active chains, bounded history, lifetime counters
//! - [`EnrollmentOrchestrator`]: the façade collaborators talk to
//!
//! # Example
//!
//! ```no_run
//! use enrollment_engine::{EnrollmentOrchestrator, OrchestratorConfig, Services};
//! use enrollment_types::{CourseId, SessionId, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator =
//!     EnrollmentOrchestrator::with_services(OrchestratorConfig::default(), Services::in_memory())?;
//!
//! let chain = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
//! let finished = orchestrator.wait_for_completion(&chain.id).await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod steps;

pub use config::OrchestratorConfig;
pub use executor::{
    execute_step, DependencyOutput, StepContext, StepError, StepExecutor, StepOutcome,
    MISSING_DEPENDENCY,
};
pub use graph::{DependencyGraph, DependencyMap};
pub use orchestrator::EnrollmentOrchestrator;
pub use pipeline::{Pipeline, PipelineBuilder, Pipelines};
pub use registry::ChainRegistry;
pub use runner::{ChainRunner, StartOutcome};
pub use steps::{default_pipelines, InMemoryServices, ServiceError, Services};
