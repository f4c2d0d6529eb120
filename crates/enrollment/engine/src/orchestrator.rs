//! Enrollment orchestrator façade
//!
//! The single entry and exit point for collaborators. Triggers build an
//! event and hand it to the chain runner; reads are served from the
//! registry. No business logic lives here.

use crate::config::OrchestratorConfig;
use crate::graph::DependencyMap;
use crate::pipeline::Pipelines;
use crate::registry::ChainRegistry;
use crate::runner::{ChainRunner, StartOutcome};
use crate::steps::{default_pipelines, Services};
use enrollment_types::{
    Chain, ChainEvent, ChainId, ChainStats, ChainStatus, ContentId, CourseId, Event, EventKind,
    OrchestratorError, OrchestratorResult, SessionId, UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Coordinates the follow-up work triggered by enrollment domain events
pub struct EnrollmentOrchestrator {
    runner: ChainRunner,
    registry: Arc<ChainRegistry>,
    pipelines: Arc<Pipelines>,
    events: broadcast::Sender<ChainEvent>,
}

impl EnrollmentOrchestrator {
    /// Create an orchestrator over explicit pipelines.
    ///
    /// Must be called from within a Tokio runtime; chains are spawned onto
    /// that runtime for the lifetime of the orchestrator, whichever thread
    /// later triggers them.
    pub fn new(config: OrchestratorConfig, pipelines: Pipelines) -> OrchestratorResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            OrchestratorError::InvalidConfig(
                "orchestrator must be created inside a Tokio runtime".to_string(),
            )
        })?;

        let registry = Arc::new(ChainRegistry::new(config.history_capacity));
        let pipelines = Arc::new(pipelines);
        let (events, _) = broadcast::channel(config.event_buffer);
        let runner = ChainRunner::new(
            pipelines.clone(),
            registry.clone(),
            Arc::new(config),
            events.clone(),
            runtime,
        );

        info!(
            history_capacity = registry.capacity(),
            "Enrollment orchestrator initialized"
        );

        Ok(Self {
            runner,
            registry,
            pipelines,
            events,
        })
    }

    /// Create an orchestrator running the built-in course pipelines
    pub fn with_services(config: OrchestratorConfig, services: Services) -> OrchestratorResult<Self> {
        let pipelines = default_pipelines(&services)?;
        Self::new(config, pipelines)
    }

    // ── Triggers ─────────────────────────────────────────────────────

    /// A learner enrolled in a course
    pub fn handle_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        session_id: SessionId,
    ) -> Chain {
        self.handle_event(Event::enrollment(user_id, course_id, session_id))
    }

    /// A learner completed a course
    pub fn handle_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
        session_id: SessionId,
    ) -> Chain {
        self.handle_event(Event::completion(user_id, course_id, session_id))
    }

    /// A learner made progress on one piece of content
    pub fn handle_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        content_id: ContentId,
        progress_value: f64,
        session_id: SessionId,
    ) -> Chain {
        self.handle_event(Event::progress(
            user_id,
            course_id,
            content_id,
            progress_value,
            session_id,
        ))
    }

    /// Start (or join) the chain for an arbitrary event.
    ///
    /// Returns the chain snapshot without waiting for it to finish.
    pub fn handle_event(&self, event: Event) -> Chain {
        self.runner.start(event).into_chain()
    }

    /// Like [`handle_event`](Self::handle_event), but reports whether a
    /// new chain was created
    pub fn trigger(&self, event: Event) -> StartOutcome {
        self.runner.start(event)
    }

    /// Re-run the failed, soft-failed and skipped steps of a finished chain
    #[instrument(skip(self), fields(chain_id = %chain_id))]
    pub fn rerun_failed_steps(&self, chain_id: &ChainId) -> OrchestratorResult<Chain> {
        let original = self
            .registry
            .get(chain_id)
            .ok_or_else(|| OrchestratorError::ChainNotFound(chain_id.clone()))?;

        if !original.is_terminal() || original.status == ChainStatus::Success {
            return Err(OrchestratorError::NotRerunnable {
                chain_id: chain_id.clone(),
                status: original.status,
            });
        }

        Ok(self.runner.rerun(&original).into_chain())
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get_chain_status(&self, chain_id: &ChainId) -> Option<Chain> {
        self.registry.get(chain_id)
    }

    /// Terminal chains, newest first
    pub fn get_chain_history(&self, limit: usize) -> Vec<Chain> {
        self.registry.history(limit)
    }

    pub fn get_stats(&self) -> ChainStats {
        self.registry.stats()
    }

    /// Step dependencies of every pipeline, keyed by event kind
    pub fn get_dependency_map(&self) -> BTreeMap<EventKind, DependencyMap> {
        self.pipelines.describe()
    }

    /// Resolve once the chain is terminal; `None` if it is unknown or evicted
    pub async fn wait_for_completion(&self, chain_id: &ChainId) -> Option<Chain> {
        self.registry.wait_for_completion(chain_id).await
    }

    /// Stream of chain lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for EnrollmentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentOrchestrator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::InMemoryServices;

    fn orchestrator() -> (EnrollmentOrchestrator, InMemoryServices) {
        let services = InMemoryServices::new();
        let orchestrator =
            EnrollmentOrchestrator::with_services(OrchestratorConfig::default(), services.services())
                .unwrap();
        (orchestrator, services)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = EnrollmentOrchestrator::with_services(
            OrchestratorConfig::default().with_history_capacity(0),
            Services::in_memory(),
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn test_construction_outside_runtime_rejected() {
        let err = EnrollmentOrchestrator::with_services(
            OrchestratorConfig::default(),
            Services::in_memory(),
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn test_trigger_from_thread_without_runtime_context() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let (orchestrator, services) = {
            let _guard = runtime.enter();
            orchestrator()
        };

        // Caller has no runtime context here
        assert!(Handle::try_current().is_err());
        let chain = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
        assert_eq!(chain.status, ChainStatus::Running);

        let done = runtime
            .block_on(async {
                tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    orchestrator.wait_for_completion(&chain.id),
                )
                .await
            })
            .unwrap()
            .unwrap();
        assert_eq!(done.status, ChainStatus::Success);
        assert_eq!(services.notifications.delivered().len(), 1);

        // Key released: the next trigger starts a fresh chain
        let again = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
        assert_ne!(again.id, chain.id);
        runtime
            .block_on(orchestrator.wait_for_completion(&again.id))
            .unwrap();
    }

    #[tokio::test]
    async fn test_enrollment_runs_to_success() {
        let (orchestrator, services) = orchestrator();
        let chain = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
        assert_eq!(chain.status, ChainStatus::Running);

        let done = orchestrator.wait_for_completion(&chain.id).await.unwrap();
        assert_eq!(done.status, ChainStatus::Success);
        assert_eq!(done.steps.len(), 6);
        assert!(services.study_plans.plan(UserId(7), CourseId(42)).is_some());
        assert_eq!(services.notifications.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_of_unknown_chain() {
        let (orchestrator, _) = orchestrator();
        let err = orchestrator
            .rerun_failed_steps(&ChainId::generate())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ChainNotFound(_)));
    }

    #[tokio::test]
    async fn test_successful_chain_not_rerunnable() {
        let (orchestrator, _) = orchestrator();
        let chain = orchestrator.handle_completion(UserId(1), CourseId(2), SessionId::new("s"));
        orchestrator.wait_for_completion(&chain.id).await.unwrap();

        let err = orchestrator.rerun_failed_steps(&chain.id).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NotRerunnable {
                status: ChainStatus::Success,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dependency_map_covers_every_kind() {
        let (orchestrator, _) = orchestrator();
        let map = orchestrator.get_dependency_map();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), EventKind::ALL.to_vec());
    }
}
