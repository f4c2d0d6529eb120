//! Chain runner
//!
//! Creates a chain for an event, registers it under its dedupe key and
//! hands the rest of the work to a background task. The task walks the
//! pipeline's execution levels: every step of a level runs concurrently,
//! and a level starts only once the previous one has a result for every
//! step. A step whose dependency hard-failed or was skipped is itself
//! skipped; independent branches keep running.

use crate::config::OrchestratorConfig;
use crate::executor::{execute_step, DependencyOutput, StepContext};
use crate::pipeline::{Pipeline, Pipelines};
use crate::registry::{ChainRegistry, Registration};
use chrono::Utc;
use enrollment_types::{
    Chain, ChainEvent, ChainId, ChainStatus, Event, StepDefinition, StepName, StepResult,
};
use futures::future::join_all;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

/// What a trigger produced
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A new chain was created and is running in the background
    Started(Chain),
    /// An in-flight chain already held the dedupe key
    Existing(Chain),
}

impl StartOutcome {
    pub fn chain(&self) -> &Chain {
        match self {
            StartOutcome::Started(chain) | StartOutcome::Existing(chain) => chain,
        }
    }

    pub fn into_chain(self) -> Chain {
        match self {
            StartOutcome::Started(chain) | StartOutcome::Existing(chain) => chain,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Schedules chains onto a Tokio runtime
#[derive(Clone)]
pub struct ChainRunner {
    pipelines: Arc<Pipelines>,
    registry: Arc<ChainRegistry>,
    config: Arc<OrchestratorConfig>,
    events: broadcast::Sender<ChainEvent>,
    runtime: Handle,
}

impl ChainRunner {
    pub fn new(
        pipelines: Arc<Pipelines>,
        registry: Arc<ChainRegistry>,
        config: Arc<OrchestratorConfig>,
        events: broadcast::Sender<ChainEvent>,
        runtime: Handle,
    ) -> Self {
        Self {
            pipelines,
            registry,
            config,
            events,
            runtime,
        }
    }

    /// Start a chain for `event`, or return the in-flight chain for its key.
    ///
    /// Returns immediately; the chain runs on a task spawned onto the
    /// runner's runtime, so callers need no runtime context of their own.
    #[instrument(skip(self, event), fields(kind = %event.kind, dedupe_key = %event.dedupe_key()))]
    pub fn start(&self, event: Event) -> StartOutcome {
        self.launch(event, None, HashMap::new())
    }

    /// Start a new chain replaying only the non-successful steps of `original`
    #[instrument(skip(self, original), fields(original = %original.id))]
    pub fn rerun(&self, original: &Chain) -> StartOutcome {
        let carried = original
            .steps
            .iter()
            .filter(|step| step.status.is_success())
            .map(|step| (step.step_name.clone(), step.clone()))
            .collect();
        self.launch(original.to_event(), Some(original.id.clone()), carried)
    }

    fn launch(
        &self,
        event: Event,
        rerun_of: Option<ChainId>,
        carried: HashMap<StepName, StepResult>,
    ) -> StartOutcome {
        let mut chain = Chain::new(&event);
        if let Some(original) = rerun_of {
            chain = chain.with_rerun_of(original);
        }

        if let Registration::Existing(existing) = self.registry.register(&chain) {
            debug!(
                chain_id = %existing.id,
                dedupe_key = %existing.dedupe_key,
                "Duplicate trigger answered with in-flight chain"
            );
            self.emit(ChainEvent::DuplicateSuppressed {
                chain_id: existing.id.clone(),
                dedupe_key: existing.dedupe_key.clone(),
                at: Utc::now(),
            });
            return StartOutcome::Existing(existing);
        }

        chain.mark_running();
        self.registry.publish(&chain);

        info!(
            chain_id = %chain.id,
            kind = %chain.event_kind,
            user_id = %chain.user_id,
            course_id = %chain.course_id,
            rerun_of = ?chain.rerun_of,
            "Chain started"
        );
        self.emit(ChainEvent::ChainStarted {
            chain_id: chain.id.clone(),
            event_kind: chain.event_kind,
            dedupe_key: chain.dedupe_key.clone(),
            at: Utc::now(),
        });

        let snapshot = chain.clone();
        let runner = self.clone();
        self.runtime.spawn(async move {
            runner.drive(chain, Arc::new(event), carried).await;
        });

        StartOutcome::Started(snapshot)
    }

    /// Run every level of the pipeline, then retire the chain
    async fn drive(
        self,
        mut chain: Chain,
        event: Arc<Event>,
        mut carried: HashMap<StepName, StepResult>,
    ) {
        let pipeline = self.pipelines.for_kind(chain.event_kind).clone();
        let mut recorded: HashMap<StepName, StepResult> = HashMap::new();

        for level in pipeline.graph().execution_order() {
            let results = self
                .run_level(&pipeline, level, &chain, &event, &recorded, &mut carried)
                .await;

            for result in results {
                self.emit(ChainEvent::StepFinished {
                    chain_id: chain.id.clone(),
                    step: result.step_name.clone(),
                    status: result.status,
                    at: result.finished_at,
                });
                recorded.insert(result.step_name.clone(), result.clone());
                chain.record_step(result);
            }
            self.registry.publish(&chain);
        }

        let status = chain.finish();
        let duration_ms = chain.duration_ms().unwrap_or(0);
        match status {
            ChainStatus::Success => info!(chain_id = %chain.id, duration_ms, "Chain succeeded"),
            ChainStatus::Partial => warn!(chain_id = %chain.id, duration_ms, "Chain completed partially"),
            _ => error!(
                chain_id = %chain.id,
                dedupe_key = %chain.dedupe_key,
                duration_ms,
                "Chain failed"
            ),
        }

        let chain_id = chain.id.clone();
        self.registry.record_history(chain);
        self.emit(ChainEvent::ChainCompleted {
            chain_id,
            status,
            duration_ms,
            at: Utc::now(),
        });
    }

    /// Produce one result per step of `level`, in level order
    async fn run_level(
        &self,
        pipeline: &Pipeline,
        level: &[StepName],
        chain: &Chain,
        event: &Arc<Event>,
        recorded: &HashMap<StepName, StepResult>,
        carried: &mut HashMap<StepName, StepResult>,
    ) -> Vec<StepResult> {
        let mut results: Vec<StepResult> = Vec::with_capacity(level.len());
        let mut running = Vec::new();

        for name in level {
            let Some(definition) = pipeline.graph().definition(name.as_str()) else {
                continue;
            };

            if let Some(previous) = carried.remove(name) {
                results.push(previous);
                continue;
            }

            if let Some(blocker) = blocking_dependency(definition, recorded) {
                debug!(chain_id = %chain.id, step = %name, blocked_by = %blocker, "Step skipped");
                results.push(StepResult::skipped(definition, blocker));
                continue;
            }

            let Some(executor) = pipeline.executor(name.as_str()).cloned() else {
                error!(chain_id = %chain.id, step = %name, "No executor for step");
                results.push(StepResult::defect(definition, "no executor registered", Utc::now()));
                continue;
            };

            let dependencies = definition
                .depends_on
                .iter()
                .filter_map(|dep| {
                    recorded
                        .get(dep)
                        .map(|result| (dep.clone(), DependencyOutput::from_result(result)))
                })
                .collect();
            let ctx = StepContext::new(chain.id.clone(), event.clone(), dependencies);
            let timeout = self.config.step_timeout(name);
            let task_definition = definition.clone();
            let handle = self.runtime.spawn(async move {
                execute_step(&task_definition, executor.as_ref(), &ctx, timeout).await
            });
            running.push((definition.clone(), Utc::now(), handle));
        }

        let joined = join_all(
            running
                .into_iter()
                .map(|(definition, started_at, handle)| async move {
                    (definition, started_at, handle.await)
                }),
        )
        .await;

        for (definition, started_at, outcome) in joined {
            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    let reason = describe_join_error(err);
                    error!(
                        chain_id = %chain.id,
                        step = %definition.name,
                        dedupe_key = %chain.dedupe_key,
                        critical = definition.critical,
                        error = %reason,
                        "Step crashed"
                    );
                    StepResult::defect(&definition, reason, started_at)
                }
            };
            results.push(result);
        }

        results.sort_by_key(|result| {
            level
                .iter()
                .position(|name| name == &result.step_name)
                .unwrap_or(usize::MAX)
        });
        results
    }

    fn emit(&self, event: ChainEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// First dependency that did not leave usable output, if any
fn blocking_dependency<'a>(
    definition: &'a StepDefinition,
    recorded: &HashMap<StepName, StepResult>,
) -> Option<&'a StepName> {
    definition.depends_on.iter().find(|dep| {
        !recorded
            .get(*dep)
            .map(|result| result.status.unblocks_dependents())
            .unwrap_or(false)
    })
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return "step task cancelled".to_string();
    }
    format!("step panicked: {}", panic_message(err.into_panic()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
