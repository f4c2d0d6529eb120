//! Scripted step executors and pipeline helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use enrollment_engine::{
    EnrollmentOrchestrator, OrchestratorConfig, Pipeline, PipelineBuilder, Pipelines,
    ServiceError, StepContext, StepExecutor, StepOutcome,
};
use enrollment_types::{Chain, CourseId, EventKind, SessionId, StepDefinition, UserId};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
pub enum Behavior {
    Succeed(Value),
    /// Expected failure on every call
    Fail(&'static str),
    /// Expected failure on the first `n` calls, success afterwards
    FailTimes(usize, &'static str),
    Panic,
    Hang,
    /// Block until the gate is opened, then succeed
    WaitFor(Arc<Notify>),
}

/// A step whose outcome is fixed by the test
#[derive(Clone)]
pub struct Scripted {
    behavior: Behavior,
    fallback: Value,
    observe: Vec<&'static str>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<HashMap<String, (Value, bool)>>>,
}

impl Scripted {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            fallback: Value::Null,
            observe: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ok(output: Value) -> Self {
        Self::new(Behavior::Succeed(output))
    }

    pub fn failing(reason: &'static str) -> Self {
        Self::new(Behavior::Fail(reason))
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = fallback;
        self
    }

    /// Record what this step sees for a dependency
    pub fn observing(mut self, dependency: &'static str) -> Self {
        self.observe.push(dependency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Output and fallback flag seen for a dependency on the last call
    pub fn seen(&self, dependency: &str) -> Option<(Value, bool)> {
        self.seen.lock().get(dependency).cloned()
    }
}

#[async_trait]
impl StepExecutor for Scripted {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut seen = self.seen.lock();
            for dependency in &self.observe {
                seen.insert(
                    dependency.to_string(),
                    (ctx.output(dependency).clone(), ctx.is_fallback(dependency)),
                );
            }
        }

        match &self.behavior {
            Behavior::Succeed(output) => Ok(output.clone()),
            Behavior::Fail(reason) => Err(ServiceError::Unavailable(reason.to_string()).into()),
            Behavior::FailTimes(n, reason) if call < *n => {
                Err(ServiceError::Unavailable(reason.to_string()).into())
            }
            Behavior::FailTimes(..) => Ok(json!({ "attempt": call + 1 })),
            Behavior::Panic => panic!("scripted defect"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
            Behavior::WaitFor(gate) => {
                gate.notified().await;
                Ok(json!({ "released": true }))
            }
        }
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        self.fallback.clone()
    }
}

fn trivial(kind: EventKind) -> Pipeline {
    Pipeline::builder(kind)
        .step(StepDefinition::new("noop"), Scripted::ok(Value::Null))
        .build()
        .unwrap()
}

/// Pipelines where only the enrollment pipeline is under test
pub fn enrollment_only(builder: PipelineBuilder) -> Pipelines {
    Pipelines::new(
        builder.build().unwrap(),
        trivial(EventKind::Completion),
        trivial(EventKind::Progress),
    )
    .unwrap()
}

pub fn orchestrator(pipelines: Pipelines) -> EnrollmentOrchestrator {
    orchestrator_with(OrchestratorConfig::default(), pipelines)
}

pub fn orchestrator_with(config: OrchestratorConfig, pipelines: Pipelines) -> EnrollmentOrchestrator {
    EnrollmentOrchestrator::new(config, pipelines).unwrap()
}

pub fn enroll(orchestrator: &EnrollmentOrchestrator, user: i64, course: i64, session: &str) -> Chain {
    orchestrator.handle_enrollment(UserId(user), CourseId(course), SessionId::new(session))
}

pub async fn finish(orchestrator: &EnrollmentOrchestrator, chain: &Chain) -> Chain {
    tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.wait_for_completion(&chain.id),
    )
    .await
    .expect("chain did not finish in time")
    .expect("chain vanished from the registry")
}

/// Names of a chain's steps in recorded order
pub fn order(chain: &Chain) -> Vec<&str> {
    chain.steps.iter().map(|s| s.step_name.as_str()).collect()
}
