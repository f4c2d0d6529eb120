//! Pipelines: a validated dependency graph plus one executor per step
//!
//! A pipeline is built once at startup. Building fails if the graph is
//! invalid or if any declared step lacks an executor, so a running
//! orchestrator never meets an unschedulable step.

use crate::executor::StepExecutor;
use crate::graph::{DependencyGraph, DependencyMap};
use enrollment_types::{EventKind, OrchestratorError, OrchestratorResult, StepDefinition, StepName};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// The steps run for one event kind
pub struct Pipeline {
    kind: EventKind,
    graph: DependencyGraph,
    executors: HashMap<StepName, Arc<dyn StepExecutor>>,
}

impl Pipeline {
    pub fn builder(kind: EventKind) -> PipelineBuilder {
        PipelineBuilder::new(kind)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn executor(&self, step: &str) -> Option<&Arc<dyn StepExecutor>> {
        self.executors.get(step)
    }

    pub fn describe(&self) -> DependencyMap {
        self.graph.describe()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("kind", &self.kind)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    kind: EventKind,
    definitions: Vec<StepDefinition>,
    executors: HashMap<StepName, Arc<dyn StepExecutor>>,
}

impl PipelineBuilder {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            definitions: Vec::new(),
            executors: HashMap::new(),
        }
    }

    /// Declare a step and its executor together
    pub fn step(self, definition: StepDefinition, executor: impl StepExecutor + 'static) -> Self {
        let name = definition.name.clone();
        self.define(definition).executor(name, Arc::new(executor))
    }

    /// Declare a step without an executor
    pub fn define(mut self, definition: StepDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Attach an executor to a step name
    pub fn executor(mut self, step: impl Into<StepName>, executor: Arc<dyn StepExecutor>) -> Self {
        self.executors.insert(step.into(), executor);
        self
    }

    pub fn build(self) -> OrchestratorResult<Pipeline> {
        let kind = self.kind;
        let graph = DependencyGraph::new(self.definitions)
            .map_err(|source| OrchestratorError::Graph { kind, source })?;

        if let Some(step) = graph
            .definitions()
            .map(|d| &d.name)
            .find(|name| !self.executors.contains_key(*name))
        {
            return Err(OrchestratorError::MissingExecutor {
                kind,
                step: step.clone(),
            });
        }

        let mut undeclared: Vec<&StepName> = self
            .executors
            .keys()
            .filter(|name| !graph.contains(name.as_str()))
            .collect();
        undeclared.sort();
        if let Some(step) = undeclared.first() {
            return Err(OrchestratorError::UndeclaredExecutor {
                kind,
                step: (*step).clone(),
            });
        }

        Ok(Pipeline {
            kind,
            graph,
            executors: self.executors,
        })
    }
}

/// One pipeline per event kind
#[derive(Debug, Clone)]
pub struct Pipelines {
    enrollment: Arc<Pipeline>,
    completion: Arc<Pipeline>,
    progress: Arc<Pipeline>,
}

impl Pipelines {
    /// Bundle three pipelines, checking each is registered under its own kind
    pub fn new(
        enrollment: Pipeline,
        completion: Pipeline,
        progress: Pipeline,
    ) -> OrchestratorResult<Self> {
        Self::from_vec(vec![enrollment, completion, progress])
    }

    /// Bundle pipelines in any order; every event kind must appear exactly once
    pub fn from_vec(pipelines: Vec<Pipeline>) -> OrchestratorResult<Self> {
        let mut by_kind: BTreeMap<EventKind, Pipeline> = BTreeMap::new();
        for pipeline in pipelines {
            let kind = pipeline.kind();
            if by_kind.insert(kind, pipeline).is_some() {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "more than one pipeline configured for {} events",
                    kind
                )));
            }
        }

        let mut take = |kind: EventKind| {
            by_kind
                .remove(&kind)
                .map(Arc::new)
                .ok_or(OrchestratorError::MissingPipeline(kind))
        };
        Ok(Self {
            enrollment: take(EventKind::Enrollment)?,
            completion: take(EventKind::Completion)?,
            progress: take(EventKind::Progress)?,
        })
    }

    pub fn for_kind(&self, kind: EventKind) -> &Arc<Pipeline> {
        match kind {
            EventKind::Enrollment => &self.enrollment,
            EventKind::Completion => &self.completion,
            EventKind::Progress => &self.progress,
        }
    }

    /// Dependency map of every pipeline, keyed by event kind
    pub fn describe(&self) -> BTreeMap<EventKind, DependencyMap> {
        EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.for_kind(*kind).describe()))
            .collect()
    }
}
