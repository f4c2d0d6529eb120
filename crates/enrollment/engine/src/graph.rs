//! Dependency graph: static step set and its execution plan
//!
//! The graph is built once at startup from a set of StepDefinitions. It is
//! rejected if a step references an unknown step or if the dependency
//! relation has a cycle. A valid graph is partitioned into levels: steps in
//! one level have no dependency among themselves, and every level comes
//! strictly after all levels holding its dependencies.

use enrollment_types::{GraphError, StepDefinition, StepName};
use std::collections::{BTreeMap, HashMap};

/// Adjacency list served by the dependency-map read API: step → dependsOn
pub type DependencyMap = BTreeMap<StepName, Vec<StepName>>;

/// A validated DAG of steps
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    steps: BTreeMap<StepName, StepDefinition>,
    levels: Vec<Vec<StepName>>,
}

impl DependencyGraph {
    /// Build and validate a graph
    pub fn new(definitions: impl IntoIterator<Item = StepDefinition>) -> Result<Self, GraphError> {
        let mut steps = BTreeMap::new();
        for definition in definitions {
            let name = definition.name.clone();
            if steps.insert(name.clone(), definition).is_some() {
                return Err(GraphError::DuplicateStep(name));
            }
        }

        let mut graph = Self {
            steps,
            levels: Vec::new(),
        };
        graph.validate()?;
        graph.levels = graph.compute_levels();
        Ok(graph)
    }

    /// Check that every dependency exists and the relation is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.steps.is_empty() {
            return Err(GraphError::Empty);
        }

        for definition in self.steps.values() {
            if let Some(missing) = definition
                .depends_on
                .iter()
                .find(|dep| !self.steps.contains_key(*dep))
            {
                return Err(GraphError::UnknownDependency {
                    step: definition.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(GraphError::CyclicDependency { cycle });
        }

        Ok(())
    }

    /// Execution levels in order; steps inside a level are sorted by name
    pub fn execution_order(&self) -> &[Vec<StepName>] {
        &self.levels
    }

    /// Pure-data adjacency list (step → dependsOn)
    pub fn describe(&self) -> DependencyMap {
        self.steps
            .iter()
            .map(|(name, def)| (name.clone(), def.depends_on.iter().cloned().collect()))
            .collect()
    }

    pub fn definition(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Depth-first search with three colors; returns the first cycle found
    fn find_cycle(&self) -> Option<Vec<StepName>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit<'a>(
            name: &'a StepName,
            steps: &'a BTreeMap<StepName, StepDefinition>,
            marks: &mut HashMap<&'a StepName, Mark>,
            path: &mut Vec<&'a StepName>,
        ) -> Option<Vec<StepName>> {
            match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return None,
                Mark::InProgress => {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<StepName> =
                        path[start..].iter().map(|n| (*n).clone()).collect();
                    cycle.push(name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {}
            }

            marks.insert(name, Mark::InProgress);
            path.push(name);
            if let Some(def) = steps.get(name) {
                for dep in &def.depends_on {
                    if let Some(cycle) = visit(dep, steps, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut path = Vec::new();
        self.steps
            .keys()
            .find_map(|name| visit(name, &self.steps, &mut marks, &mut path))
    }

    /// Longest-path layering (Kahn's algorithm, one level per wave).
    /// Only called on a validated graph.
    fn compute_levels(&self) -> Vec<Vec<StepName>> {
        let mut remaining: BTreeMap<&StepName, usize> = self
            .steps
            .values()
            .map(|def| (&def.name, def.depends_on.len()))
            .collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<StepName> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(name, _)| (*name).clone())
                .collect();
            if ready.is_empty() {
                break;
            }

            for name in &ready {
                remaining.remove(name);
            }
            for def in self.steps.values() {
                let released = def.depends_on.iter().filter(|d| ready.contains(d)).count();
                if let Some(pending) = remaining.get_mut(&def.name) {
                    *pending -= released;
                }
            }

            levels.push(ready);
        }

        levels
    }
}
