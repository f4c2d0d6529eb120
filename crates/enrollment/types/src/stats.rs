//! Aggregate statistics over all chains seen by a registry

use crate::StepName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifetime failure counters for one step name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailureCounts {
    pub soft_failures: u64,
    pub hard_failures: u64,
    pub skipped: u64,
}

/// Aggregate counters. Lifetime values; history eviction never lowers them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    /// Chains ever created (duplicates suppressed by dedupe are not counted)
    pub total_started: u64,
    /// Chains currently in flight
    pub active: usize,
    /// Chains that reached a terminal status
    pub completed: u64,
    pub success: u64,
    pub partial: u64,
    pub failed: u64,
    /// Triggers answered with an already-running chain
    pub deduplicated: u64,
    /// Chains created by a manual re-run
    pub reruns: u64,
    /// Mean wall-clock duration of completed chains
    pub mean_duration_ms: f64,
    /// Failure counters per step name; steps that never failed are absent
    pub step_failures: BTreeMap<StepName, StepFailureCounts>,
}
