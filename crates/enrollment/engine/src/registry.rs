//! Chain registry: active chains, bounded history, lifetime counters
//!
//! Mutation is crate-private and funneled through the chain runner. The
//! only synchronized section on the trigger path is the dedupe-key check
//! at chain creation; no lock is ever held across an `.await`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use enrollment_types::{
    Chain, ChainId, ChainStats, ChainStatus, DedupeKey, StepFailureCounts, StepName, StepStatus,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::watch;

/// A chain that has not reached a terminal status yet
struct ActiveChain {
    snapshot: Chain,
    completion: watch::Sender<Option<Chain>>,
}

/// Outcome of registering a new chain under its dedupe key
#[derive(Debug, Clone)]
pub(crate) enum Registration {
    Registered,
    /// Another chain already holds the key
    Existing(Chain),
}

#[derive(Debug, Default)]
struct Counters {
    total_started: u64,
    completed: u64,
    success: u64,
    partial: u64,
    failed: u64,
    deduplicated: u64,
    reruns: u64,
    total_duration_ms: i64,
    step_failures: BTreeMap<StepName, StepFailureCounts>,
}

/// Process-wide store of chains
pub struct ChainRegistry {
    capacity: usize,
    active: DashMap<ChainId, ActiveChain>,
    by_key: DashMap<DedupeKey, ChainId>,
    history: RwLock<VecDeque<Chain>>,
    counters: Mutex<Counters>,
}

impl ChainRegistry {
    /// Create a registry retaining at most `capacity` terminal chains
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            active: DashMap::new(),
            by_key: DashMap::new(),
            history: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The in-flight chain holding a dedupe key, if any
    pub fn get_active(&self, key: &DedupeKey) -> Option<Chain> {
        let id = self.by_key.get(key).map(|id| id.clone())?;
        self.active
            .get(&id)
            .map(|a| a.snapshot.clone())
            .filter(|snapshot| !snapshot.is_terminal())
    }

    /// Look up a chain, active or in history
    pub fn get(&self, id: &ChainId) -> Option<Chain> {
        if let Some(active) = self.active.get(id) {
            return Some(active.snapshot.clone());
        }
        self.history.read().iter().rev().find(|c| &c.id == id).cloned()
    }

    /// Up to `limit` terminal chains, newest first
    pub fn history(&self, limit: usize) -> Vec<Chain> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> ChainStats {
        let active = self.active.len();
        let counters = self.counters.lock();
        let mean_duration_ms = if counters.completed == 0 {
            0.0
        } else {
            counters.total_duration_ms as f64 / counters.completed as f64
        };

        ChainStats {
            total_started: counters.total_started,
            active,
            completed: counters.completed,
            success: counters.success,
            partial: counters.partial,
            failed: counters.failed,
            deduplicated: counters.deduplicated,
            reruns: counters.reruns,
            mean_duration_ms,
            step_failures: counters.step_failures.clone(),
        }
    }

    /// Resolve with the terminal snapshot of a chain, or `None` if unknown
    pub async fn wait_for_completion(&self, id: &ChainId) -> Option<Chain> {
        let receiver = self.active.get(id).map(|a| a.completion.subscribe());

        match receiver {
            Some(mut rx) => {
                // Sender is dropped only after the terminal snapshot is sent
                let result = rx.wait_for(Option::is_some).await;
                match result {
                    Ok(chain) => chain.clone(),
                    Err(_) => self.get(id).filter(Chain::is_terminal),
                }
            }
            None => self.get(id).filter(Chain::is_terminal),
        }
    }

    // ── Mutation (chain runner only) ─────────────────────────────────

    /// Register a new chain unless its dedupe key is already held
    pub(crate) fn register(&self, chain: &Chain) -> Registration {
        let count_started = |rerun: bool| {
            let mut counters = self.counters.lock();
            counters.total_started += 1;
            if rerun {
                counters.reruns += 1;
            }
        };

        match self.by_key.entry(chain.dedupe_key.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = self
                    .active
                    .get(entry.get())
                    .map(|a| a.snapshot.clone())
                    .filter(|snapshot| !snapshot.is_terminal());
                match existing {
                    Some(existing) => {
                        self.counters.lock().deduplicated += 1;
                        Registration::Existing(existing)
                    }
                    None => {
                        // Key outlived its chain, or the chain is retiring; take it over
                        self.insert_active(chain);
                        entry.insert(chain.id.clone());
                        count_started(chain.rerun_of.is_some());
                        Registration::Registered
                    }
                }
            }
            Entry::Vacant(entry) => {
                self.insert_active(chain);
                entry.insert(chain.id.clone());
                count_started(chain.rerun_of.is_some());
                Registration::Registered
            }
        }
    }

    fn insert_active(&self, chain: &Chain) {
        let (completion, _) = watch::channel(None);
        self.active.insert(
            chain.id.clone(),
            ActiveChain {
                snapshot: chain.clone(),
                completion,
            },
        );
    }

    /// Replace the snapshot of an active chain
    pub(crate) fn publish(&self, chain: &Chain) {
        if let Some(mut active) = self.active.get_mut(&chain.id) {
            active.snapshot = chain.clone();
        }
    }

    /// Move a terminal chain from the active set into history.
    ///
    /// The terminal snapshot replaces the running one before the chain
    /// leaves the active set, so readers never see it running again.
    pub(crate) fn record_history(&self, chain: Chain) {
        self.publish(&chain);
        self.by_key.remove_if(&chain.dedupe_key, |_, id| id == &chain.id);

        {
            let mut counters = self.counters.lock();
            counters.completed += 1;
            match chain.status {
                ChainStatus::Success => counters.success += 1,
                ChainStatus::Partial => counters.partial += 1,
                ChainStatus::Failed => counters.failed += 1,
                ChainStatus::Pending | ChainStatus::Running => {}
            }
            counters.total_duration_ms += chain.duration_ms().unwrap_or(0).max(0);
            for step in &chain.steps {
                if step.status.is_success() {
                    continue;
                }
                let counts = counters
                    .step_failures
                    .entry(step.step_name.clone())
                    .or_default();
                match step.status {
                    StepStatus::SoftFailure => counts.soft_failures += 1,
                    StepStatus::HardFailure => counts.hard_failures += 1,
                    StepStatus::Skipped => counts.skipped += 1,
                    StepStatus::Success => {}
                }
            }
        }

        {
            let mut history = self.history.write();
            history.push_back(chain.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }

        if let Some((_, active)) = self.active.remove(&chain.id) {
            active.completion.send_replace(Some(chain));
        }
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("capacity", &self.capacity)
            .field("active", &self.active.len())
            .field("history", &self.history.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use enrollment_types::{CourseId, Event, SessionId, StepDefinition, StepResult, UserId};
    use serde_json::Value;
    use std::sync::Arc;

    fn chain(user: i64) -> Chain {
        Chain::new(&Event::enrollment(
            UserId(user),
            CourseId(42),
            SessionId::new("s"),
        ))
    }

    fn finished(mut chain: Chain, steps: Vec<StepResult>) -> Chain {
        chain.mark_running();
        for step in steps {
            chain.record_step(step);
        }
        chain.finish();
        chain
    }

    #[test]
    fn test_register_dedupes_by_key() {
        let registry = ChainRegistry::new(10);
        let first = chain(7);
        let second = chain(7);

        assert!(matches!(registry.register(&first), Registration::Registered));
        match registry.register(&second) {
            Registration::Existing(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected existing chain, got {other:?}"),
        }

        let stats = registry.stats();
        assert_eq!(stats.total_started, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(registry.get_active(&first.dedupe_key).unwrap().id, first.id);
    }

    #[test]
    fn test_key_released_after_completion() {
        let registry = ChainRegistry::new(10);
        let first = chain(7);
        registry.register(&first);
        registry.record_history(finished(first.clone(), vec![]));

        assert!(registry.get_active(&first.dedupe_key).is_none());
        assert!(matches!(registry.register(&chain(7)), Registration::Registered));
        assert_eq!(registry.get(&first.id).unwrap().status, ChainStatus::Success);
    }

    #[test]
    fn test_retiring_chain_visible_as_terminal() {
        let registry = ChainRegistry::new(10);
        let first = chain(7);
        registry.register(&first);

        // Terminal snapshot published while the chain is still in the active set
        let done = finished(first.clone(), vec![]);
        registry.publish(&done);
        assert_eq!(registry.get(&first.id).unwrap().status, ChainStatus::Success);

        // A trigger in that window starts a new chain instead of joining a finished one
        let second = chain(7);
        assert!(matches!(registry.register(&second), Registration::Registered));
        assert_eq!(registry.get_active(&second.dedupe_key).unwrap().id, second.id);

        // Retiring the first chain leaves the new holder of the key alone
        registry.record_history(done);
        assert_eq!(registry.get_active(&second.dedupe_key).unwrap().id, second.id);
        assert_eq!(registry.stats().deduplicated, 0);
    }

    #[test]
    fn test_history_bounded_newest_first() {
        let registry = ChainRegistry::new(3);
        let chains: Vec<Chain> = (0..4).map(chain).collect();
        for c in &chains {
            registry.register(c);
            registry.record_history(finished(c.clone(), vec![]));
        }

        let history = registry.history(10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, chains[3].id);
        assert!(history.iter().all(|c| c.id != chains[0].id));
        assert!(registry.get(&chains[0].id).is_none());

        let stats = registry.stats();
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.success, 4);
    }

    #[test]
    fn test_step_failures_counted() {
        let registry = ChainRegistry::new(10);
        let c = chain(1);
        registry.register(&c);

        let critical = StepDefinition::new("generate_curriculum").critical();
        let dependent = StepDefinition::new("create_study_plan").depends_on("generate_curriculum");
        let optional = StepDefinition::new("send_notification");
        let steps = vec![
            StepResult::failure(&critical, "provider down", Value::Null, Utc::now()),
            StepResult::failure(&optional, "smtp down", Value::Null, Utc::now()),
            StepResult::skipped(&dependent, &critical.name),
        ];
        registry.record_history(finished(c, steps));

        let stats = registry.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(
            stats.step_failures[&StepName::new("generate_curriculum")].hard_failures,
            1
        );
        assert_eq!(
            stats.step_failures[&StepName::new("send_notification")].soft_failures,
            1
        );
        assert_eq!(stats.step_failures[&StepName::new("create_study_plan")].skipped, 1);
    }

    #[tokio::test]
    async fn test_wait_for_completion() {
        let registry = Arc::new(ChainRegistry::new(10));
        let c = chain(1);
        registry.register(&c);

        let waiter = {
            let registry = registry.clone();
            let id = c.id.clone();
            tokio::spawn(async move { registry.wait_for_completion(&id).await })
        };
        tokio::task::yield_now().await;
        registry.record_history(finished(c.clone(), vec![]));

        let done = waiter.await.unwrap().unwrap();
        assert_eq!(done.id, c.id);
        assert!(done.is_terminal());

        // Already terminal: resolves from history
        assert!(registry.wait_for_completion(&c.id).await.is_some());
        assert!(registry.wait_for_completion(&ChainId::generate()).await.is_none());
    }
}
