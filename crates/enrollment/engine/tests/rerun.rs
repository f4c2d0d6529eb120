//! Manual re-run of failed steps

mod common;

use common::*;
use enrollment_engine::Pipeline;
use enrollment_types::{ChainStatus, EventKind, OrchestratorError, StepDefinition, StepStatus};
use serde_json::json;

#[tokio::test]
async fn test_rerun_replays_only_unsuccessful_steps() {
    let curriculum = Scripted::ok(json!({"modules": 4}));
    let plan = Scripted::new(Behavior::FailTimes(1, "plan store down")).observing("curriculum");
    let milestones = Scripted::ok(json!(["quarter"]));
    let orchestrator = orchestrator(enrollment_only(
        Pipeline::builder(EventKind::Enrollment)
            .step(StepDefinition::new("curriculum").critical(), curriculum.clone())
            .step(
                StepDefinition::new("plan").critical().depends_on("curriculum"),
                plan.clone(),
            )
            .step(
                StepDefinition::new("milestones").depends_on("plan"),
                milestones.clone(),
            ),
    ));

    let original = finish(&orchestrator, &enroll(&orchestrator, 7, 42, "s1")).await;
    assert_eq!(original.status, ChainStatus::Failed);
    assert_eq!(original.step("milestones").unwrap().status, StepStatus::Skipped);

    let rerun = orchestrator.rerun_failed_steps(&original.id).unwrap();
    assert_ne!(rerun.id, original.id);
    assert_eq!(rerun.rerun_of.as_ref(), Some(&original.id));
    assert_eq!(rerun.dedupe_key, original.dedupe_key);

    let rerun = finish(&orchestrator, &rerun).await;
    assert_eq!(rerun.status, ChainStatus::Success);
    assert_eq!(order(&rerun), vec!["curriculum", "plan", "milestones"]);

    // Successful step carried over verbatim, not executed again
    assert_eq!(curriculum.calls(), 1);
    assert_eq!(rerun.step("curriculum"), original.step("curriculum"));
    assert_eq!(plan.calls(), 2);
    assert_eq!(milestones.calls(), 1);
    assert_eq!(plan.seen("curriculum"), Some((json!({"modules": 4}), false)));

    // Original stays untouched in history
    let original_again = orchestrator.get_chain_status(&original.id).unwrap();
    assert_eq!(original_again, original);

    let stats = orchestrator.get_stats();
    assert_eq!(stats.reruns, 1);
    assert_eq!(stats.total_started, 2);
}

#[tokio::test]
async fn test_soft_failed_step_replayed() {
    let notify = Scripted::new(Behavior::FailTimes(1, "smtp down"));
    let orchestrator = orchestrator(enrollment_only(
        Pipeline::builder(EventKind::Enrollment)
            .step(StepDefinition::new("work"), Scripted::ok(json!(1)))
            .step(StepDefinition::new("notify"), notify.clone()),
    ));

    let original = finish(&orchestrator, &enroll(&orchestrator, 1, 1, "s")).await;
    assert_eq!(original.status, ChainStatus::Partial);

    let rerun = orchestrator.rerun_failed_steps(&original.id).unwrap();
    let rerun = finish(&orchestrator, &rerun).await;
    assert_eq!(rerun.status, ChainStatus::Success);
    assert_eq!(notify.calls(), 2);
}

#[tokio::test]
async fn test_rerun_rejected_for_success_and_running_chains() {
    let gate = std::sync::Arc::new(tokio::sync::Notify::new());
    let orchestrator = orchestrator(enrollment_only(
        Pipeline::builder(EventKind::Enrollment)
            .step(StepDefinition::new("wait"), Scripted::new(Behavior::WaitFor(gate.clone()))),
    ));

    let running = enroll(&orchestrator, 1, 1, "s");
    let err = orchestrator.rerun_failed_steps(&running.id).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::NotRerunnable {
            status: ChainStatus::Running,
            ..
        }
    ));

    gate.notify_one();
    let done = finish(&orchestrator, &running).await;
    let err = orchestrator.rerun_failed_steps(&done.id).unwrap_err();
    assert!(matches!(err, OrchestratorError::NotRerunnable { .. }));
}
