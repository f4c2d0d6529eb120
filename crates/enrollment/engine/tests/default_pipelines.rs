//! Built-in course pipelines against the in-memory collaborators

use enrollment_engine::steps::services::{Curriculum, CurriculumSource, NotificationKind};
use enrollment_engine::steps::{
    ADJUST_STUDY_PLAN, CREATE_STUDY_PLAN, GENERATE_ASSIGNMENTS, GENERATE_CURRICULUM,
    INITIALIZE_MILESTONES, SEND_NOTIFICATION, SETUP_SPACED_REPETITION, UPDATE_PROGRESS_TARGETS,
};
use enrollment_engine::{EnrollmentOrchestrator, InMemoryServices, OrchestratorConfig};
use enrollment_types::{
    Chain, ChainStatus, ContentId, CourseId, EventKind, SessionId, StepName, StepStatus, UserId,
};
use serde_json::json;
use std::time::Duration;

fn setup() -> (EnrollmentOrchestrator, InMemoryServices) {
    let services = InMemoryServices::new();
    let orchestrator =
        EnrollmentOrchestrator::with_services(OrchestratorConfig::default(), services.services())
            .unwrap();
    (orchestrator, services)
}

async fn finish(orchestrator: &EnrollmentOrchestrator, chain: &Chain) -> Chain {
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_for_completion(&chain.id))
        .await
        .unwrap()
        .unwrap()
}

fn status(chain: &Chain, step: &str) -> StepStatus {
    chain.step(step).unwrap().status
}

#[tokio::test]
async fn test_enrollment_pipeline_happy_path() {
    let (orchestrator, services) = setup();
    let chain = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
    let chain = finish(&orchestrator, &chain).await;

    assert_eq!(chain.status, ChainStatus::Success);
    assert_eq!(services.assignments.assignments(UserId(7), CourseId(42)).len(), 4);
    assert_eq!(services.tracker.milestones(UserId(7), CourseId(42)).len(), 4);
    assert_eq!(
        services
            .tracker
            .review_schedule(UserId(7), CourseId(42))
            .unwrap()
            .items
            .len(),
        12
    );

    let curriculum: Curriculum =
        serde_json::from_value(chain.step(GENERATE_CURRICULUM).unwrap().output.clone()).unwrap();
    assert_eq!(curriculum.source, CurriculumSource::Generated);
}

#[tokio::test]
async fn test_curriculum_outage_fails_chain_but_notification_fires() {
    let (orchestrator, services) = setup();
    services.curriculum.set_available(false);

    let chain = orchestrator.handle_enrollment(UserId(7), CourseId(42), SessionId::new("s1"));
    let chain = finish(&orchestrator, &chain).await;

    assert_eq!(chain.status, ChainStatus::Failed);
    assert_eq!(status(&chain, GENERATE_CURRICULUM), StepStatus::HardFailure);
    for skipped in [
        CREATE_STUDY_PLAN,
        GENERATE_ASSIGNMENTS,
        SETUP_SPACED_REPETITION,
        INITIALIZE_MILESTONES,
    ] {
        assert_eq!(status(&chain, skipped), StepStatus::Skipped, "{skipped}");
    }
    assert_eq!(status(&chain, SEND_NOTIFICATION), StepStatus::Success);
    assert_eq!(services.notifications.delivered().len(), 1);

    let stats = orchestrator.get_stats();
    assert_eq!(
        stats.step_failures[&StepName::new(GENERATE_CURRICULUM)].hard_failures,
        1
    );

    // Provider recovers; re-run fills in the skipped steps without re-notifying
    services.curriculum.set_available(true);
    let rerun = orchestrator.rerun_failed_steps(&chain.id).unwrap();
    let rerun = finish(&orchestrator, &rerun).await;
    assert_eq!(rerun.status, ChainStatus::Success);
    assert!(services.study_plans.plan(UserId(7), CourseId(42)).is_some());
    assert_eq!(services.notifications.delivered().len(), 1);
}

#[tokio::test]
async fn test_assignment_outage_is_partial() {
    let (orchestrator, services) = setup();
    services.assignments.set_available(false);

    let chain = orchestrator.handle_enrollment(UserId(1), CourseId(2), SessionId::new("s"));
    let chain = finish(&orchestrator, &chain).await;

    assert_eq!(chain.status, ChainStatus::Partial);
    let assignments = chain.step(GENERATE_ASSIGNMENTS).unwrap();
    assert_eq!(assignments.status, StepStatus::SoftFailure);
    assert_eq!(assignments.output, json!([]));
    assert_eq!(status(&chain, INITIALIZE_MILESTONES), StepStatus::Success);
}

#[tokio::test]
async fn test_progress_pipeline_notifies_on_milestone_only() {
    let (orchestrator, services) = setup();
    let enrolled = orchestrator.handle_enrollment(UserId(3), CourseId(5), SessionId::new("s"));
    finish(&orchestrator, &enrolled).await;
    let after_enrollment = services.notifications.delivered().len();

    let progress = |value: f64| {
        orchestrator.handle_progress(
            UserId(3),
            CourseId(5),
            ContentId::new("lesson-1"),
            value,
            SessionId::new("s"),
        )
    };

    let small = finish(&orchestrator, &progress(10.0)).await;
    assert_eq!(small.status, ChainStatus::Success);
    assert_eq!(small.step(SEND_NOTIFICATION).unwrap().output["sent"], json!(false));
    assert_eq!(services.notifications.delivered().len(), after_enrollment);

    let big = finish(&orchestrator, &progress(60.0)).await;
    assert_eq!(big.status, ChainStatus::Success);
    assert_eq!(status(&big, ADJUST_STUDY_PLAN), StepStatus::Success);
    let delivered = services.notifications.delivered();
    assert_eq!(delivered.len(), after_enrollment + 1);
    assert!(delivered
        .iter()
        .any(|n| n.kind == NotificationKind::MilestoneReached));

    let plan = services.study_plans.plan(UserId(3), CourseId(5)).unwrap();
    assert_eq!(plan.progress_percent, 60.0);
}

#[tokio::test]
async fn test_progress_tracker_outage_skips_dependents() {
    let (orchestrator, services) = setup();
    services.tracker.set_available(false);

    let chain = orchestrator.handle_progress(
        UserId(3),
        CourseId(5),
        ContentId::new("lesson-1"),
        40.0,
        SessionId::new("s"),
    );
    let chain = finish(&orchestrator, &chain).await;

    assert_eq!(chain.status, ChainStatus::Failed);
    assert_eq!(status(&chain, UPDATE_PROGRESS_TARGETS), StepStatus::HardFailure);
    assert_eq!(status(&chain, ADJUST_STUDY_PLAN), StepStatus::Skipped);
    assert_eq!(status(&chain, SEND_NOTIFICATION), StepStatus::Skipped);
}

#[tokio::test]
async fn test_completion_pipeline() {
    let (orchestrator, services) = setup();
    let chain = orchestrator.handle_completion(UserId(9), CourseId(1), SessionId::new("s"));
    let chain = finish(&orchestrator, &chain).await;

    assert_eq!(chain.status, ChainStatus::Success);
    assert_eq!(chain.event_kind, EventKind::Completion);
    let review = services.tracker.review_schedule(UserId(9), CourseId(1)).unwrap();
    assert_eq!(review.items, vec!["final review: course 1"]);
    assert_eq!(
        services.notifications.delivered()[0].kind,
        NotificationKind::CourseCompleted
    );
}
