//! Built-in course steps and the default pipelines
//!
//! Steps are thin adapters over the collaborator traits in [`services`]:
//! they read the event and their dependencies' outputs from the
//! [`StepContext`], call one service, and return the service's record as
//! JSON. Each step documents the fallback its dependents see when it
//! soft-fails.

pub mod completion;
pub mod enrollment;
pub mod memory;
pub mod notification;
pub mod progress;
pub mod services;

pub use memory::{
    InMemoryAssignmentService, InMemoryCurriculumService, InMemoryLearningTracker,
    InMemoryNotificationService, InMemoryStudyPlanService,
};
pub use services::{
    AssignmentService, CurriculumService, LearningTracker, NotificationService, ServiceError,
    ServiceResult, StudyPlanService,
};

use crate::executor::{StepContext, StepError};
use crate::pipeline::{Pipeline, Pipelines};
use enrollment_types::{EventKind, OrchestratorResult, StepDefinition};
use serde::de::DeserializeOwned;
use std::sync::Arc;

// ── Step names ───────────────────────────────────────────────────────

pub const GENERATE_CURRICULUM: &str = "generate_curriculum";
pub const CREATE_STUDY_PLAN: &str = "create_study_plan";
pub const GENERATE_ASSIGNMENTS: &str = "generate_assignments";
pub const SETUP_SPACED_REPETITION: &str = "setup_spaced_repetition";
pub const INITIALIZE_MILESTONES: &str = "initialize_milestones";
pub const SEND_NOTIFICATION: &str = "send_notification";
pub const RECORD_COMPLETION: &str = "record_completion";
pub const SCHEDULE_FINAL_REVIEW: &str = "schedule_final_review";
pub const UPDATE_PROGRESS_TARGETS: &str = "update_progress_targets";
pub const UPDATE_SPACED_REPETITION: &str = "update_spaced_repetition";
pub const ADJUST_STUDY_PLAN: &str = "adjust_study_plan";

/// Decode a dependency's output into the record type it produced
pub(crate) fn input<T: DeserializeOwned>(ctx: &StepContext, step: &str) -> Result<T, StepError> {
    let value = ctx.output(step);
    if value.is_null() {
        return Err(StepError::MissingInput(format!("no output from '{}'", step)));
    }
    Ok(serde_json::from_value(value.clone())?)
}

// ── Collaborators ────────────────────────────────────────────────────

/// The external services the built-in steps call
#[derive(Clone)]
pub struct Services {
    pub curriculum: Arc<dyn CurriculumService>,
    pub study_plans: Arc<dyn StudyPlanService>,
    pub assignments: Arc<dyn AssignmentService>,
    pub tracker: Arc<dyn LearningTracker>,
    pub notifications: Arc<dyn NotificationService>,
}

impl Services {
    /// Services backed by fresh in-memory implementations
    pub fn in_memory() -> Self {
        InMemoryServices::new().services()
    }
}

/// Concrete in-memory collaborators, kept typed so callers can inspect
/// records and toggle outages
#[derive(Debug, Clone, Default)]
pub struct InMemoryServices {
    pub curriculum: Arc<InMemoryCurriculumService>,
    pub study_plans: Arc<InMemoryStudyPlanService>,
    pub assignments: Arc<InMemoryAssignmentService>,
    pub tracker: Arc<InMemoryLearningTracker>,
    pub notifications: Arc<InMemoryNotificationService>,
}

impl InMemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Services {
        Services {
            curriculum: self.curriculum.clone(),
            study_plans: self.study_plans.clone(),
            assignments: self.assignments.clone(),
            tracker: self.tracker.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

// ── Default pipelines ────────────────────────────────────────────────

/// Pipelines for all three event kinds wired to `services`
pub fn default_pipelines(services: &Services) -> OrchestratorResult<Pipelines> {
    Pipelines::new(
        enrollment_pipeline(services)?,
        completion_pipeline(services)?,
        progress_pipeline(services)?,
    )
}

pub fn enrollment_pipeline(services: &Services) -> OrchestratorResult<Pipeline> {
    Pipeline::builder(EventKind::Enrollment)
        .step(
            StepDefinition::new(GENERATE_CURRICULUM).critical(),
            enrollment::GenerateCurriculum::new(services.curriculum.clone()),
        )
        .step(
            StepDefinition::new(CREATE_STUDY_PLAN)
                .critical()
                .depends_on(GENERATE_CURRICULUM),
            enrollment::CreateStudyPlan::new(services.study_plans.clone()),
        )
        .step(
            StepDefinition::new(GENERATE_ASSIGNMENTS).depends_on(GENERATE_CURRICULUM),
            enrollment::GenerateAssignments::new(services.assignments.clone()),
        )
        .step(
            StepDefinition::new(SETUP_SPACED_REPETITION).depends_on(GENERATE_CURRICULUM),
            enrollment::SetupSpacedRepetition::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(INITIALIZE_MILESTONES).depends_on(CREATE_STUDY_PLAN),
            enrollment::InitializeMilestones::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(SEND_NOTIFICATION),
            notification::SendNotification::enrollment_confirmed(services.notifications.clone()),
        )
        .build()
}

pub fn completion_pipeline(services: &Services) -> OrchestratorResult<Pipeline> {
    Pipeline::builder(EventKind::Completion)
        .step(
            StepDefinition::new(RECORD_COMPLETION).critical(),
            completion::RecordCompletion::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(SCHEDULE_FINAL_REVIEW).depends_on(RECORD_COMPLETION),
            completion::ScheduleFinalReview::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(SEND_NOTIFICATION),
            notification::SendNotification::course_completed(services.notifications.clone()),
        )
        .build()
}

pub fn progress_pipeline(services: &Services) -> OrchestratorResult<Pipeline> {
    Pipeline::builder(EventKind::Progress)
        .step(
            StepDefinition::new(UPDATE_PROGRESS_TARGETS).critical(),
            progress::UpdateProgressTargets::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(UPDATE_SPACED_REPETITION),
            progress::UpdateSpacedRepetition::new(services.tracker.clone()),
        )
        .step(
            StepDefinition::new(ADJUST_STUDY_PLAN).depends_on(UPDATE_PROGRESS_TARGETS),
            progress::AdjustStudyPlan::new(services.study_plans.clone()),
        )
        .step(
            StepDefinition::new(SEND_NOTIFICATION).depends_on(UPDATE_PROGRESS_TARGETS),
            notification::SendNotification::milestone_reached(services.notifications.clone()),
        )
        .build()
}
