//! Steps run when a learner enrolls in a course

use super::services::{
    AssignmentService, Curriculum, CurriculumService, LearningTracker, StudyPlan,
    StudyPlanService,
};
use super::{input, CREATE_STUDY_PLAN, GENERATE_CURRICULUM};
use crate::executor::{StepContext, StepExecutor, StepOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Generates the learner's curriculum
///
/// Fallback: the course's template curriculum ([`Curriculum::default_for`]).
pub struct GenerateCurriculum {
    service: Arc<dyn CurriculumService>,
}

impl GenerateCurriculum {
    pub fn new(service: Arc<dyn CurriculumService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepExecutor for GenerateCurriculum {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let event = ctx.event();
        let curriculum = self.service.generate(event.user_id, event.course_id).await?;
        Ok(serde_json::to_value(curriculum)?)
    }

    fn fallback_output(&self, ctx: &StepContext) -> Value {
        serde_json::to_value(Curriculum::default_for(ctx.event().course_id)).unwrap_or(Value::Null)
    }
}

/// Creates the study plan from the curriculum
///
/// Fallback: `null` (dependents treat the plan as absent).
pub struct CreateStudyPlan {
    service: Arc<dyn StudyPlanService>,
}

impl CreateStudyPlan {
    pub fn new(service: Arc<dyn StudyPlanService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepExecutor for CreateStudyPlan {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let curriculum: Curriculum = input(ctx, GENERATE_CURRICULUM)?;
        let event = ctx.event();
        let plan = self
            .service
            .create_plan(event.user_id, event.course_id, &curriculum)
            .await?;
        Ok(serde_json::to_value(plan)?)
    }
}

/// Schedules one assignment per curriculum module
///
/// Fallback: an empty assignment list.
pub struct GenerateAssignments {
    service: Arc<dyn AssignmentService>,
}

impl GenerateAssignments {
    pub fn new(service: Arc<dyn AssignmentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepExecutor for GenerateAssignments {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let curriculum: Curriculum = input(ctx, GENERATE_CURRICULUM)?;
        let event = ctx.event();
        let assignments = self
            .service
            .schedule_assignments(event.user_id, event.course_id, &curriculum)
            .await?;
        Ok(serde_json::to_value(assignments)?)
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!([])
    }
}

/// Registers every lesson for spaced-repetition review
///
/// Fallback: `{"items": []}`, nothing scheduled.
pub struct SetupSpacedRepetition {
    tracker: Arc<dyn LearningTracker>,
}

impl SetupSpacedRepetition {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for SetupSpacedRepetition {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let curriculum: Curriculum = input(ctx, GENERATE_CURRICULUM)?;
        let event = ctx.event();
        let schedule = self
            .tracker
            .schedule_reviews(event.user_id, event.course_id, curriculum.lesson_titles())
            .await?;
        Ok(serde_json::to_value(schedule)?)
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!({ "items": [] })
    }
}

/// Creates progress milestones, paced by the study plan when one exists
///
/// Fallback: an empty milestone list.
pub struct InitializeMilestones {
    tracker: Arc<dyn LearningTracker>,
}

impl InitializeMilestones {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for InitializeMilestones {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let plan: Option<StudyPlan> = if ctx.is_fallback(CREATE_STUDY_PLAN) {
            None
        } else {
            Some(input(ctx, CREATE_STUDY_PLAN)?)
        };
        let event = ctx.event();
        let milestones = self
            .tracker
            .initialize_milestones(event.user_id, event.course_id, plan.as_ref())
            .await?;
        Ok(serde_json::to_value(milestones)?)
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!([])
    }
}
