//! Steps run on a granular content-progress update

use super::services::{LearningTracker, ProgressUpdate, StudyPlanService};
use super::{input, UPDATE_PROGRESS_TARGETS};
use crate::executor::{StepContext, StepError, StepExecutor, StepOutcome};
use async_trait::async_trait;
use enrollment_types::ContentId;
use serde_json::{json, Value};
use std::sync::Arc;

fn progress_input(ctx: &StepContext) -> Result<(ContentId, f64), StepError> {
    let event = ctx.event();
    let content_id = event
        .content_id
        .clone()
        .ok_or_else(|| StepError::MissingInput("progress event without content_id".into()))?;
    let value = event
        .progress_value
        .ok_or_else(|| StepError::MissingInput("progress event without progress_value".into()))?;
    Ok((content_id, value))
}

/// Records the content progress and evaluates milestone targets
pub struct UpdateProgressTargets {
    tracker: Arc<dyn LearningTracker>,
}

impl UpdateProgressTargets {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for UpdateProgressTargets {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let (content_id, value) = progress_input(ctx)?;
        let event = ctx.event();
        let update = self
            .tracker
            .record_progress(event.user_id, event.course_id, &content_id, value)
            .await?;
        Ok(serde_json::to_value(update)?)
    }
}

/// Adds the touched content to the learner's review queue
///
/// Fallback: `{"items": []}`.
pub struct UpdateSpacedRepetition {
    tracker: Arc<dyn LearningTracker>,
}

impl UpdateSpacedRepetition {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for UpdateSpacedRepetition {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let (content_id, _) = progress_input(ctx)?;
        let event = ctx.event();
        let schedule = self
            .tracker
            .schedule_reviews(
                event.user_id,
                event.course_id,
                vec![content_id.as_str().to_string()],
            )
            .await?;
        Ok(serde_json::to_value(schedule)?)
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!({ "items": [] })
    }
}

/// Re-paces the study plan to the new overall progress
///
/// Fallback: `null`, plan left unchanged.
pub struct AdjustStudyPlan {
    service: Arc<dyn StudyPlanService>,
}

impl AdjustStudyPlan {
    pub fn new(service: Arc<dyn StudyPlanService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepExecutor for AdjustStudyPlan {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let update: ProgressUpdate = input(ctx, UPDATE_PROGRESS_TARGETS)?;
        let event = ctx.event();
        let plan = self
            .service
            .adjust_plan(event.user_id, event.course_id, update.overall_percent)
            .await?;
        Ok(serde_json::to_value(plan)?)
    }
}
