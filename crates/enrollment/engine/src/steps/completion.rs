//! Steps run when a learner completes a course

use super::services::LearningTracker;
use super::{input, RECORD_COMPLETION};
use crate::executor::{StepContext, StepExecutor, StepOutcome};
use crate::steps::services::ProgressUpdate;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Marks the course complete in the learning tracker
pub struct RecordCompletion {
    tracker: Arc<dyn LearningTracker>,
}

impl RecordCompletion {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for RecordCompletion {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let event = ctx.event();
        let update = self
            .tracker
            .record_completion(event.user_id, event.course_id)
            .await?;
        Ok(serde_json::to_value(update)?)
    }
}

/// Schedules a final spaced-repetition review of the whole course
///
/// Fallback: `{"items": []}`, no review scheduled.
pub struct ScheduleFinalReview {
    tracker: Arc<dyn LearningTracker>,
}

impl ScheduleFinalReview {
    pub fn new(tracker: Arc<dyn LearningTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl StepExecutor for ScheduleFinalReview {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let update: ProgressUpdate = input(ctx, RECORD_COMPLETION)?;
        let event = ctx.event();
        let item = if update.completed {
            format!("final review: course {}", event.course_id)
        } else {
            format!("review: course {}", event.course_id)
        };
        let schedule = self
            .tracker
            .schedule_reviews(event.user_id, event.course_id, vec![item])
            .await?;
        Ok(serde_json::to_value(schedule)?)
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!({ "items": [] })
    }
}
