//! Learner notifications
//!
//! Every notification carries an idempotency key derived from the event, so
//! a re-run chain never notifies the learner twice for the same thing.

use super::services::{Notification, NotificationKind, NotificationService, ProgressUpdate};
use super::{input, UPDATE_PROGRESS_TARGETS};
use crate::executor::{StepContext, StepError, StepExecutor, StepOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Sends one kind of notification for the chain's event
///
/// Fallback: `{"sent": false}`.
pub struct SendNotification {
    service: Arc<dyn NotificationService>,
    kind: NotificationKind,
}

impl SendNotification {
    pub fn enrollment_confirmed(service: Arc<dyn NotificationService>) -> Self {
        Self {
            service,
            kind: NotificationKind::EnrollmentConfirmed,
        }
    }

    pub fn course_completed(service: Arc<dyn NotificationService>) -> Self {
        Self {
            service,
            kind: NotificationKind::CourseCompleted,
        }
    }

    /// Sends only when the progress update crossed at least one milestone
    pub fn milestone_reached(service: Arc<dyn NotificationService>) -> Self {
        Self {
            service,
            kind: NotificationKind::MilestoneReached,
        }
    }

    fn compose(&self, ctx: &StepContext) -> Result<Option<Notification>, StepError> {
        let event = ctx.event();
        let key = event.dedupe_key();

        let (subject, body, idempotency_key) = match self.kind {
            NotificationKind::EnrollmentConfirmed => (
                "You're enrolled".to_string(),
                format!(
                    "Your personalised plan for course {} is being prepared.",
                    event.course_id
                ),
                key.to_string(),
            ),
            NotificationKind::CourseCompleted => (
                "Course completed".to_string(),
                format!("Congratulations on completing course {}!", event.course_id),
                key.to_string(),
            ),
            NotificationKind::MilestoneReached => {
                let update: ProgressUpdate = input(ctx, UPDATE_PROGRESS_TARGETS)?;
                if update.milestones_reached.is_empty() {
                    return Ok(None);
                }
                let reached = update.milestones_reached.join(", ");
                (
                    "Milestone reached".to_string(),
                    format!(
                        "You reached {} in course {} ({:.0}% complete).",
                        reached, event.course_id, update.overall_percent
                    ),
                    format!("{}:{}", key, update.milestones_reached.join("+")),
                )
            }
        };

        Ok(Some(Notification {
            user_id: event.user_id,
            course_id: event.course_id,
            kind: self.kind,
            subject,
            body,
            idempotency_key,
        }))
    }
}

#[async_trait]
impl StepExecutor for SendNotification {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let Some(notification) = self.compose(ctx)? else {
            return Ok(json!({ "sent": false, "reason": "no milestone reached" }));
        };
        let receipt = self.service.send(notification).await?;
        Ok(json!({
            "sent": !receipt.duplicate,
            "receipt": receipt,
        }))
    }

    fn fallback_output(&self, _ctx: &StepContext) -> Value {
        json!({ "sent": false })
    }
}
