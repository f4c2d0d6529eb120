//! Collaborator boundaries consumed by the built-in steps
//!
//! Each service is a narrow "perform action, report outcome" contract. The
//! real implementations (LLM-backed curriculum generation, the study-plan
//! store, the mailer) live outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollment_types::{ContentId, CourseId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collaborator failure modes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("upstream timeout: {0}")]
    Timeout(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Result type for collaborator calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// ── Curriculum ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurriculumSource {
    /// Produced by the generation provider
    Generated,
    /// Static template used when generation is unavailable
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumModule {
    pub title: String,
    pub lessons: Vec<String>,
    pub estimated_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    pub course_id: CourseId,
    pub modules: Vec<CurriculumModule>,
    pub source: CurriculumSource,
}

impl Curriculum {
    /// Template curriculum used when generation fails
    pub fn default_for(course_id: CourseId) -> Self {
        let module = |title: &str, lessons: &[&str]| CurriculumModule {
            title: title.to_string(),
            lessons: lessons.iter().map(|l| l.to_string()).collect(),
            estimated_hours: 2,
        };
        Self {
            course_id,
            modules: vec![
                module("Foundations", &["Overview", "Core concepts"]),
                module("Practice", &["Guided exercises"]),
                module("Review", &["Recap"]),
            ],
            source: CurriculumSource::Default,
        }
    }

    pub fn lesson_titles(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|m| m.lessons.iter().cloned())
            .collect()
    }

    pub fn total_hours(&self) -> u32 {
        self.modules.iter().map(|m| m.estimated_hours).sum()
    }
}

#[async_trait]
pub trait CurriculumService: Send + Sync {
    async fn generate(&self, user_id: UserId, course_id: CourseId) -> ServiceResult<Curriculum>;
}

// ── Study Plans ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub plan_id: String,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub weeks: u32,
    pub weekly_hours: u32,
    pub progress_percent: f64,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait StudyPlanService: Send + Sync {
    /// Create the plan for an enrollment; repeated calls return the same plan
    async fn create_plan(
        &self,
        user_id: UserId,
        course_id: CourseId,
        curriculum: &Curriculum,
    ) -> ServiceResult<StudyPlan>;

    /// Re-pace an existing plan to the learner's progress
    async fn adjust_plan(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress_percent: f64,
    ) -> ServiceResult<StudyPlan>;
}

// ── Assignments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub title: String,
    pub module: String,
    pub due_in_days: u32,
}

#[async_trait]
pub trait AssignmentService: Send + Sync {
    async fn schedule_assignments(
        &self,
        user_id: UserId,
        course_id: CourseId,
        curriculum: &Curriculum,
    ) -> ServiceResult<Vec<Assignment>>;
}

// ── Milestones, targets and spaced repetition ───────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub target_percent: f64,
    /// Study plan week by which the target is due; absent without a plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_week: Option<u32>,
    pub reached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub overall_percent: f64,
    /// Milestones crossed by this update (never repeated by later updates)
    pub milestones_reached: Vec<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub items: Vec<String>,
    pub first_review_at: DateTime<Utc>,
    pub interval_days: Vec<u32>,
}

#[async_trait]
pub trait LearningTracker: Send + Sync {
    async fn initialize_milestones(
        &self,
        user_id: UserId,
        course_id: CourseId,
        plan: Option<&StudyPlan>,
    ) -> ServiceResult<Vec<Milestone>>;

    async fn record_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        content_id: &ContentId,
        progress_percent: f64,
    ) -> ServiceResult<ProgressUpdate>;

    async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ServiceResult<ProgressUpdate>;

    async fn schedule_reviews(
        &self,
        user_id: UserId,
        course_id: CourseId,
        items: Vec<String>,
    ) -> ServiceResult<ReviewSchedule>;
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EnrollmentConfirmed,
    CourseCompleted,
    MilestoneReached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    /// Identical tokens are delivered at most once
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub notification_id: String,
    pub delivered_at: DateTime<Utc>,
    /// True when the idempotency key had already been delivered
    pub duplicate: bool,
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, notification: Notification) -> ServiceResult<NotificationReceipt>;
}
