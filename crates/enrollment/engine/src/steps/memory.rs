//! In-memory collaborator implementations for development and testing
//!
//! Every service is idempotency-guarded by `(user, course)` (or by the
//! notification idempotency key) and can be switched unavailable to
//! simulate an outage of the external dependency.

use super::services::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use enrollment_types::{ContentId, CourseId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type Key = (UserId, CourseId);

/// Milestone thresholds tracked for every enrollment
const MILESTONE_THRESHOLDS: [(&str, f64); 4] = [
    ("quarter", 25.0),
    ("halfway", 50.0),
    ("three_quarters", 75.0),
    ("complete", 100.0),
];

/// Review intervals (days) for spaced repetition
const REVIEW_INTERVALS: [u32; 4] = [1, 3, 7, 14];

/// Outage switch shared by the in-memory services
#[derive(Debug)]
struct Availability {
    service: &'static str,
    available: AtomicBool,
}

impl Availability {
    fn new(service: &'static str) -> Self {
        Self {
            service,
            available: AtomicBool::new(true),
        }
    }

    fn set(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> ServiceResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServiceError::Unavailable(format!("{} is offline", self.service)))
        }
    }
}

// ── Curriculum ───────────────────────────────────────────────────────

/// Deterministic curriculum generator, cached per enrollment
#[derive(Debug)]
pub struct InMemoryCurriculumService {
    availability: Availability,
    generated: DashMap<Key, Curriculum>,
    calls: AtomicU64,
}

impl InMemoryCurriculumService {
    pub fn new() -> Self {
        Self {
            availability: Availability::new("curriculum provider"),
            generated: DashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.availability.set(available);
    }

    /// Number of generation requests received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryCurriculumService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CurriculumService for InMemoryCurriculumService {
    async fn generate(&self, user_id: UserId, course_id: CourseId) -> ServiceResult<Curriculum> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.availability.check()?;

        let curriculum = self
            .generated
            .entry((user_id, course_id))
            .or_insert_with(|| Curriculum {
                course_id,
                modules: (1..=4)
                    .map(|i| CurriculumModule {
                        title: format!("Course {} - Module {}", course_id, i),
                        lessons: (1..=3)
                            .map(|j| format!("Lesson {}.{}", i, j))
                            .collect(),
                        estimated_hours: 3,
                    })
                    .collect(),
                source: CurriculumSource::Generated,
            })
            .clone();
        Ok(curriculum)
    }
}

// ── Study Plans ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryStudyPlanService {
    availability: Availability,
    plans: DashMap<Key, StudyPlan>,
}

impl InMemoryStudyPlanService {
    pub fn new() -> Self {
        Self {
            availability: Availability::new("study plan store"),
            plans: DashMap::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.availability.set(available);
    }

    pub fn plan(&self, user_id: UserId, course_id: CourseId) -> Option<StudyPlan> {
        self.plans.get(&(user_id, course_id)).map(|p| p.clone())
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }
}

impl Default for InMemoryStudyPlanService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StudyPlanService for InMemoryStudyPlanService {
    async fn create_plan(
        &self,
        user_id: UserId,
        course_id: CourseId,
        curriculum: &Curriculum,
    ) -> ServiceResult<StudyPlan> {
        self.availability.check()?;

        let weekly_hours = 5;
        let weeks = curriculum.total_hours().div_ceil(weekly_hours).max(1);
        let plan = self
            .plans
            .entry((user_id, course_id))
            .or_insert_with(|| StudyPlan {
                plan_id: format!("plan-{}-{}", user_id, course_id),
                user_id,
                course_id,
                weeks,
                weekly_hours,
                progress_percent: 0.0,
                updated_at: Utc::now(),
            })
            .clone();
        Ok(plan)
    }

    async fn adjust_plan(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress_percent: f64,
    ) -> ServiceResult<StudyPlan> {
        self.availability.check()?;

        let mut plan = self.plans.get_mut(&(user_id, course_id)).ok_or_else(|| {
            ServiceError::Rejected(format!(
                "no study plan for user {} in course {}",
                user_id, course_id
            ))
        })?;
        plan.progress_percent = progress_percent;
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }
}

// ── Assignments ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryAssignmentService {
    availability: Availability,
    scheduled: DashMap<Key, Vec<Assignment>>,
}

impl InMemoryAssignmentService {
    pub fn new() -> Self {
        Self {
            availability: Availability::new("assignment generator"),
            scheduled: DashMap::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.availability.set(available);
    }

    pub fn assignments(&self, user_id: UserId, course_id: CourseId) -> Vec<Assignment> {
        self.scheduled
            .get(&(user_id, course_id))
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryAssignmentService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssignmentService for InMemoryAssignmentService {
    async fn schedule_assignments(
        &self,
        user_id: UserId,
        course_id: CourseId,
        curriculum: &Curriculum,
    ) -> ServiceResult<Vec<Assignment>> {
        self.availability.check()?;

        let assignments = self
            .scheduled
            .entry((user_id, course_id))
            .or_insert_with(|| {
                curriculum
                    .modules
                    .iter()
                    .enumerate()
                    .map(|(i, module)| Assignment {
                        assignment_id: format!("asg-{}-{}-{}", user_id, course_id, i + 1),
                        title: format!("{} assignment", module.title),
                        module: module.title.clone(),
                        due_in_days: 7 * (i as u32 + 1),
                    })
                    .collect()
            })
            .clone();
        Ok(assignments)
    }
}

// ── Learning Tracker ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Progress {
    by_content: BTreeMap<ContentId, f64>,
    reached: BTreeSet<String>,
    completed: bool,
}

impl Progress {
    fn overall(&self) -> f64 {
        if self.completed {
            return 100.0;
        }
        if self.by_content.is_empty() {
            return 0.0;
        }
        self.by_content.values().sum::<f64>() / self.by_content.len() as f64
    }

    /// Mark newly crossed thresholds and return their names
    fn cross_milestones(&mut self) -> Vec<String> {
        let overall = self.overall();
        MILESTONE_THRESHOLDS
            .iter()
            .filter(|(_, target)| overall >= *target)
            .filter_map(|(name, _)| {
                self.reached
                    .insert(name.to_string())
                    .then(|| name.to_string())
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct InMemoryLearningTracker {
    availability: Availability,
    milestones: DashMap<Key, Vec<Milestone>>,
    progress: DashMap<Key, Progress>,
    reviews: DashMap<Key, ReviewSchedule>,
}

impl InMemoryLearningTracker {
    pub fn new() -> Self {
        Self {
            availability: Availability::new("learning tracker"),
            milestones: DashMap::new(),
            progress: DashMap::new(),
            reviews: DashMap::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.availability.set(available);
    }

    pub fn milestones(&self, user_id: UserId, course_id: CourseId) -> Vec<Milestone> {
        self.milestones
            .get(&(user_id, course_id))
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn review_schedule(&self, user_id: UserId, course_id: CourseId) -> Option<ReviewSchedule> {
        self.reviews.get(&(user_id, course_id)).map(|r| r.clone())
    }
}

impl Default for InMemoryLearningTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// First plan week by whose end `target_percent` of the course is covered
fn due_week(weeks: u32, target_percent: f64) -> u32 {
    ((f64::from(weeks) * target_percent / 100.0).ceil() as u32).clamp(1, weeks.max(1))
}

#[async_trait]
impl LearningTracker for InMemoryLearningTracker {
    async fn initialize_milestones(
        &self,
        user_id: UserId,
        course_id: CourseId,
        plan: Option<&StudyPlan>,
    ) -> ServiceResult<Vec<Milestone>> {
        self.availability.check()?;

        let milestones = self
            .milestones
            .entry((user_id, course_id))
            .or_insert_with(|| {
                MILESTONE_THRESHOLDS
                    .iter()
                    .map(|(name, target)| Milestone {
                        name: name.to_string(),
                        target_percent: *target,
                        due_week: plan.map(|plan| due_week(plan.weeks, *target)),
                        reached: false,
                    })
                    .collect()
            })
            .clone();
        Ok(milestones)
    }

    async fn record_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        content_id: &ContentId,
        progress_percent: f64,
    ) -> ServiceResult<ProgressUpdate> {
        self.availability.check()?;
        if !progress_percent.is_finite() || !(0.0..=100.0).contains(&progress_percent) {
            return Err(ServiceError::Rejected(format!(
                "progress must be within 0..=100, got {}",
                progress_percent
            )));
        }

        let mut progress = self.progress.entry((user_id, course_id)).or_default();
        let current = progress.by_content.entry(content_id.clone()).or_insert(0.0);
        // Progress never moves backwards
        *current = current.max(progress_percent);
        let milestones_reached = progress.cross_milestones();

        if let Some(mut milestones) = self.milestones.get_mut(&(user_id, course_id)) {
            for milestone in milestones.iter_mut() {
                milestone.reached = progress.reached.contains(&milestone.name);
            }
        }

        Ok(ProgressUpdate {
            overall_percent: progress.overall(),
            milestones_reached,
            completed: progress.completed,
        })
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ServiceResult<ProgressUpdate> {
        self.availability.check()?;

        let mut progress = self.progress.entry((user_id, course_id)).or_default();
        progress.completed = true;
        let milestones_reached = progress.cross_milestones();

        if let Some(mut milestones) = self.milestones.get_mut(&(user_id, course_id)) {
            for milestone in milestones.iter_mut() {
                milestone.reached = true;
            }
        }

        Ok(ProgressUpdate {
            overall_percent: 100.0,
            milestones_reached,
            completed: true,
        })
    }

    async fn schedule_reviews(
        &self,
        user_id: UserId,
        course_id: CourseId,
        items: Vec<String>,
    ) -> ServiceResult<ReviewSchedule> {
        self.availability.check()?;

        let mut schedule = self
            .reviews
            .entry((user_id, course_id))
            .or_insert_with(|| ReviewSchedule {
                items: Vec::new(),
                first_review_at: Utc::now() + ChronoDuration::days(REVIEW_INTERVALS[0] as i64),
                interval_days: REVIEW_INTERVALS.to_vec(),
            });
        for item in items {
            if !schedule.items.contains(&item) {
                schedule.items.push(item);
            }
        }
        Ok(schedule.clone())
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryNotificationService {
    availability: Availability,
    delivered: DashMap<String, (Notification, NotificationReceipt)>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self {
            availability: Availability::new("notification gateway"),
            delivered: DashMap::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.availability.set(available);
    }

    /// Notifications delivered so far (one per idempotency key)
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.iter().map(|e| e.value().0.clone()).collect()
    }
}

impl Default for InMemoryNotificationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send(&self, notification: Notification) -> ServiceResult<NotificationReceipt> {
        self.availability.check()?;

        match self.delivered.entry(notification.idempotency_key.clone()) {
            Entry::Occupied(existing) => Ok(NotificationReceipt {
                duplicate: true,
                ..existing.get().1.clone()
            }),
            Entry::Vacant(slot) => {
                let receipt = NotificationReceipt {
                    notification_id: uuid::Uuid::new_v4().to_string(),
                    delivered_at: Utc::now(),
                    duplicate: false,
                };
                slot.insert((notification, receipt.clone()));
                Ok(receipt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_curriculum_is_idempotent_per_enrollment() {
        let service = InMemoryCurriculumService::new();
        let first = service.generate(UserId(1), CourseId(2)).await.unwrap();
        let second = service.generate(UserId(1), CourseId(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.source, CurriculumSource::Generated);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_outage_reports_unavailable() {
        let service = InMemoryCurriculumService::new();
        service.set_available(false);
        let err = service.generate(UserId(1), CourseId(2)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_study_plan_created_once_and_adjusted() {
        let service = InMemoryStudyPlanService::new();
        let curriculum = Curriculum::default_for(CourseId(2));
        let plan = service
            .create_plan(UserId(1), CourseId(2), &curriculum)
            .await
            .unwrap();
        let again = service
            .create_plan(UserId(1), CourseId(2), &curriculum)
            .await
            .unwrap();
        assert_eq!(plan.plan_id, again.plan_id);
        assert_eq!(service.plan_count(), 1);

        let adjusted = service.adjust_plan(UserId(1), CourseId(2), 40.0).await.unwrap();
        assert_eq!(adjusted.progress_percent, 40.0);
    }

    #[tokio::test]
    async fn test_adjust_without_plan_rejected() {
        let service = InMemoryStudyPlanService::new();
        let err = service.adjust_plan(UserId(1), CourseId(2), 10.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[test]
    fn test_due_week_paced_by_plan_length() {
        assert_eq!(due_week(8, 25.0), 2);
        assert_eq!(due_week(8, 100.0), 8);
        assert_eq!(due_week(3, 25.0), 1);
        assert_eq!(due_week(0, 50.0), 1);
    }

    #[tokio::test]
    async fn test_milestones_reached_once() {
        let tracker = InMemoryLearningTracker::new();
        tracker
            .initialize_milestones(UserId(1), CourseId(2), None)
            .await
            .unwrap();

        let update = tracker
            .record_progress(UserId(1), CourseId(2), &ContentId::new("l1"), 60.0)
            .await
            .unwrap();
        assert_eq!(update.milestones_reached, vec!["quarter", "halfway"]);

        let repeat = tracker
            .record_progress(UserId(1), CourseId(2), &ContentId::new("l1"), 55.0)
            .await
            .unwrap();
        assert!(repeat.milestones_reached.is_empty());
        assert_eq!(repeat.overall_percent, 60.0);

        let reached: Vec<_> = tracker
            .milestones(UserId(1), CourseId(2))
            .into_iter()
            .filter(|m| m.reached)
            .map(|m| m.name)
            .collect();
        assert_eq!(reached, vec!["quarter", "halfway"]);
    }

    #[tokio::test]
    async fn test_out_of_range_progress_rejected() {
        let tracker = InMemoryLearningTracker::new();
        let err = tracker
            .record_progress(UserId(1), CourseId(2), &ContentId::new("l1"), 140.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_notification_delivered_once_per_key() {
        let service = InMemoryNotificationService::new();
        let notification = Notification {
            user_id: UserId(1),
            course_id: CourseId(2),
            kind: NotificationKind::EnrollmentConfirmed,
            subject: "Welcome".into(),
            body: "Hello".into(),
            idempotency_key: "enrollment:1:2".into(),
        };
        let first = service.send(notification.clone()).await.unwrap();
        let second = service.send(notification).await.unwrap();
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.notification_id, second.notification_id);
        assert_eq!(service.delivered().len(), 1);
    }

    #[test]
    fn test_concurrent_sends_deliver_once() {
        const SENDERS: usize = 8;
        let service = Arc::new(InMemoryNotificationService::new());
        let barrier = Arc::new(std::sync::Barrier::new(SENDERS));

        let handles: Vec<_> = (0..SENDERS)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let notification = Notification {
                        user_id: UserId(1),
                        course_id: CourseId(2),
                        kind: NotificationKind::CourseCompleted,
                        subject: "Congratulations".into(),
                        body: "Done".into(),
                        idempotency_key: "completion:1:2".into(),
                    };
                    barrier.wait();
                    futures::executor::block_on(service.send(notification)).unwrap()
                })
            })
            .collect();
        let receipts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(receipts.iter().filter(|r| !r.duplicate).count(), 1);
        assert!(receipts
            .iter()
            .all(|r| r.notification_id == receipts[0].notification_id));
        assert_eq!(service.delivered().len(), 1);
    }
}
