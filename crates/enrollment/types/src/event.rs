//! Domain events that trigger orchestration chains
//!
//! An Event is immutable. It only lives long enough to build a chain; the
//! chain copies the identifying fields it needs.

use crate::{ContentId, CourseId, DedupeKey, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user enrolled in a course
    Enrollment,
    /// A user completed a course
    Completion,
    /// Granular content progress update
    Progress,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Enrollment,
        EventKind::Completion,
        EventKind::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Enrollment => "enrollment",
            EventKind::Completion => "completion",
            EventKind::Progress => "progress",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain event raised by a collaborator (enrollment or progress service)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub user_id: UserId,
    pub course_id: CourseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_value: Option<f64>,
    pub session_id: SessionId,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn enrollment(user_id: UserId, course_id: CourseId, session_id: SessionId) -> Self {
        Self::new(EventKind::Enrollment, user_id, course_id, session_id)
    }

    pub fn completion(user_id: UserId, course_id: CourseId, session_id: SessionId) -> Self {
        Self::new(EventKind::Completion, user_id, course_id, session_id)
    }

    pub fn progress(
        user_id: UserId,
        course_id: CourseId,
        content_id: ContentId,
        progress_value: f64,
        session_id: SessionId,
    ) -> Self {
        Self {
            content_id: Some(content_id),
            progress_value: Some(progress_value),
            ..Self::new(EventKind::Progress, user_id, course_id, session_id)
        }
    }

    fn new(kind: EventKind, user_id: UserId, course_id: CourseId, session_id: SessionId) -> Self {
        Self {
            kind,
            user_id,
            course_id,
            content_id: None,
            progress_value: None,
            session_id,
            occurred_at: Utc::now(),
        }
    }

    /// Key identifying the logical unit of work this event belongs to
    pub fn dedupe_key(&self) -> DedupeKey {
        DedupeKey::derive(self.kind, self.user_id, self.course_id)
    }
}
