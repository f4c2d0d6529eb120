//! Event trigger handlers
//!
//! Triggers never fail because of what happens inside a chain. The response
//! carries the chain snapshot at launch; degraded outcomes show up later
//! through the chain and history endpoints.

use axum::{extract::State, Json};
use enrollment_engine::StartOutcome;
use enrollment_types::{Chain, ContentId, CourseId, Event, SessionId, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::rest::state::AppState;

/// Body for enrollment and completion triggers
#[derive(Debug, Deserialize)]
pub struct CourseEventRequest {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub session_id: SessionId,
}

/// Body for progress triggers
#[derive(Debug, Deserialize)]
pub struct ProgressEventRequest {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub content_id: ContentId,
    pub progress_value: f64,
    pub session_id: SessionId,
}

/// Trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: String,
    /// True when an in-flight chain with the same dedupe key answered the trigger
    pub deduplicated: bool,
    pub chain: Chain,
}

impl From<StartOutcome> for TriggerResponse {
    fn from(outcome: StartOutcome) -> Self {
        let deduplicated = !outcome.is_new();
        Self {
            status: "success".to_string(),
            deduplicated,
            chain: outcome.into_chain(),
        }
    }
}

fn trigger(state: &AppState, event: Event) -> Json<TriggerResponse> {
    let outcome = state.orchestrator.trigger(event);
    debug!(chain_id = %outcome.chain().id, new = outcome.is_new(), "Trigger accepted");
    Json(outcome.into())
}

/// User enrolled in a course
pub async fn enrollment(
    State(state): State<AppState>,
    Json(request): Json<CourseEventRequest>,
) -> Json<TriggerResponse> {
    trigger(
        &state,
        Event::enrollment(request.user_id, request.course_id, request.session_id),
    )
}

/// User completed a course
pub async fn completion(
    State(state): State<AppState>,
    Json(request): Json<CourseEventRequest>,
) -> Json<TriggerResponse> {
    trigger(
        &state,
        Event::completion(request.user_id, request.course_id, request.session_id),
    )
}

/// User made progress on a piece of content
pub async fn progress(
    State(state): State<AppState>,
    Json(request): Json<ProgressEventRequest>,
) -> Json<TriggerResponse> {
    trigger(
        &state,
        Event::progress(
            request.user_id,
            request.course_id,
            request.content_id,
            request.progress_value,
            request.session_id,
        ),
    )
}
