//! Live monitoring session routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use dms::{FrameAnalysis, TripContext};
use landmarks::LandmarkFrame;
use monitor::{SessionSummary, SubmitOutcome};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub driver_id: String,
    pub trip: TripContext,
}

#[derive(Debug, Serialize)]
pub struct FrameAccepted {
    pub outcome: SubmitOutcome,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub drivers: Vec<String>,
}

pub async fn list_sessions(State(state): State<SharedState>) -> Json<SessionList> {
    let sessions = state.read().await.sessions.clone();
    Json(SessionList {
        drivers: sessions.active_drivers(),
    })
}

/// Start monitoring a driver; the optional body is the trip context
pub async fn start_session(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
    body: Option<Json<TripContext>>,
) -> Result<(StatusCode, Json<SessionStarted>), ApiError> {
    let trip = body.map(|Json(trip)| trip).unwrap_or_default();
    let sessions = state.read().await.sessions.clone();
    sessions.start(&driver_id, trip.clone())?;

    Ok((StatusCode::CREATED, Json(SessionStarted { driver_id, trip })))
}

/// Offer one landmark frame (202 whether queued or dropped)
pub async fn submit_frame(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
    body: Result<Json<LandmarkFrame>, JsonRejection>,
) -> Result<(StatusCode, Json<FrameAccepted>), ApiError> {
    let Json(frame) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let sessions = state.read().await.sessions.clone();
    let outcome = sessions.submit(&driver_id, frame)?;

    Ok((StatusCode::ACCEPTED, Json(FrameAccepted { outcome })))
}

pub async fn update_trip(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
    Json(trip): Json<TripContext>,
) -> Result<StatusCode, ApiError> {
    let sessions = state.read().await.sessions.clone();
    sessions.set_trip(&driver_id, trip)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Latest advisory analysis (`null` before the first frame)
pub async fn session_state(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
) -> Result<Json<Option<FrameAnalysis>>, ApiError> {
    let sessions = state.read().await.sessions.clone();
    Ok(Json(sessions.latest(&driver_id)?))
}

/// Stop monitoring (trip end)
pub async fn stop_session(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let sessions = state.read().await.sessions.clone();
    Ok(Json(sessions.stop(&driver_id).await?))
}
