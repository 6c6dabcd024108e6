//! Driver directory routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use storage::DriverIdentity;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct DriverUpdate {
    pub name: Option<String>,
}

/// Register or rename a driver
pub async fn put_driver(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
    Json(update): Json<DriverUpdate>,
) -> Result<StatusCode, ApiError> {
    let repository = state.read().await.repository.clone();
    repository.upsert_driver(DriverIdentity {
        id: driver_id,
        name: update.name,
    })?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_driver(
    State(state): State<SharedState>,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverIdentity>, ApiError> {
    let repository = state.read().await.repository.clone();
    Ok(Json(repository.driver_identity(&driver_id)?))
}
