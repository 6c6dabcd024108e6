//! Alert Routes

use alerting::{AlertSubmission, Persisted, SubmissionResponse};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use dms::AlertType;
use serde::{Deserialize, Serialize};
use storage::{AlertFilter, AlertRecord, DriverIdentity, NewAlert};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SharedState;

const MAX_LIMIT: usize = 500;

/// Query parameters for `GET /driver-alerts`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub driver_id: Option<String>,
    /// Wire name: warning, alarm, sleeping or tension
    pub alert_type: Option<AlertType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Alert record with minimal driver identity
#[derive(Debug, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub record: AlertRecord,
    pub driver: DriverIdentity,
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<AlertView>,
    pub count: usize,
    pub unresolved_count: usize,
}

type SubmissionResult = Result<(StatusCode, Json<SubmissionResponse>), ApiError>;

/// Record an alert (201 created, 200 already recorded)
pub async fn create_alert(
    State(state): State<SharedState>,
    body: Result<Json<AlertSubmission>, JsonRejection>,
) -> SubmissionResult {
    let result = store_submission(&state, body).await;
    let status = match &result {
        Ok((status, _)) => *status,
        Err(e) => e.status(),
    };
    metrics::counter!("dms_alert_submissions_total", "status" => status.as_u16().to_string())
        .increment(1);
    result
}

async fn store_submission(
    state: &SharedState,
    body: Result<Json<AlertSubmission>, JsonRejection>,
) -> SubmissionResult {
    let Json(submission) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let alert = NewAlert::try_from(submission)?;

    let repository = state.read().await.repository.clone();
    let persisted = repository.insert_alert(alert)?;
    debug!("Alert submission stored: {:?}", persisted);

    let status = match persisted {
        Persisted::Created(_) => StatusCode::CREATED,
        Persisted::Existing(_) => StatusCode::OK,
    };
    Ok((
        status,
        Json(SubmissionResponse {
            id: persisted.id(),
            created: persisted.is_created(),
        }),
    ))
}

/// Get alerts, newest first
pub async fn get_alerts(
    State(state): State<SharedState>,
    params: Result<Query<AlertQuery>, QueryRejection>,
) -> Result<Json<AlertResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(ApiError::BadRequest("`from` is after `to`".to_string()));
        }
    }

    let filter = AlertFilter {
        driver_id: params.driver_id,
        alert_type: params.alert_type.map(|t| t.stored()),
        from: params.from,
        to: params.to,
        limit: params.limit.min(MAX_LIMIT),
    };

    let repository = state.read().await.repository.clone();
    let records = repository.query_alerts(&filter)?;

    let mut data = Vec::with_capacity(records.len());
    for record in records {
        let driver = repository.driver_identity(&record.driver_id)?;
        data.push(AlertView { record, driver });
    }
    let unresolved_count = data.iter().filter(|a| !a.record.resolved).count();

    Ok(Json(AlertResponse {
        count: data.len(),
        unresolved_count,
        data,
    }))
}

/// Mark an alert resolved
pub async fn resolve_alert(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertRecord>, ApiError> {
    let repository = state.read().await.repository.clone();
    Ok(Json(repository.mark_resolved(id)?))
}
