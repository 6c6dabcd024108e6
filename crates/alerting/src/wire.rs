//! HTTP wire format for alert ingestion (`POST /driver-alerts`)

use chrono::{DateTime, Utc};
use dms::{Alert, AlertType, DriverState, GeoPoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AlertId;

/// Alert submission body
///
/// Required fields are optional here so that the server can answer with a
/// precise 400 instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<AlertType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_state: Option<DriverState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_closed_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    /// Deduplication key; submissions without one are never deduplicated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<Uuid>,
}

impl AlertSubmission {
    /// Names of required fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.driver_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            missing.push("driverId");
        }
        if self.alert_type.is_none() {
            missing.push("alertType");
        }
        if self.timestamp.is_none() {
            missing.push("timestamp");
        }
        missing
    }
}

impl From<&Alert> for AlertSubmission {
    fn from(alert: &Alert) -> Self {
        Self {
            driver_id: Some(alert.driver_id.clone()),
            alert_type: Some(alert.alert_type),
            timestamp: Some(alert.timestamp),
            driver_state: Some(alert.driver_state),
            eye_closed_duration: Some(alert.eye_closed_duration),
            location: alert.location,
            trip_id: alert.trip_id.clone(),
            bus_id: alert.bus_id.clone(),
            route_id: alert.route_id.clone(),
            episode_id: Some(alert.episode_id),
        }
    }
}

/// Response to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub id: AlertId,
    /// False when an identical (driver, episode, type) alert already existed
    pub created: bool,
}
