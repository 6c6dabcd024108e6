//! Driver alerts raised by the escalation ladder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::episode::Episode;
use crate::state::DriverState;

/// Alert type as reported by the pipeline
///
/// `Critical` travels as `alarm` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    #[serde(rename = "alarm")]
    Critical,
    Sleeping,
    Tension,
}

impl AlertType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Warning => "warning",
            AlertType::Critical => "alarm",
            AlertType::Sleeping => "sleeping",
            AlertType::Tension => "tension",
        }
    }

    /// Severity derived from the type
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::Warning => Severity::Medium,
            AlertType::Critical | AlertType::Sleeping => Severity::Critical,
            AlertType::Tension => Severity::High,
        }
    }

    /// Category used by the durable record store
    pub fn stored(&self) -> StoredAlertType {
        match self {
            AlertType::Warning => StoredAlertType::DrowsinessWarning,
            AlertType::Critical => StoredAlertType::DrowsinessCritical,
            AlertType::Sleeping => StoredAlertType::SleepingDetected,
            AlertType::Tension => StoredAlertType::TensionDetected,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredAlertType {
    DrowsinessWarning,
    DrowsinessCritical,
    SleepingDetected,
    TensionDetected,
}

impl StoredAlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredAlertType::DrowsinessWarning => "drowsiness_warning",
            StoredAlertType::DrowsinessCritical => "drowsiness_critical",
            StoredAlertType::SleepingDetected => "sleeping_detected",
            StoredAlertType::TensionDetected => "tension_detected",
        }
    }
}

impl From<AlertType> for StoredAlertType {
    fn from(alert_type: AlertType) -> Self {
        alert_type.stored()
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Trip the driver is currently on, stamped onto every alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    /// Last known vehicle position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Immutable alert record derived from an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub driver_id: String,
    pub episode_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub driver_state: DriverState,
    /// Continuous eye closure at the time of the alert (seconds)
    pub eye_closed_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub resolved: bool,
}

impl Alert {
    /// Build an alert for an episode at the given frame time
    pub fn for_episode(
        alert_type: AlertType,
        episode: &Episode,
        driver_state: DriverState,
        timestamp_ms: u64,
        trip: &TripContext,
    ) -> Self {
        Self {
            driver_id: episode.driver_id.clone(),
            episode_id: episode.id,
            alert_type,
            severity: alert_type.severity(),
            timestamp: timestamp_from_millis(timestamp_ms),
            driver_state,
            eye_closed_duration: episode.closed_seconds(),
            location: trip.location,
            trip_id: trip.trip_id.clone(),
            bus_id: trip.bus_id.clone(),
            route_id: trip.route_id.clone(),
            resolved: false,
        }
    }
}

/// Convert a frame timestamp to UTC, clamping out-of-range values to the epoch
pub fn timestamp_from_millis(timestamp_ms: u64) -> DateTime<Utc> {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}
