//! Repository Implementation

use alerting::{AlertStore, AlertSubmission, Persisted, StoreError};
use chrono::{DateTime, Utc};
use dms::{Alert, AlertType, DriverState, GeoPoint, Severity, StoredAlertType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::StorageError;

/// Stored alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Uuid,
    pub driver_id: String,
    pub alert_type: StoredAlertType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_state: Option<DriverState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_closed_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<Uuid>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Alert to be inserted
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub driver_id: String,
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
    pub driver_state: Option<DriverState>,
    pub eye_closed_duration: Option<f64>,
    pub location: Option<GeoPoint>,
    pub trip_id: Option<String>,
    pub bus_id: Option<String>,
    pub route_id: Option<String>,
    pub episode_id: Option<Uuid>,
}

impl From<&Alert> for NewAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            driver_id: alert.driver_id.clone(),
            alert_type: alert.alert_type,
            timestamp: alert.timestamp,
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

impl TryFrom<AlertSubmission> for NewAlert {
    type Error = StorageError;

    fn try_from(submission: AlertSubmission) -> Result<Self, Self::Error> {
        let missing = submission.missing_fields();
        match (submission.driver_id, submission.alert_type, submission.timestamp) {
            (Some(driver_id), Some(alert_type), Some(timestamp)) if missing.is_empty() => Ok(Self {
                driver_id,
                alert_type,
                timestamp,
                driver_state: submission.driver_state,
                eye_closed_duration: submission.eye_closed_duration,
                location: submission.location,
                trip_id: submission.trip_id,
                bus_id: submission.bus_id,
                route_id: submission.route_id,
                episode_id: submission.episode_id,
            }),
            _ => Err(StorageError::MissingFields(missing)),
        }
    }
}

/// Minimal driver identity attached to query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Alert query filter
#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub driver_id: Option<String>,
    pub alert_type: Option<StoredAlertType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            driver_id: None,
            alert_type: None,
            from: None,
            to: None,
            limit: 50,
        }
    }
}

impl AlertFilter {
    fn matches(&self, record: &AlertRecord) -> bool {
        self.driver_id.as_deref().map_or(true, |d| record.driver_id == d)
            && self.alert_type.map_or(true, |t| record.alert_type == t)
            && self.from.map_or(true, |from| record.timestamp >= from)
            && self.to.map_or(true, |to| record.timestamp <= to)
    }
}

type DedupKey = (String, Uuid, StoredAlertType);

#[derive(Default)]
struct Inner {
    /// Alert records in insertion order
    alerts: VecDeque<AlertRecord>,
    /// (driver, episode, type) -> alert id
    dedup: HashMap<DedupKey, Uuid>,
    drivers: HashMap<String, DriverIdentity>,
}

/// Repository for alert data (in-memory)
pub struct AlertRepository {
    inner: Mutex<Inner>,
    /// Max alert records kept before the oldest are evicted
    max_alert_records: usize,
}

impl AlertRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(100_000)
    }

    /// Create a repository keeping at most `max_alert_records` alerts
    pub fn with_retention(max_alert_records: usize) -> Self {
        info!("Creating in-memory alert repository (retention {})", max_alert_records);
        Self {
            inner: Mutex::new(Inner::default()),
            max_alert_records: max_alert_records.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    /// Insert an alert unless one exists for the same (driver, episode, type)
    ///
    /// The existence check and the insert happen under one lock. Alerts
    /// without an episode id are always inserted.
    pub fn insert_alert(&self, alert: NewAlert) -> Result<Persisted, StorageError> {
        let mut inner = self.lock()?;

        let stored_type = alert.alert_type.stored();
        let key = alert
            .episode_id
            .map(|episode| (alert.driver_id.clone(), episode, stored_type));

        if let Some(existing) = key.as_ref().and_then(|k| inner.dedup.get(k)) {
            debug!("Alert for {:?} already stored as {}", key, existing);
            return Ok(Persisted::Existing(*existing));
        }

        // Enforce retention
        while inner.alerts.len() >= self.max_alert_records {
            if let Some(evicted) = inner.alerts.pop_front() {
                if let Some(episode) = evicted.episode_id {
                    inner.dedup.remove(&(evicted.driver_id, episode, evicted.alert_type));
                }
            }
        }

        let record = AlertRecord {
            id: Uuid::new_v4(),
            driver_id: alert.driver_id,
            alert_type: stored_type,
            severity: alert.alert_type.severity(),
            timestamp: alert.timestamp,
            driver_state: alert.driver_state,
            eye_closed_duration: alert.eye_closed_duration,
            location: alert.location,
            trip_id: alert.trip_id,
            bus_id: alert.bus_id,
            route_id: alert.route_id,
            episode_id: alert.episode_id,
            resolved: false,
            created_at: Utc::now(),
        };

        let id = record.id;
        if let Some(key) = key {
            inner.dedup.insert(key, id);
        }
        inner.alerts.push_back(record);
        debug!("Inserted alert with ID {}", id);

        Ok(Persisted::Created(id))
    }

    /// Query alerts, newest first
    pub fn query_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StorageError> {
        let inner = self.lock()?;

        let mut matched: Vec<AlertRecord> = inner
            .alerts
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.created_at.cmp(&a.created_at)));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    /// Get one alert by id
    pub fn get_alert(&self, id: Uuid) -> Result<AlertRecord, StorageError> {
        let inner = self.lock()?;
        inner
            .alerts
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    /// Mark an alert resolved (supervisor acknowledgement)
    pub fn mark_resolved(&self, id: Uuid) -> Result<AlertRecord, StorageError> {
        let mut inner = self.lock()?;
        let record = inner
            .alerts
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::NotFound(id))?;
        record.resolved = true;
        info!("Alert {} resolved", id);
        Ok(record.clone())
    }

    /// Register or update a driver's identity
    pub fn upsert_driver(&self, driver: DriverIdentity) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.drivers.insert(driver.id.clone(), driver);
        Ok(())
    }

    /// Driver identity, falling back to the bare id for unknown drivers
    pub fn driver_identity(&self, driver_id: &str) -> Result<DriverIdentity, StorageError> {
        let inner = self.lock()?;
        Ok(inner.drivers.get(driver_id).cloned().unwrap_or_else(|| DriverIdentity {
            id: driver_id.to_string(),
            name: None,
        }))
    }

    /// Get total alert count
    pub fn alert_count(&self) -> usize {
        self.inner.lock().map(|i| i.alerts.len()).unwrap_or(0)
    }
}

impl Default for AlertRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertStore for AlertRepository {
    async fn persist(&self, alert: &Alert) -> Result<Persisted, StoreError> {
        Ok(self.insert_alert(NewAlert::from(alert))?)
    }
}
