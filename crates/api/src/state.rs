//! Shared application state

use alerting::{
    AlertDispatcher, AlertNotification, AlertNotifier, AlertStore, BroadcastNotifier,
    NotifyError, Persisted, StoreError,
};
use cloud_sync::{HttpAlertStore, MqttNotifier};
use dms::Alert;
use metrics_exporter_prometheus::PrometheusHandle;
use monitor::SessionRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::AlertRepository;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::ApiError;
use crate::settings::{Settings, StorageSettings};

/// Where session alerts are persisted, selected at startup
pub enum Store {
    /// The server's own repository
    Local(Arc<AlertRepository>),
    /// A fleet backend's `POST /driver-alerts`
    Remote(HttpAlertStore),
}

impl Store {
    pub fn from_settings(
        settings: &StorageSettings,
        repository: &Arc<AlertRepository>,
    ) -> Result<Self, ApiError> {
        let Some(url) = settings.remote_url.as_deref() else {
            return Ok(Store::Local(Arc::clone(repository)));
        };
        let timeout = Duration::from_millis(settings.remote_timeout_ms);
        let store = HttpAlertStore::new(url, timeout)
            .map_err(|e| ApiError::Internal(format!("Remote alert store: {e}")))?;
        info!("Session alerts persisted to {}", store.endpoint());
        Ok(Store::Remote(store))
    }
}

impl AlertStore for Store {
    async fn persist(&self, alert: &Alert) -> Result<Persisted, StoreError> {
        match self {
            Store::Local(repository) => repository.persist(alert).await,
            Store::Remote(store) => store.persist(alert).await,
        }
    }
}

/// Real-time alert transport selected at startup
pub enum Notifier {
    /// In-process subscribers only
    Broadcast(BroadcastNotifier),
    Mqtt(MqttNotifier),
}

impl AlertNotifier for Notifier {
    async fn publish(&self, notification: &AlertNotification) -> Result<(), NotifyError> {
        match self {
            Notifier::Broadcast(notifier) => notifier.publish(notification).await,
            Notifier::Mqtt(notifier) => notifier.publish(notification).await,
        }
    }
}

pub type Sessions = SessionRegistry<Store, Notifier>;

/// Application state shared across handlers
pub struct AppState {
    /// Alert repository
    pub repository: Arc<AlertRepository>,
    /// Live monitoring sessions
    pub sessions: Arc<Sessions>,
    /// Prometheus exporter, when installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

pub type SharedState = Arc<RwLock<AppState>>;

impl AppState {
    /// Create new application state
    pub fn new(settings: &Settings, notifier: Notifier) -> Result<Self, ApiError> {
        let repository = Arc::new(AlertRepository::with_retention(settings.storage.max_alerts));
        let store = Store::from_settings(&settings.storage, &repository)?;
        let dispatcher = AlertDispatcher::new(store, notifier, settings.dispatch.clone());
        let sessions = SessionRegistry::new(
            Arc::new(dispatcher),
            settings.dms.clone(),
            settings.session.clone(),
        )
        .map_err(|e| ApiError::Internal(format!("Invalid pipeline configuration: {e}")))?;

        Ok(Self {
            repository,
            sessions: Arc::new(sessions),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }
}
