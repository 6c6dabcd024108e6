//! Alerting System
//!
//! Delivers escalation alerts to their collaborators:
//! - Durable persistence through an [`AlertStore`], exactly once per escalation
//! - Best-effort publication through an [`AlertNotifier`], keyed by topic
//! - Per-driver serialization of concurrent dispatches

mod dispatcher;
mod notifier;
pub mod wire;

pub use dispatcher::{AlertDispatcher, DispatchConfig, DispatchReceipt};
pub use notifier::{
    AlertNotification, BroadcastNotifier, NoopNotifier, TopicSubscription, ALERT_EVENT,
};
pub use wire::{AlertSubmission, SubmissionResponse};

use dms::Alert;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a persisted alert
pub type AlertId = Uuid;

/// Durable store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Alert rejected: {0}")]
    Rejected(String),
}

/// Notification transport errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Not connected: {0}")]
    NotConnected(String),
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Dispatch errors surfaced to the caller
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Persistence failed: {0}")]
    Persist(#[from] StoreError),
    #[error("Dispatcher lock poisoned")]
    LockPoisoned,
}

/// Outcome of a persistence attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    /// A new record was written
    Created(AlertId),
    /// An alert for the same (driver, episode, type) already exists
    Existing(AlertId),
}

impl Persisted {
    pub fn id(&self) -> AlertId {
        match self {
            Persisted::Created(id) | Persisted::Existing(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Persisted::Created(_))
    }
}

/// Durable record store for alerts
///
/// Implementations must check for an existing alert with the same
/// (driver, episode, type) before inserting, atomically with the insert.
pub trait AlertStore: Send + Sync {
    fn persist(&self, alert: &Alert) -> impl Future<Output = Result<Persisted, StoreError>> + Send;
}

impl<T: AlertStore> AlertStore for Arc<T> {
    fn persist(&self, alert: &Alert) -> impl Future<Output = Result<Persisted, StoreError>> + Send {
        (**self).persist(alert)
    }
}

/// Publish/subscribe transport for real-time alert delivery
pub trait AlertNotifier: Send + Sync {
    fn publish(
        &self,
        notification: &AlertNotification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

impl<T: AlertNotifier> AlertNotifier for Arc<T> {
    fn publish(
        &self,
        notification: &AlertNotification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send {
        (**self).publish(notification)
    }
}
