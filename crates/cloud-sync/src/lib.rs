//! Cloud Synchronization Module
//!
//! Adapters connecting the alert dispatcher to the fleet backend:
//! - [`MqttNotifier`] publishes alerts to per-driver/route/bus MQTT topics
//! - [`HttpAlertStore`] persists alerts through the backend's `POST /driver-alerts`

mod http;
mod mqtt;

pub use http::HttpAlertStore;
pub use mqtt::{MqttNotifier, MqttSettings};

use alerting::{NotifyError, StoreError};
use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl From<CloudError> for NotifyError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Connection(msg) => NotifyError::NotConnected(msg),
            CloudError::Serialization(msg) => NotifyError::Serialization(msg),
            other => NotifyError::Publish(other.to_string()),
        }
    }
}

impl From<CloudError> for StoreError {
    fn from(e: CloudError) -> Self {
        match e {
            // 4xx: the backend refused the alert itself
            CloudError::Http { status, body } if (400..500).contains(&status) => {
                StoreError::Rejected(format!("HTTP {status}: {body}"))
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}
