//! Alert persistence through the fleet backend's HTTP API

use alerting::{AlertStore, AlertSubmission, Persisted, StoreError, SubmissionResponse};
use dms::Alert;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::CloudError;

/// Store that forwards alerts to `POST {base_url}/driver-alerts`
///
/// Deduplication happens server-side: 201 means created, 200 means an alert
/// for the same (driver, episode, type) already existed.
#[derive(Debug, Clone)]
pub struct HttpAlertStore {
    client: Client,
    endpoint: String,
}

impl HttpAlertStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/driver-alerts", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit(&self, alert: &Alert) -> Result<Persisted, CloudError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AlertSubmission::from(alert))
            .send()
            .await
            .map_err(|e| CloudError::Connection(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED && status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: SubmissionResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Serialization(e.to_string()))?;
        debug!(alert = %body.id, status = status.as_u16(), "Alert stored remotely");

        Ok(if status == StatusCode::CREATED {
            Persisted::Created(body.id)
        } else {
            Persisted::Existing(body.id)
        })
    }
}

impl AlertStore for HttpAlertStore {
    async fn persist(&self, alert: &Alert) -> Result<Persisted, StoreError> {
        Ok(self.submit(alert).await?)
    }
}
