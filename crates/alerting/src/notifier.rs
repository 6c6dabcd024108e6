//! Notification payloads and in-process transport

use dms::Alert;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{AlertId, AlertNotifier, NotifyError};

/// Real-time channel name for driver alerts
pub const ALERT_EVENT: &str = "driver-alert";

/// Payload delivered to alert subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub event: String,
    pub alert_id: AlertId,
    /// Topics this alert is delivered to (driver, route, bus)
    pub topics: Vec<String>,
    pub alert: Alert,
}

impl AlertNotification {
    pub fn new(alert_id: AlertId, alert: Alert) -> Self {
        Self {
            event: ALERT_EVENT.to_string(),
            alert_id,
            topics: topics_for(&alert),
            alert,
        }
    }
}

/// Topics an alert is published under
pub fn topics_for(alert: &Alert) -> Vec<String> {
    let mut topics = vec![format!("driver/{}", alert.driver_id)];
    if let Some(route) = &alert.route_id {
        topics.push(format!("route/{route}"));
    }
    if let Some(bus) = &alert.bus_id {
        topics.push(format!("bus/{bus}"));
    }
    topics
}

/// Notifier that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl AlertNotifier for NoopNotifier {
    async fn publish(&self, _notification: &AlertNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// In-process fan-out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<AlertNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to one topic, e.g. `route/42`
    pub fn subscribe(&self, topic: impl Into<String>) -> TopicSubscription {
        TopicSubscription {
            topic: topic.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AlertNotifier for BroadcastNotifier {
    async fn publish(&self, notification: &AlertNotification) -> Result<(), NotifyError> {
        match self.sender.send(notification.clone()) {
            Ok(receivers) => debug!(receivers, alert = %notification.alert_id, "Alert broadcast"),
            Err(_) => debug!(alert = %notification.alert_id, "No alert subscribers"),
        }
        Ok(())
    }
}

/// Receiver filtered to a single topic
pub struct TopicSubscription {
    topic: String,
    receiver: broadcast::Receiver<AlertNotification>,
}

impl TopicSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next notification for this topic, or `None` once the notifier is gone
    pub async fn recv(&mut self) -> Option<AlertNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.topics.iter().any(|t| t == &self.topic) => {
                    return Some(notification);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Alert subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
