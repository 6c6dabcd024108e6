//! MQTT alert publishing

use alerting::{AlertNotification, AlertNotifier, NotifyError, ALERT_EVENT};
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::CloudError;

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT port
    pub broker_port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Prefix of every published topic
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    /// Outgoing request queue size
    pub request_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "driver-monitor".to_string(),
            topic_prefix: "fleet".to_string(),
            keep_alive_secs: 30,
            request_capacity: 10,
        }
    }
}

impl MqttSettings {
    /// Full MQTT topic for an alert topic, e.g. `fleet/route/42/driver-alert`
    pub fn topic(&self, alert_topic: &str) -> String {
        format!("{}/{}/{}", self.topic_prefix, alert_topic, ALERT_EVENT)
    }
}

/// Notifier publishing each alert once per topic, at most once
pub struct MqttNotifier {
    settings: MqttSettings,
    client: AsyncClient,
}

impl MqttNotifier {
    /// Connect to the broker and drive its event loop in the background
    pub async fn connect(settings: MqttSettings) -> Result<Self, CloudError> {
        if settings.broker_host.is_empty() {
            return Err(CloudError::Connection("Broker host not set".to_string()));
        }

        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.broker_host.clone(),
            settings.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));

        let (client, mut eventloop) = AsyncClient::new(options, settings.request_capacity);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        info!(
            "Publishing alerts to MQTT broker {}:{}",
            settings.broker_host, settings.broker_port
        );
        Ok(Self::with_client(settings, client))
    }

    /// Wrap an existing client whose event loop is driven elsewhere
    pub fn with_client(settings: MqttSettings, client: AsyncClient) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    async fn publish_all(&self, notification: &AlertNotification) -> Result<(), CloudError> {
        let payload = serde_json::to_vec(notification)
            .map_err(|e| CloudError::Serialization(e.to_string()))?;

        for alert_topic in &notification.topics {
            let topic = self.settings.topic(alert_topic);
            self.client
                .publish(topic.as_str(), QoS::AtMostOnce, false, payload.clone())
                .await
                .map_err(|e| CloudError::Publish(e.to_string()))?;
            debug!(topic = %topic, alert = %notification.alert_id, "Alert queued for MQTT");
        }
        Ok(())
    }
}

impl AlertNotifier for MqttNotifier {
    async fn publish(&self, notification: &AlertNotification) -> Result<(), NotifyError> {
        Ok(self.publish_all(notification).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::{Alert, AlertType, DriverState, Episode, TripContext};
    use uuid::Uuid;

    fn notification() -> AlertNotification {
        let episode = Episode {
            id: Uuid::new_v4(),
            driver_id: "drv-1".into(),
            started_at_ms: 0,
            last_seen_closed_at_ms: 5000,
            continuous_closed_ms: 5000,
            warning_fired: true,
            critical_fired: true,
            resolved: false,
            end: None,
        };
        let trip = TripContext {
            route_id: Some("r-12".into()),
            bus_id: Some("bus-3".into()),
            ..Default::default()
        };
        let alert =
            Alert::for_episode(AlertType::Critical, &episode, DriverState::Sleeping, 5000, &trip);
        AlertNotification::new(Uuid::new_v4(), alert)
    }

    fn client(settings: &MqttSettings) -> (AsyncClient, rumqttc::EventLoop) {
        let options =
            MqttOptions::new(&settings.client_id, &settings.broker_host, settings.broker_port);
        AsyncClient::new(options, settings.request_capacity)
    }

    #[test]
    fn test_topic_layout() {
        let settings = MqttSettings::default();
        assert_eq!(settings.topic("driver/drv-1"), "fleet/driver/drv-1/driver-alert");
        assert_eq!(settings.topic("route/r-12"), "fleet/route/r-12/driver-alert");
    }

    #[tokio::test]
    async fn test_publish_queues_every_topic() {
        let settings = MqttSettings::default();
        let (client, _eventloop) = client(&settings);
        let notifier = MqttNotifier::with_client(settings, client);

        let notification = notification();
        assert_eq!(notification.topics.len(), 3);
        notifier.publish(&notification).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_event_loop_fails() {
        let settings = MqttSettings::default();
        let (client, eventloop) = client(&settings);
        drop(eventloop);
        let notifier = MqttNotifier::with_client(settings, client);

        let result = notifier.publish(&notification()).await;
        assert!(matches!(result, Err(NotifyError::Publish(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_host() {
        let settings = MqttSettings {
            broker_host: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            MqttNotifier::connect(settings).await,
            Err(CloudError::Connection(_))
        ));
    }
}
