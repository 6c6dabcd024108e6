//! Alert Dispatcher Implementation

use dms::Alert;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::notifier::AlertNotification;
use crate::{AlertId, AlertNotifier, AlertStore, DispatchError, Persisted};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single publish attempt (milliseconds)
    pub publish_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 500,
        }
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub alert_id: AlertId,
    /// False when the store already held this (driver, episode, type)
    pub created: bool,
    /// Whether the notifier accepted the alert
    pub published: bool,
}

/// Alert dispatcher: persist once, publish best-effort
pub struct AlertDispatcher<S, N> {
    store: S,
    notifier: N,
    config: DispatchConfig,
    /// Serializes dispatches per driver
    driver_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: AlertStore, N: AlertNotifier> AlertDispatcher<S, N> {
    /// Create a new alert dispatcher
    pub fn new(store: S, notifier: N, config: DispatchConfig) -> Self {
        info!("Creating alert dispatcher with config: {:?}", config);
        Self {
            store,
            notifier,
            config,
            driver_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Persist an alert and publish it
    ///
    /// Persistence failure is returned to the caller. Publication failure is
    /// logged and reported only through the receipt. A repeated dispatch of
    /// the same (driver, episode, type) returns the existing identifier and
    /// does not publish again.
    pub async fn dispatch(&self, alert: &Alert) -> Result<DispatchReceipt, DispatchError> {
        let lock = self.driver_lock(&alert.driver_id)?;

        let persisted = {
            let _guard = lock.lock().await;
            self.store.persist(alert).await
        };
        self.release_driver_lock(&alert.driver_id, lock);

        let alert_id = match persisted {
            Ok(Persisted::Created(id)) => id,
            Ok(Persisted::Existing(id)) => {
                debug!(
                    driver = %alert.driver_id,
                    episode = %alert.episode_id,
                    alert_type = %alert.alert_type,
                    "Alert already persisted as {}", id
                );
                metrics::counter!("dms_alerts_duplicate_total").increment(1);
                return Ok(DispatchReceipt {
                    alert_id: id,
                    created: false,
                    published: false,
                });
            }
            Err(e) => {
                error!(
                    driver = %alert.driver_id,
                    episode = %alert.episode_id,
                    alert_type = %alert.alert_type,
                    "Alert persistence failed: {}", e
                );
                metrics::counter!("dms_alert_persist_failures_total").increment(1);
                return Err(e.into());
            }
        };

        metrics::counter!("dms_alerts_persisted_total", "alert_type" => alert.alert_type.as_str())
            .increment(1);
        info!(
            driver = %alert.driver_id,
            alert_type = %alert.alert_type,
            severity = alert.severity.as_str(),
            "Alert persisted as {}", alert_id
        );

        let published = self.publish(alert_id, alert).await;

        Ok(DispatchReceipt {
            alert_id,
            created: true,
            published,
        })
    }

    async fn publish(&self, alert_id: AlertId, alert: &Alert) -> bool {
        let notification = AlertNotification::new(alert_id, alert.clone());
        let limit = Duration::from_millis(self.config.publish_timeout_ms);

        match timeout(limit, self.notifier.publish(&notification)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(alert = %alert_id, "Alert publish failed: {}", e);
                metrics::counter!("dms_alert_publish_failures_total").increment(1);
                false
            }
            Err(_) => {
                warn!(alert = %alert_id, "Alert publish timed out after {:?}", limit);
                metrics::counter!("dms_alert_publish_failures_total").increment(1);
                false
            }
        }
    }

    fn driver_lock(&self, driver_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, DispatchError> {
        let mut locks = self.driver_locks.lock().map_err(|_| DispatchError::LockPoisoned)?;
        Ok(locks.entry(driver_id.to_string()).or_default().clone())
    }

    /// Drop the driver's lock entry once no other dispatch holds or awaits it
    fn release_driver_lock(&self, driver_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let Ok(mut locks) = self.driver_locks.lock() else {
            return;
        };
        if locks.get(driver_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(driver_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NotifyError, StoreError};
    use dms::{AlertType, DriverState, Episode, TripContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Store keyed by (driver, episode, type)
    ///
    /// The lookup and the insert are separated by an await, so two unserialized
    /// callers can both miss and both insert.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<(String, Uuid, AlertType), AlertId>>,
        inserts: AtomicUsize,
        fail: bool,
    }

    impl AlertStore for MemoryStore {
        async fn persist(&self, alert: &Alert) -> Result<Persisted, StoreError> {
            if self.fail {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            let key = (alert.driver_id.clone(), alert.episode_id, alert.alert_type);
            let existing = self.records.lock().unwrap().get(&key).copied();
            if let Some(id) = existing {
                return Ok(Persisted::Existing(id));
            }

            tokio::time::sleep(Duration::from_millis(5)).await;

            let id = Uuid::new_v4();
            self.records.lock().unwrap().insert(key, id);
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(Persisted::Created(id))
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        published: AtomicUsize,
        fail: bool,
        hang: bool,
    }

    impl AlertNotifier for CountingNotifier {
        async fn publish(&self, _notification: &AlertNotification) -> Result<(), NotifyError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail {
                return Err(NotifyError::Publish("broker down".into()));
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracked_drivers<S, N>(dispatcher: &AlertDispatcher<S, N>) -> usize {
        dispatcher.driver_locks.lock().unwrap().len()
    }

    fn alert(alert_type: AlertType) -> Alert {
        let episode = Episode {
            id: Uuid::new_v4(),
            driver_id: "drv-1".into(),
            started_at_ms: 0,
            last_seen_closed_at_ms: 3000,
            continuous_closed_ms: 3000,
            warning_fired: true,
            critical_fired: false,
            resolved: false,
            end: None,
        };
        Alert::for_episode(
            alert_type,
            &episode,
            DriverState::Sleeping,
            3000,
            &TripContext::default(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_persists_and_publishes() {
        let dispatcher = AlertDispatcher::new(
            MemoryStore::default(),
            CountingNotifier::default(),
            DispatchConfig::default(),
        );

        let receipt = dispatcher.dispatch(&alert(AlertType::Warning)).await.unwrap();
        assert!(receipt.created);
        assert!(receipt.published);
        assert_eq!(dispatcher.notifier().published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_persists_once() {
        let dispatcher = AlertDispatcher::new(
            MemoryStore::default(),
            CountingNotifier::default(),
            DispatchConfig::default(),
        );
        let warning = alert(AlertType::Warning);

        let first = dispatcher.dispatch(&warning).await.unwrap();
        let second = dispatcher.dispatch(&warning).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.alert_id, second.alert_id);
        assert_eq!(dispatcher.store().records.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.notifier().published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_persist_once() {
        let dispatcher = Arc::new(AlertDispatcher::new(
            MemoryStore::default(),
            CountingNotifier::default(),
            DispatchConfig::default(),
        ));
        let warning = alert(AlertType::Warning);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                let warning = warning.clone();
                tokio::spawn(async move { dispatcher.dispatch(&warning).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(dispatcher.store().inserts.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.store().records.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.notifier().published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_driver_locks_released_after_dispatch() {
        let dispatcher = Arc::new(AlertDispatcher::new(
            MemoryStore::default(),
            CountingNotifier::default(),
            DispatchConfig::default(),
        ));

        let handles: Vec<_> = ["drv-1", "drv-2", "drv-3"]
            .into_iter()
            .map(|driver| {
                let dispatcher = Arc::clone(&dispatcher);
                let mut warning = alert(AlertType::Warning);
                warning.driver_id = driver.into();
                tokio::spawn(async move { dispatcher.dispatch(&warning).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(tracked_drivers(&*dispatcher), 0);

        let failing = AlertDispatcher::new(
            MemoryStore {
                fail: true,
                ..Default::default()
            },
            CountingNotifier::default(),
            DispatchConfig::default(),
        );
        assert!(failing.dispatch(&alert(AlertType::Warning)).await.is_err());
        assert_eq!(tracked_drivers(&failing), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_surfaced() {
        let store = MemoryStore {
            fail: true,
            ..Default::default()
        };
        let dispatcher =
            AlertDispatcher::new(store, CountingNotifier::default(), DispatchConfig::default());

        let result = dispatcher.dispatch(&alert(AlertType::Critical)).await;
        assert!(matches!(result, Err(DispatchError::Persist(_))));
        assert_eq!(dispatcher.notifier().published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let notifier = CountingNotifier {
            fail: true,
            ..Default::default()
        };
        let dispatcher =
            AlertDispatcher::new(MemoryStore::default(), notifier, DispatchConfig::default());

        let receipt = dispatcher.dispatch(&alert(AlertType::Warning)).await.unwrap();
        assert!(receipt.created);
        assert!(!receipt.published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_publish_times_out() {
        let notifier = CountingNotifier {
            hang: true,
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(
            MemoryStore::default(),
            notifier,
            DispatchConfig { publish_timeout_ms: 100 },
        );

        let receipt = dispatcher.dispatch(&alert(AlertType::Warning)).await.unwrap();
        assert!(receipt.created);
        assert!(!receipt.published);
    }
}
