//! Session registry keyed by driver

use alerting::{AlertDispatcher, AlertNotifier, AlertStore};
use dms::{DmsConfig, DriverPipeline, FrameAnalysis, TripContext};
use landmarks::LandmarkFrame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::session::{
    spawn_session, SessionConfig, SessionHandle, SessionSummary, SubmitOutcome,
};
use crate::MonitorError;

/// Running sessions, one per driver, sharing a dispatcher
pub struct SessionRegistry<S, N> {
    dispatcher: Arc<AlertDispatcher<S, N>>,
    dms: DmsConfig,
    session: SessionConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl<S, N> SessionRegistry<S, N>
where
    S: AlertStore + 'static,
    N: AlertNotifier + 'static,
{
    /// Create a registry; the pipeline configuration is validated up front
    pub fn new(
        dispatcher: Arc<AlertDispatcher<S, N>>,
        dms: DmsConfig,
        session: SessionConfig,
    ) -> Result<Self, MonitorError> {
        dms.validate()?;
        Ok(Self {
            dispatcher,
            dms,
            session,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher<S, N>> {
        &self.dispatcher
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SessionHandle>>, MonitorError> {
        self.sessions.lock().map_err(|_| MonitorError::LockPoisoned)
    }

    /// Start monitoring a driver
    pub fn start(&self, driver_id: &str, trip: TripContext) -> Result<(), MonitorError> {
        let mut sessions = self.lock()?;
        if sessions.get(driver_id).is_some_and(SessionHandle::is_running) {
            return Err(MonitorError::AlreadyRunning(driver_id.to_string()));
        }

        let mut pipeline = DriverPipeline::new(driver_id, self.dms.clone())?;
        pipeline.set_trip(trip);
        let handle = spawn_session(pipeline, Arc::clone(&self.dispatcher), self.session.clone());
        sessions.insert(driver_id.to_string(), handle);
        Ok(())
    }

    /// Offer a frame to a driver's session
    pub fn submit(
        &self,
        driver_id: &str,
        frame: LandmarkFrame,
    ) -> Result<SubmitOutcome, MonitorError> {
        let sessions = self.lock()?;
        sessions
            .get(driver_id)
            .ok_or_else(|| MonitorError::NotFound(driver_id.to_string()))?
            .submit(frame)
    }

    pub fn set_trip(&self, driver_id: &str, trip: TripContext) -> Result<(), MonitorError> {
        let sessions = self.lock()?;
        sessions
            .get(driver_id)
            .ok_or_else(|| MonitorError::NotFound(driver_id.to_string()))?
            .set_trip(trip)
    }

    /// Latest analysis for a driver (`None` before the first frame)
    pub fn latest(&self, driver_id: &str) -> Result<Option<FrameAnalysis>, MonitorError> {
        let sessions = self.lock()?;
        sessions
            .get(driver_id)
            .map(SessionHandle::latest)
            .ok_or_else(|| MonitorError::NotFound(driver_id.to_string()))
    }

    /// Stop a driver's session (trip end)
    pub async fn stop(&self, driver_id: &str) -> Result<SessionSummary, MonitorError> {
        let handle = self
            .lock()?
            .remove(driver_id)
            .ok_or_else(|| MonitorError::NotFound(driver_id.to_string()))?;
        handle.stop().await
    }

    /// Stop every session (server shutdown)
    pub async fn stop_all(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = match self.lock() {
            Ok(mut sessions) => sessions.drain().map(|(_, handle)| handle).collect(),
            Err(_) => Vec::new(),
        };

        info!("Stopping {} monitoring sessions", handles.len());
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(summary) = handle.stop().await {
                summaries.push(summary);
            }
        }
        summaries
    }

    pub fn active_drivers(&self) -> Vec<String> {
        let mut drivers: Vec<String> = self
            .lock()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default();
        drivers.sort();
        drivers
    }

    pub fn session_count(&self) -> usize {
        self.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}
