//! Per-driver session task

use alerting::{AlertDispatcher, AlertNotifier, AlertStore, DispatchError, DispatchReceipt};
use dms::{Alert, DriverPipeline, Episode, FrameAnalysis, FrameStatus, TripContext};
use landmarks::LandmarkFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::MonitorError;

/// Pending commands per session
const COMMAND_CAPACITY: usize = 8;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Processing budget per frame (ms); overruns are logged
    pub frame_budget_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { frame_budget_ms: 33 }
    }
}

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Queued for processing
    Accepted,
    /// Session busy; frame discarded
    Dropped,
}

/// Counters reported when a session stops
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub driver_id: String,
    pub frames_processed: u64,
    pub frames_invalid: u64,
    pub frames_stale: u64,
    pub budget_overruns: u64,
    pub alerts_raised: u64,
    pub alerts_persisted: u64,
    pub alerts_duplicate: u64,
    pub dispatch_failures: u64,
    /// Episode that was open when the session stopped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_episode: Option<Episode>,
}

enum Command {
    SetTrip(TripContext),
    Stop(oneshot::Sender<SessionSummary>),
}

/// Handle to a running session
pub struct SessionHandle {
    driver_id: String,
    frames: mpsc::Sender<LandmarkFrame>,
    commands: mpsc::Sender<Command>,
    latest: watch::Receiver<Option<FrameAnalysis>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Offer a frame without waiting; a busy session drops it
    pub fn submit(&self, frame: LandmarkFrame) -> Result<SubmitOutcome, MonitorError> {
        match self.frames.try_send(frame) {
            Ok(()) => Ok(SubmitOutcome::Accepted),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                debug!(
                    driver = %self.driver_id,
                    timestamp_ms = frame.timestamp_ms,
                    "Session busy, dropping frame"
                );
                metrics::counter!("dms_frames_dropped_total").increment(1);
                Ok(SubmitOutcome::Dropped)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(MonitorError::SessionClosed(self.driver_id.clone()))
            }
        }
    }

    /// Send a frame, waiting for the session to take it (recorded trace replay)
    pub async fn submit_wait(&self, frame: LandmarkFrame) -> Result<(), MonitorError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| MonitorError::SessionClosed(self.driver_id.clone()))
    }

    /// Replace the trip context stamped onto subsequent alerts
    pub fn set_trip(&self, trip: TripContext) -> Result<(), MonitorError> {
        match self.commands.try_send(Command::SetTrip(trip)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(driver = %self.driver_id, "Command queue full, trip update rejected");
                Err(MonitorError::Busy(self.driver_id.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(MonitorError::SessionClosed(self.driver_id.clone()))
            }
        }
    }

    /// Latest frame analysis
    pub fn latest(&self) -> Option<FrameAnalysis> {
        self.latest.borrow().clone()
    }

    /// Watch frame analyses as they are produced
    pub fn subscribe(&self) -> watch::Receiver<Option<FrameAnalysis>> {
        self.latest.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the session and wait for in-flight dispatches
    pub async fn stop(self) -> Result<SessionSummary, MonitorError> {
        let (reply, summary) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .await
            .map_err(|_| MonitorError::SessionClosed(self.driver_id.clone()))?;

        let summary = summary
            .await
            .map_err(|_| MonitorError::SessionClosed(self.driver_id.clone()))?;

        if let Err(e) = self.task.await {
            warn!(driver = %self.driver_id, "Session task ended abnormally: {}", e);
        }
        Ok(summary)
    }
}

/// Spawn a session task for a pipeline
pub fn spawn_session<S, N>(
    pipeline: DriverPipeline,
    dispatcher: Arc<AlertDispatcher<S, N>>,
    config: SessionConfig,
) -> SessionHandle
where
    S: AlertStore + 'static,
    N: AlertNotifier + 'static,
{
    let driver_id = pipeline.driver_id().to_string();
    let (frame_tx, frame_rx) = mpsc::channel(1);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (latest_tx, latest_rx) = watch::channel(None);

    info!(
        driver = %driver_id,
        budget_ms = config.frame_budget_ms,
        "Starting monitoring session"
    );

    let worker = SessionWorker {
        budget: Duration::from_millis(config.frame_budget_ms),
        summary: SessionSummary {
            driver_id: driver_id.clone(),
            ..Default::default()
        },
        pipeline,
        dispatcher,
        frames: frame_rx,
        commands: command_rx,
        latest: latest_tx,
        dispatches: JoinSet::new(),
    };

    SessionHandle {
        driver_id,
        frames: frame_tx,
        commands: command_tx,
        latest: latest_rx,
        task: tokio::spawn(worker.run()),
    }
}

type DispatchResults = Vec<Result<DispatchReceipt, DispatchError>>;

struct SessionWorker<S, N> {
    pipeline: DriverPipeline,
    dispatcher: Arc<AlertDispatcher<S, N>>,
    budget: Duration,
    frames: mpsc::Receiver<LandmarkFrame>,
    commands: mpsc::Receiver<Command>,
    latest: watch::Sender<Option<FrameAnalysis>>,
    dispatches: JoinSet<DispatchResults>,
    summary: SessionSummary,
}

impl<S, N> SessionWorker<S, N>
where
    S: AlertStore + 'static,
    N: AlertNotifier + 'static,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                Some(command) = self.commands.recv() => match command {
                    Command::SetTrip(trip) => {
                        debug!(driver = %self.summary.driver_id, "Trip context updated");
                        self.pipeline.set_trip(trip);
                    }
                    Command::Stop(reply) => {
                        let summary = self.shutdown().await;
                        let _ = reply.send(summary);
                        return;
                    }
                },

                Some(joined) = self.dispatches.join_next(), if !self.dispatches.is_empty() => {
                    self.reap(joined);
                }

                frame = self.frames.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => {
                        debug!(driver = %self.summary.driver_id, "Frame channel closed");
                        self.shutdown().await;
                        return;
                    }
                },
            }
        }
    }

    fn handle_frame(&mut self, frame: LandmarkFrame) {
        let started = Instant::now();
        let analysis = self.pipeline.process(&frame);
        let elapsed = started.elapsed();

        metrics::histogram!("dms_frame_processing_seconds").record(elapsed.as_secs_f64());
        metrics::counter!("dms_frames_processed_total", "status" => status_label(analysis.status))
            .increment(1);

        match analysis.status {
            FrameStatus::Processed => self.summary.frames_processed += 1,
            FrameStatus::Invalid => self.summary.frames_invalid += 1,
            FrameStatus::Stale => self.summary.frames_stale += 1,
        }

        if elapsed > self.budget {
            self.summary.budget_overruns += 1;
            warn!(
                driver = %self.summary.driver_id,
                timestamp_ms = frame.timestamp_ms,
                "Frame took {:?}, budget {:?}", elapsed, self.budget
            );
        }

        if analysis.has_alerts() {
            self.summary.alerts_raised += analysis.alerts.len() as u64;
            self.spawn_dispatch(analysis.alerts.clone());
        }

        self.latest.send_replace(Some(analysis));
    }

    /// Dispatch one frame's alerts in order on a background task
    fn spawn_dispatch(&mut self, alerts: Vec<Alert>) {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.dispatches.spawn(async move {
            let mut results = Vec::with_capacity(alerts.len());
            for alert in &alerts {
                results.push(dispatcher.dispatch(alert).await);
            }
            results
        });
    }

    fn reap(&mut self, joined: Result<DispatchResults, JoinError>) {
        let results = match joined {
            Ok(results) => results,
            Err(e) => {
                error!(driver = %self.summary.driver_id, "Dispatch task failed: {}", e);
                self.summary.dispatch_failures += 1;
                return;
            }
        };

        for result in results {
            match result {
                Ok(receipt) if receipt.created => self.summary.alerts_persisted += 1,
                Ok(_) => self.summary.alerts_duplicate += 1,
                Err(e) => {
                    // Pipeline flags stay set; no retry
                    error!(driver = %self.summary.driver_id, "Alert dispatch failed: {}", e);
                    self.summary.dispatch_failures += 1;
                }
            }
        }
    }

    async fn shutdown(&mut self) -> SessionSummary {
        self.frames.close();
        self.summary.stopped_episode = self.pipeline.stop();

        while let Some(joined) = self.dispatches.join_next().await {
            self.reap(joined);
        }

        info!(
            driver = %self.summary.driver_id,
            processed = self.summary.frames_processed,
            alerts = self.summary.alerts_raised,
            "Monitoring session stopped"
        );
        self.summary.clone()
    }
}

fn status_label(status: FrameStatus) -> &'static str {
    match status {
        FrameStatus::Processed => "processed",
        FrameStatus::Invalid => "invalid",
        FrameStatus::Stale => "stale",
    }
}
