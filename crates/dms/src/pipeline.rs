//! Per-driver frame pipeline
//!
//! Ratio -> motion -> classification -> episode tracking -> escalation, run
//! synchronously once per frame. All cross-frame state lives in the pipeline
//! value, so arbitrary frame sequences can be replayed deterministically.

use landmarks::LandmarkFrame;
use tracing::{debug, trace};

use crate::alert::TripContext;
use crate::analysis::{FrameAnalysis, FrameStatus};
use crate::config::DmsConfig;
use crate::episode::{Episode, EpisodeTracker, TrackerUpdate};
use crate::escalation::{EscalationLevel, EscalationMachine};
use crate::geometry::binocular_ratio;
use crate::motion::MotionDetector;
use crate::state::classify;
use crate::DmsError;

/// Driver monitoring pipeline for one driver
pub struct DriverPipeline {
    driver_id: String,
    config: DmsConfig,
    trip: TripContext,
    motion: MotionDetector,
    tracker: EpisodeTracker,
    escalation: EscalationMachine,
    last_timestamp_ms: Option<u64>,
}

impl DriverPipeline {
    /// Create a pipeline for a driver with a validated configuration
    pub fn new(driver_id: impl Into<String>, config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        let driver_id = driver_id.into();

        Ok(Self {
            tracker: EpisodeTracker::new(driver_id.clone(), config.episode.clone()),
            driver_id,
            config,
            trip: TripContext::default(),
            motion: MotionDetector::new(),
            escalation: EscalationMachine::new(),
            last_timestamp_ms: None,
        })
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn trip(&self) -> &TripContext {
        &self.trip
    }

    /// Set the trip context stamped onto subsequent alerts
    pub fn set_trip(&mut self, trip: TripContext) {
        self.trip = trip;
    }

    /// The open closure episode, if any
    pub fn episode(&self) -> Option<&Episode> {
        self.tracker.current()
    }

    pub fn escalation_level(&self) -> EscalationLevel {
        self.escalation.level()
    }

    /// Run one frame through the pipeline
    pub fn process(&mut self, frame: &LandmarkFrame) -> FrameAnalysis {
        let timestamp_ms = frame.timestamp_ms;

        if self.last_timestamp_ms.is_some_and(|last| timestamp_ms <= last) {
            debug!(
                driver = %self.driver_id,
                timestamp_ms,
                last = ?self.last_timestamp_ms,
                "Skipping stale frame"
            );
            let mut analysis =
                FrameAnalysis::new(&self.driver_id, timestamp_ms, FrameStatus::Stale);
            analysis.escalation = self.escalation.level();
            analysis.episode = self.tracker.current().cloned();
            return analysis;
        }
        self.last_timestamp_ms = Some(timestamp_ms);

        let measured = binocular_ratio(frame, &self.config.layout).and_then(|ratio| {
            let refs = self.config.layout.reference_points(frame)?;
            Ok((ratio, refs))
        });

        let mut analysis = match measured {
            Ok((ratio, refs)) => {
                let motion = self.motion.update(refs);
                let state = classify(ratio.average, motion, &self.config.classifier);
                trace!(
                    driver = %self.driver_id,
                    ratio = ratio.average,
                    motion,
                    state = %state,
                    "Frame measured"
                );

                let update = self.tracker.observe(ratio.average, timestamp_ms);

                let mut analysis =
                    FrameAnalysis::new(&self.driver_id, timestamp_ms, FrameStatus::Processed);
                analysis.eye_ratio = Some(ratio);
                analysis.motion_score = motion;
                analysis.driver_state = Some(state);
                self.escalate(update, &mut analysis);

                if let Some(alert) =
                    self.escalation
                        .on_state(state, self.tracker.current(), timestamp_ms, &self.trip)
                {
                    analysis.alerts.push(alert);
                }
                analysis
            }
            Err(e) => {
                debug!(driver = %self.driver_id, timestamp_ms, error = %e, "Invalid frame");
                self.motion.invalidate();

                let update = self.tracker.observe_invalid(timestamp_ms);
                let mut analysis =
                    FrameAnalysis::new(&self.driver_id, timestamp_ms, FrameStatus::Invalid);
                analysis.invalid_reason = Some(e.to_string());
                self.escalate(update, &mut analysis);
                analysis
            }
        };

        analysis.escalation = self.escalation.level();
        analysis.episode = self.tracker.current().cloned();
        analysis
    }

    /// Stop monitoring (trip end): resolve any open episode without alerting
    pub fn stop(&mut self) -> Option<Episode> {
        let resolved = self.tracker.stop();
        if let Some(episode) = &resolved {
            self.escalation.on_resolved(episode);
        }
        self.motion.invalidate();
        self.last_timestamp_ms = None;
        resolved
    }

    fn escalate(&mut self, update: TrackerUpdate, analysis: &mut FrameAnalysis) {
        if let Some(resolved) = &update.resolved {
            self.escalation.on_resolved(resolved);
        }

        if !update.crossed.is_empty() {
            let state = analysis.driver_state.unwrap_or_default();
            if let Some(episode) = self.tracker.current() {
                for crossed in &update.crossed {
                    if let Some(alert) = self.escalation.on_threshold(
                        crossed,
                        episode,
                        state,
                        analysis.timestamp_ms,
                        &self.trip,
                    ) {
                        analysis.alerts.push(alert);
                    }
                }
            }
        }

        analysis.resolved_episode = update.resolved;
    }
}
