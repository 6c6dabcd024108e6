//! Alert escalation ladder
//!
//! `Idle -> Warning -> Critical`, back to `Idle` when the episode resolves.
//! Each forward transition produces exactly one alert. A concurrent `Tension`
//! classification while the ladder is at Warning or above may raise one extra
//! tension alert per episode without touching the ladder.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alert::{Alert, AlertType, TripContext};
use crate::episode::{DurationThreshold, Episode, ThresholdCrossed};
use crate::state::DriverState;

/// Ladder position for the current episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    #[default]
    Idle,
    Warning,
    Critical,
}

/// Escalation state machine for one driver
#[derive(Debug, Clone, Default)]
pub struct EscalationMachine {
    level: EscalationLevel,
    episode_id: Option<Uuid>,
    tension_raised: bool,
}

impl EscalationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> EscalationLevel {
        self.level
    }

    /// Episode the ladder is currently tracking
    pub fn episode_id(&self) -> Option<Uuid> {
        self.episode_id
    }

    /// Advance the ladder on a duration rung
    pub fn on_threshold(
        &mut self,
        crossed: &ThresholdCrossed,
        episode: &Episode,
        driver_state: DriverState,
        timestamp_ms: u64,
        trip: &TripContext,
    ) -> Option<Alert> {
        if self.episode_id != Some(crossed.episode_id) {
            if self.level != EscalationLevel::Idle {
                warn!(
                    driver = %episode.driver_id,
                    stale = ?self.episode_id,
                    "Ladder was not reset before a new episode"
                );
            }
            self.reset();
            self.episode_id = Some(crossed.episode_id);
        }

        let (next, alert_type) = match (self.level, crossed.kind) {
            (EscalationLevel::Idle, DurationThreshold::Warning) => {
                (EscalationLevel::Warning, AlertType::Warning)
            }
            (EscalationLevel::Warning, DurationThreshold::Critical) => {
                (EscalationLevel::Critical, AlertType::Critical)
            }
            (EscalationLevel::Idle, DurationThreshold::Critical) => {
                warn!(driver = %episode.driver_id, "Critical rung reached without warning");
                (EscalationLevel::Critical, AlertType::Critical)
            }
            _ => return None,
        };

        info!(
            driver = %episode.driver_id,
            episode = %episode.id,
            from = ?self.level,
            to = ?next,
            closed_ms = crossed.closed_ms,
            "Escalating"
        );
        self.level = next;

        Some(Alert::for_episode(alert_type, episode, driver_state, timestamp_ms, trip))
    }

    /// Raise the secondary tension alert when the classifier reports agitation
    pub fn on_state(
        &mut self,
        driver_state: DriverState,
        episode: Option<&Episode>,
        timestamp_ms: u64,
        trip: &TripContext,
    ) -> Option<Alert> {
        if driver_state != DriverState::Tension
            || self.level == EscalationLevel::Idle
            || self.tension_raised
        {
            return None;
        }

        let episode = episode.filter(|e| Some(e.id) == self.episode_id)?;
        self.tension_raised = true;
        info!(driver = %episode.driver_id, episode = %episode.id, "Tension during closure episode");

        Some(Alert::for_episode(AlertType::Tension, episode, driver_state, timestamp_ms, trip))
    }

    /// Return to idle when the tracked episode resolves
    pub fn on_resolved(&mut self, episode: &Episode) {
        if self.episode_id.is_none() || self.episode_id == Some(episode.id) {
            self.reset();
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
