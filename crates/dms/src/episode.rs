//! Eye-closure episode tracking
//!
//! An episode is one continuous interval of closed eyes. The tracker uses its
//! own hysteresis band (closed/open thresholds) on the raw eye ratio and is
//! independent of the advisory state classifier.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EpisodeConfig;

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeEnd {
    /// Eye ratio rose to the open threshold
    EyesOpened,
    /// No valid landmarks for longer than the gap tolerance
    LandmarksLost,
    /// Session stopped (trip end or explicit stop)
    Stopped,
}

/// One continuous eye-closure interval for a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub driver_id: String,
    pub started_at_ms: u64,
    pub last_seen_closed_at_ms: u64,
    pub continuous_closed_ms: u64,
    pub warning_fired: bool,
    pub critical_fired: bool,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EpisodeEnd>,
}

impl Episode {
    fn open(driver_id: &str, timestamp_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id: driver_id.to_string(),
            started_at_ms: timestamp_ms,
            last_seen_closed_at_ms: timestamp_ms,
            continuous_closed_ms: 0,
            warning_fired: false,
            critical_fired: false,
            resolved: false,
            end: None,
        }
    }

    /// Continuous closure in seconds
    pub fn closed_seconds(&self) -> f64 {
        self.continuous_closed_ms as f64 / 1000.0
    }
}

/// Duration rung crossed by an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationThreshold {
    Warning,
    Critical,
}

/// Emitted the first time an episode crosses a rung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdCrossed {
    pub kind: DurationThreshold,
    pub episode_id: Uuid,
    pub closed_ms: u64,
}

/// Result of feeding one frame to the tracker
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    /// Rungs crossed on this frame, in ladder order
    pub crossed: Vec<ThresholdCrossed>,
    /// Episode that resolved on this frame
    pub resolved: Option<Episode>,
}

/// Closed-eye episode tracker for one driver
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    driver_id: String,
    config: EpisodeConfig,
    open: Option<Episode>,
    last_valid_at_ms: Option<u64>,
}

impl EpisodeTracker {
    pub fn new(driver_id: impl Into<String>, config: EpisodeConfig) -> Self {
        Self {
            driver_id: driver_id.into(),
            config,
            open: None,
            last_valid_at_ms: None,
        }
    }

    /// The open episode, if any
    pub fn current(&self) -> Option<&Episode> {
        self.open.as_ref()
    }

    /// Feed the averaged eye ratio of a valid frame
    pub fn observe(&mut self, ratio: f32, timestamp_ms: u64) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();

        if self.gap_exceeded(timestamp_ms) {
            update.resolved = self.resolve(EpisodeEnd::LandmarksLost);
        }
        self.last_valid_at_ms = Some(timestamp_ms);

        if ratio < self.config.closed_threshold {
            match self.open.as_mut() {
                None => {
                    let episode = Episode::open(&self.driver_id, timestamp_ms);
                    debug!(
                        driver = %self.driver_id,
                        episode = %episode.id,
                        "Eye closure episode opened"
                    );
                    self.open = Some(episode);
                }
                Some(episode) => {
                    let delta = timestamp_ms.saturating_sub(episode.last_seen_closed_at_ms);
                    episode.continuous_closed_ms += delta;
                    episode.last_seen_closed_at_ms = timestamp_ms;
                    update.crossed = Self::check_rungs(episode, &self.config);
                }
            }
        } else if ratio >= self.config.open_threshold {
            if let Some(resolved) = self.resolve(EpisodeEnd::EyesOpened) {
                update.resolved = Some(resolved);
            }
        }

        update
    }

    /// Note a frame whose landmarks were unusable
    ///
    /// Invalid frames never extend an episode. They resolve it only once the
    /// last valid frame is older than the gap tolerance.
    pub fn observe_invalid(&mut self, timestamp_ms: u64) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();
        if self.gap_exceeded(timestamp_ms) {
            update.resolved = self.resolve(EpisodeEnd::LandmarksLost);
        }
        update
    }

    /// Resolve any open episode without raising anything
    pub fn stop(&mut self) -> Option<Episode> {
        let resolved = self.resolve(EpisodeEnd::Stopped);
        self.last_valid_at_ms = None;
        resolved
    }

    fn gap_exceeded(&self, timestamp_ms: u64) -> bool {
        match (self.open.as_ref(), self.last_valid_at_ms) {
            (Some(_), Some(last)) => {
                timestamp_ms.saturating_sub(last) > self.config.gap_tolerance_ms
            }
            _ => false,
        }
    }

    fn check_rungs(episode: &mut Episode, config: &EpisodeConfig) -> Vec<ThresholdCrossed> {
        let mut crossed = Vec::new();

        if !episode.warning_fired && episode.continuous_closed_ms >= config.warning_after_ms {
            episode.warning_fired = true;
            crossed.push(ThresholdCrossed {
                kind: DurationThreshold::Warning,
                episode_id: episode.id,
                closed_ms: episode.continuous_closed_ms,
            });
        }

        if episode.warning_fired
            && !episode.critical_fired
            && episode.continuous_closed_ms >= config.critical_after_ms
        {
            episode.critical_fired = true;
            crossed.push(ThresholdCrossed {
                kind: DurationThreshold::Critical,
                episode_id: episode.id,
                closed_ms: episode.continuous_closed_ms,
            });
        }

        crossed
    }

    fn resolve(&mut self, end: EpisodeEnd) -> Option<Episode> {
        let mut episode = self.open.take()?;
        episode.resolved = true;
        episode.end = Some(end);
        info!(
            driver = %self.driver_id,
            episode = %episode.id,
            closed_ms = episode.continuous_closed_ms,
            reason = ?end,
            "Eye closure episode resolved"
        );
        Some(episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: u64 = 33;

    fn tracker() -> EpisodeTracker {
        EpisodeTracker::new("driver-1", EpisodeConfig::default())
    }

    /// Feed a constant ratio from `start` to `end` (inclusive) at ~30fps
    fn feed(
        tracker: &mut EpisodeTracker,
        ratio: f32,
        start: u64,
        end: u64,
    ) -> Vec<(u64, TrackerUpdate)> {
        let mut out = Vec::new();
        let mut t = start;
        while t <= end {
            out.push((t, tracker.observe(ratio, t)));
            t += FRAME_MS;
        }
        out
    }

    #[test]
    fn test_ladder_fires_once_each_in_order() {
        let mut tracker = tracker();
        let updates = feed(&mut tracker, 0.05, 0, 8000);

        let crossed: Vec<(u64, ThresholdCrossed)> = updates
            .iter()
            .flat_map(|(t, u)| u.crossed.iter().map(move |c| (*t, *c)))
            .collect();

        assert_eq!(crossed.len(), 2);
        assert_eq!(crossed[0].1.kind, DurationThreshold::Warning);
        assert_eq!(crossed[1].1.kind, DurationThreshold::Critical);
        assert!(crossed[0].0 >= 3000 && crossed[0].0 < 3000 + FRAME_MS);
        assert!(crossed[1].0 >= 5000 && crossed[1].0 < 5000 + FRAME_MS);
        assert!(crossed[0].1.closed_ms >= 3000);
        assert!(crossed[1].1.closed_ms >= 5000);
        assert_eq!(crossed[0].1.episode_id, crossed[1].1.episode_id);
    }

    #[test]
    fn test_early_reopen_resolves_without_rungs() {
        let mut tracker = tracker();
        let closed = feed(&mut tracker, 0.05, 0, 2500);
        assert!(closed.iter().all(|(_, u)| u.crossed.is_empty()));

        let update = tracker.observe(0.30, 2533);
        let resolved = update.resolved.unwrap();
        assert!(resolved.resolved);
        assert!(!resolved.warning_fired);
        assert!(!resolved.critical_fired);
        assert_eq!(resolved.end, Some(EpisodeEnd::EyesOpened));
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_new_episode_rearms_ladder() {
        let mut tracker = tracker();
        feed(&mut tracker, 0.05, 0, 3500);
        let first_id = tracker.current().unwrap().id;
        assert!(tracker.current().unwrap().warning_fired);

        tracker.observe(0.30, 3600);
        let updates = feed(&mut tracker, 0.05, 4000, 7100);

        let second = tracker.current().unwrap();
        assert_ne!(second.id, first_id);
        let warnings = updates
            .iter()
            .flat_map(|(_, u)| u.crossed.iter())
            .filter(|c| c.kind == DurationThreshold::Warning)
            .count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_hysteresis_band_keeps_episode_open() {
        let mut tracker = tracker();
        tracker.observe(0.05, 0);
        let id = tracker.current().unwrap().id;

        // Between closed (0.12) and open (0.18): no resolve, no accumulation
        let update = tracker.observe(0.15, 33);
        assert!(update.resolved.is_none());
        assert_eq!(tracker.current().unwrap().continuous_closed_ms, 0);

        tracker.observe(0.05, 66);
        let episode = tracker.current().unwrap();
        assert_eq!(episode.id, id);
        assert_eq!(episode.continuous_closed_ms, 66);
    }

    #[test]
    fn test_short_invalid_gap_is_bridged() {
        let mut tracker = tracker();
        tracker.observe(0.05, 0);
        tracker.observe(0.05, 100);

        for t in [200, 400, 600, 800, 1000] {
            assert!(tracker.observe_invalid(t).resolved.is_none());
        }

        tracker.observe(0.05, 1050);
        let episode = tracker.current().unwrap();
        assert_eq!(episode.continuous_closed_ms, 1050);
    }

    #[test]
    fn test_long_invalid_gap_resolves() {
        let mut tracker = tracker();
        tracker.observe(0.05, 0);
        tracker.observe(0.05, 100);

        assert!(tracker.observe_invalid(900).resolved.is_none());
        let resolved = tracker.observe_invalid(1200).resolved.unwrap();
        assert_eq!(resolved.end, Some(EpisodeEnd::LandmarksLost));
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_missing_frames_resolve_then_reopen() {
        let mut tracker = tracker();
        tracker.observe(0.05, 0);
        let first = tracker.current().unwrap().id;

        // Nothing for 5 seconds, then closed again
        let update = tracker.observe(0.05, 5000);
        assert_eq!(update.resolved.unwrap().end, Some(EpisodeEnd::LandmarksLost));
        assert!(update.crossed.is_empty());

        let second = tracker.current().unwrap();
        assert_ne!(second.id, first);
        assert_eq!(second.continuous_closed_ms, 0);
    }

    #[test]
    fn test_jump_fires_both_rungs_in_order() {
        let config = EpisodeConfig {
            gap_tolerance_ms: 10_000,
            ..Default::default()
        };
        let mut tracker = EpisodeTracker::new("driver-1", config);
        tracker.observe(0.05, 0);

        let update = tracker.observe(0.05, 6000);
        let kinds: Vec<_> = update.crossed.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![DurationThreshold::Warning, DurationThreshold::Critical]);
    }

    #[test]
    fn test_stop_resolves_silently() {
        let mut tracker = tracker();
        feed(&mut tracker, 0.05, 0, 1000);
        let resolved = tracker.stop().unwrap();
        assert_eq!(resolved.end, Some(EpisodeEnd::Stopped));
        assert!(tracker.stop().is_none());
    }
}
