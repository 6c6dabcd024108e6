//! DMS configuration

use landmarks::LandmarkLayout;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Per-frame driver state classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Eye ratio below which eyes count as closed (strongest signal)
    pub sleeping_ratio: f32,

    /// Motion score above which the driver is agitated (pixels/frame)
    pub tension_motion: f32,

    /// Motion score below which the face counts as still (pixels/frame)
    pub stillness_motion: f32,

    /// Eye ratio below which a still face counts as drowsy
    pub drowsy_ratio: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sleeping_ratio: 0.15,
            tension_motion: 2.0,
            stillness_motion: 0.5,
            drowsy_ratio: 0.2,
        }
    }
}

/// Eye-closure episode thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Eye ratio below which a frame extends the closed episode
    pub closed_threshold: f32,

    /// Eye ratio at or above which the episode resolves
    pub open_threshold: f32,

    /// Continuous closure before the warning rung (milliseconds)
    pub warning_after_ms: u64,

    /// Continuous closure before the critical rung (milliseconds)
    pub critical_after_ms: u64,

    /// Longest landmark gap bridged without resolving the episode (milliseconds)
    pub gap_tolerance_ms: u64,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            closed_threshold: 0.12,
            open_threshold: 0.18,
            warning_after_ms: 3000,
            critical_after_ms: 5000,
            gap_tolerance_ms: 1000,
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Landmark index layout of the detector feeding the pipeline
    pub layout: LandmarkLayout,

    /// Advisory state classifier thresholds
    pub classifier: ClassifierConfig,

    /// Closed-eye episode thresholds
    pub episode: EpisodeConfig,
}

impl DmsConfig {
    /// Create strict config (earlier escalation)
    pub fn strict() -> Self {
        Self {
            episode: EpisodeConfig {
                warning_after_ms: 2000,
                critical_after_ms: 4000,
                gap_tolerance_ms: 1500,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create lenient config (later escalation)
    pub fn lenient() -> Self {
        Self {
            episode: EpisodeConfig {
                warning_after_ms: 4000,
                critical_after_ms: 7000,
                gap_tolerance_ms: 700,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reject threshold combinations the pipeline cannot honor
    pub fn validate(&self) -> Result<(), DmsError> {
        let episode = &self.episode;
        if episode.closed_threshold >= episode.open_threshold {
            return Err(DmsError::Config(format!(
                "closed_threshold {} must be below open_threshold {}",
                episode.closed_threshold, episode.open_threshold
            )));
        }
        if episode.warning_after_ms >= episode.critical_after_ms {
            return Err(DmsError::Config(format!(
                "warning_after_ms {} must be below critical_after_ms {}",
                episode.warning_after_ms, episode.critical_after_ms
            )));
        }

        let classifier = &self.classifier;
        if classifier.stillness_motion > classifier.tension_motion {
            return Err(DmsError::Config(format!(
                "stillness_motion {} exceeds tension_motion {}",
                classifier.stillness_motion, classifier.tension_motion
            )));
        }

        if self.layout.reference.is_empty() {
            return Err(DmsError::Config("layout has no reference points".into()));
        }

        Ok(())
    }
}
