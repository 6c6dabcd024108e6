//! Per-frame driver state classification

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ClassifierConfig;

/// Advisory driver state for supervisory dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverState {
    #[default]
    Active,
    Tension,
    Sleeping,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Active => "active",
            DriverState::Tension => "tension",
            DriverState::Sleeping => "sleeping",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one frame from its averaged eye ratio and motion score
///
/// First match wins. Moderate motion with a low (but not closed) ratio falls
/// through to `Active`.
pub fn classify(ratio: f32, motion: f32, config: &ClassifierConfig) -> DriverState {
    if ratio < config.sleeping_ratio {
        return DriverState::Sleeping;
    }

    if motion > config.tension_motion {
        return DriverState::Tension;
    }

    if motion < config.stillness_motion && ratio < config.drowsy_ratio {
        return DriverState::Sleeping;
    }

    DriverState::Active
}
