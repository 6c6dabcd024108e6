//! Driver Monitoring System (DMS)
//!
//! Turns per-frame facial landmarks into driver safety alerts:
//! - Eye aspect ratio from six-point eye contours
//! - Head motion between consecutive frames
//! - Advisory driver state (active / tension / sleeping)
//! - Eye-closure episodes with hysteresis and gap tolerance
//! - Warning -> critical alert escalation per episode

pub mod alert;
pub mod analysis;
pub mod config;
pub mod episode;
pub mod escalation;
pub mod geometry;
pub mod motion;
pub mod pipeline;
pub mod state;

pub use alert::{Alert, AlertType, GeoPoint, Severity, StoredAlertType, TripContext};
pub use analysis::{FrameAnalysis, FrameStatus};
pub use config::{ClassifierConfig, DmsConfig, EpisodeConfig};
pub use episode::{DurationThreshold, Episode, EpisodeEnd, EpisodeTracker, ThresholdCrossed};
pub use escalation::{EscalationLevel, EscalationMachine};
pub use geometry::{binocular_ratio, eye_aspect_ratio, BinocularRatio, EyeRatio};
pub use motion::MotionDetector;
pub use pipeline::DriverPipeline;
pub use state::{classify, DriverState};

use landmarks::{EyeSide, LandmarkError};
use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Landmarks unusable: {0}")]
    Landmarks(#[from] LandmarkError),

    #[error("Degenerate {0:?} eye contour (zero horizontal extent)")]
    DegenerateEye(EyeSide),

    #[error("Configuration error: {0}")]
    Config(String),
}
