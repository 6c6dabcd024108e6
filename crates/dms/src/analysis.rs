//! Per-frame pipeline results

use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertType};
use crate::episode::Episode;
use crate::escalation::EscalationLevel;
use crate::geometry::BinocularRatio;
use crate::state::DriverState;

/// How the pipeline treated a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Measured, classified and tracked
    Processed,
    /// Landmarks unusable; no motion or duration contribution
    Invalid,
    /// Timestamp not after the previous frame; ignored entirely
    Stale,
}

/// Complete per-frame analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    pub driver_id: String,

    pub timestamp_ms: u64,

    pub status: FrameStatus,

    /// Eye ratios (valid frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_ratio: Option<BinocularRatio>,

    /// Mean reference point displacement since the previous valid frame
    pub motion_score: f32,

    /// Advisory classification (valid frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_state: Option<DriverState>,

    /// Ladder position after this frame
    pub escalation: EscalationLevel,

    /// Open closure episode after this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<Episode>,

    /// Episode that resolved on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_episode: Option<Episode>,

    /// Why the frame was invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,

    /// Alerts raised on this frame, in ladder order
    pub alerts: Vec<Alert>,
}

impl FrameAnalysis {
    pub(crate) fn new(driver_id: &str, timestamp_ms: u64, status: FrameStatus) -> Self {
        Self {
            driver_id: driver_id.to_string(),
            timestamp_ms,
            status,
            eye_ratio: None,
            motion_score: 0.0,
            driver_state: None,
            escalation: EscalationLevel::Idle,
            episode: None,
            resolved_episode: None,
            invalid_reason: None,
            alerts: Vec::new(),
        }
    }

    /// Check if any alerts were raised
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Get the alert of a given type, if raised
    pub fn alert(&self, alert_type: AlertType) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.alert_type == alert_type)
    }
}
