//! Landmark layouts
//!
//! A layout names which detector indices form each eye contour and which
//! points are stable enough to measure head motion. Eye contours are ordered
//! outer corner, two upper lid points, inner corner, two lower lid points,
//! so that (1, 5) and (2, 4) are the vertical pairs and (0, 3) the horizontal.

use serde::{Deserialize, Serialize};

use crate::{LandmarkError, LandmarkFrame, Point2};

/// Which eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeSide {
    Left,
    Right,
}

/// Index layout of a landmark frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkLayout {
    /// Six-point left eye contour
    pub left_eye: [usize; 6],
    /// Six-point right eye contour
    pub right_eye: [usize; 6],
    /// Stable reference points (nose tip, mouth corners)
    pub reference: Vec<usize>,
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self::mediapipe()
    }
}

impl LandmarkLayout {
    /// MediaPipe Face Mesh (468 points)
    pub fn mediapipe() -> Self {
        Self {
            left_eye: [33, 160, 158, 133, 153, 144],
            right_eye: [362, 385, 387, 263, 373, 380],
            // Nose tip, left mouth corner, right mouth corner
            reference: vec![1, 61, 291],
        }
    }

    /// Compact 15-point layout: left eye 0..6, right eye 6..12, references 12..15
    pub fn compact() -> Self {
        Self {
            left_eye: [0, 1, 2, 3, 4, 5],
            right_eye: [6, 7, 8, 9, 10, 11],
            reference: vec![12, 13, 14],
        }
    }

    /// Eye contour indices for one side
    pub fn eye_indices(&self, side: EyeSide) -> &[usize; 6] {
        match side {
            EyeSide::Left => &self.left_eye,
            EyeSide::Right => &self.right_eye,
        }
    }

    /// Extract one eye contour from a frame
    pub fn eye(&self, frame: &LandmarkFrame, side: EyeSide) -> Result<[Point2; 6], LandmarkError> {
        frame.gather(self.eye_indices(side))
    }

    /// Extract the reference points from a frame
    pub fn reference_points(&self, frame: &LandmarkFrame) -> Result<Vec<Point2>, LandmarkError> {
        frame.gather_all(&self.reference)
    }
}
