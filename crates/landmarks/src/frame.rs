//! Landmark frame types

use serde::{Deserialize, Serialize};

use crate::LandmarkError;

/// A 2D landmark point in pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f32, f32)> for Point2 {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// One timestamped sample of facial keypoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkFrame {
    /// Capture timestamp (milliseconds since the Unix epoch)
    pub timestamp_ms: u64,
    /// Frame sequence number assigned by the detector
    #[serde(default)]
    pub sequence: u32,
    /// Ordered landmark points, indexed by the detector's layout
    pub points: Vec<Point2>,
}

impl LandmarkFrame {
    /// Create a new landmark frame
    pub fn new(timestamp_ms: u64, sequence: u32, points: Vec<Point2>) -> Self {
        Self {
            timestamp_ms,
            sequence,
            points,
        }
    }

    /// Number of landmark points in the frame
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the detector produced no landmarks (face lost)
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get a single landmark, checking presence and finiteness
    pub fn point(&self, index: usize) -> Result<Point2, LandmarkError> {
        let point = self.points.get(index).copied().ok_or(LandmarkError::MissingPoint {
            index,
            available: self.points.len(),
        })?;

        if !point.is_finite() {
            return Err(LandmarkError::NonFinite { index });
        }

        Ok(point)
    }

    /// Gather a fixed set of landmarks in the given index order
    pub fn gather<const N: usize>(
        &self,
        indices: &[usize; N],
    ) -> Result<[Point2; N], LandmarkError> {
        let mut out = [Point2::default(); N];
        for (slot, &index) in out.iter_mut().zip(indices.iter()) {
            *slot = self.point(index)?;
        }
        Ok(out)
    }

    /// Gather a variable set of landmarks in the given index order
    pub fn gather_all(&self, indices: &[usize]) -> Result<Vec<Point2>, LandmarkError> {
        indices.iter().map(|&index| self.point(index)).collect()
    }
}
