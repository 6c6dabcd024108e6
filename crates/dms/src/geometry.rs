//! Eye aspect ratio (EAR)
//!
//! `ratio = (|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)` over a six-point
//! eye contour. An open human eye sits around 0.25-0.35, a closed one
//! near zero.

use landmarks::{EyeSide, LandmarkFrame, LandmarkLayout, Point2};
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Horizontal eye widths at or below this are treated as degenerate
const MIN_HORIZONTAL_PX: f32 = f32::EPSILON;

/// Openness ratio of a single eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeRatio {
    pub value: f32,
    /// False when the contour had no horizontal extent
    pub valid: bool,
}

/// Compute the eye aspect ratio of one six-point contour
pub fn eye_aspect_ratio(eye: &[Point2; 6]) -> EyeRatio {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= MIN_HORIZONTAL_PX {
        return EyeRatio { value: 0.0, valid: false };
    }

    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    EyeRatio {
        value: vertical / (2.0 * horizontal),
        valid: true,
    }
}

/// Both eye ratios of a frame and their mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinocularRatio {
    pub left: f32,
    pub right: f32,
    pub average: f32,
}

/// Compute the averaged eye ratio of a frame
///
/// Fails when an eye landmark is missing or non-finite, or when either eye
/// contour is degenerate. Such frames are invalid for the whole pipeline.
pub fn binocular_ratio(
    frame: &LandmarkFrame,
    layout: &LandmarkLayout,
) -> Result<BinocularRatio, DmsError> {
    let left = side_ratio(frame, layout, EyeSide::Left)?;
    let right = side_ratio(frame, layout, EyeSide::Right)?;

    Ok(BinocularRatio {
        left,
        right,
        average: (left + right) / 2.0,
    })
}

fn side_ratio(
    frame: &LandmarkFrame,
    layout: &LandmarkLayout,
    side: EyeSide,
) -> Result<f32, DmsError> {
    let eye = layout.eye(frame, side)?;
    let ratio = eye_aspect_ratio(&eye);
    if !ratio.valid {
        return Err(DmsError::DegenerateEye(side));
    }
    Ok(ratio.value)
}
