//! Facial Landmark Frames
//!
//! Types for the per-frame output of the external landmark detector:
//! - 2D landmark points in image pixel coordinates
//! - Timestamped landmark frames
//! - Layouts naming which indices form each eye and the stable reference points

pub mod frame;
pub mod layout;

pub use frame::{LandmarkFrame, Point2};
pub use layout::{EyeSide, LandmarkLayout};

use thiserror::Error;

/// Landmark extraction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("Landmark {index} missing (frame has {available} points)")]
    MissingPoint { index: usize, available: usize },

    #[error("Landmark {index} has non-finite coordinates")]
    NonFinite { index: usize },
}
