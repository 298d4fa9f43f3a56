//! Mouth geometry
//!
//! Turns four mouth landmarks into the mouth-opening ratio: vertical
//! opening divided by mouth width. Both distances scale with the face's
//! distance from the camera, so the ratio does not.

use serde::{Deserialize, Serialize};

/// 2D landmark position in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The four mouth landmarks for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthPoints {
    /// Upper inner lip, center
    pub top: LandmarkPoint,

    /// Lower inner lip, center
    pub bottom: LandmarkPoint,

    /// Left mouth corner
    pub left: LandmarkPoint,

    /// Right mouth corner
    pub right: LandmarkPoint,
}

impl MouthPoints {
    pub fn new(
        top: LandmarkPoint,
        bottom: LandmarkPoint,
        left: LandmarkPoint,
        right: LandmarkPoint,
    ) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Vertical opening between the inner lips
    pub fn vertical_distance(&self) -> f32 {
        self.top.distance(&self.bottom)
    }

    /// Width between the mouth corners
    pub fn horizontal_distance(&self) -> f32 {
        self.left.distance(&self.right)
    }

    /// Mouth-opening ratio for these points, see [`mouth_ratio`]
    pub fn ratio(&self) -> f32 {
        mouth_ratio(&self.top, &self.bottom, &self.left, &self.right)
    }
}

/// Compute the mouth-opening ratio.
///
/// Returns `|top - bottom| / |left - right|`, or 0.0 when the mouth width
/// is zero. Non-finite input also yields 0.0 so that a bad extractor
/// output can never arm the detector.
pub fn mouth_ratio(
    top: &LandmarkPoint,
    bottom: &LandmarkPoint,
    left: &LandmarkPoint,
    right: &LandmarkPoint,
) -> f32 {
    let vertical = top.distance(bottom);
    let horizontal = left.distance(right);

    if !(horizontal > 0.0) || !vertical.is_finite() || !horizontal.is_finite() {
        return 0.0;
    }

    vertical / horizontal
}
