//! Landmark index schemes and lookup
//!
//! Extractors return a fixed-size landmark collection indexed by a stable
//! numeric scheme. This module names the four mouth indices for the
//! schemes we support and pulls them out of a collection.

use crate::geometry::{LandmarkPoint, MouthPoints};
use serde::{Deserialize, Serialize};

/// Indices of the four mouth landmarks within an extractor's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouthLandmarkIndices {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl MouthLandmarkIndices {
    /// 468-point face mesh: inner lip centers 13/14, mouth corners 61/291
    pub const fn face_mesh() -> Self {
        Self {
            top: 13,
            bottom: 14,
            left: 61,
            right: 291,
        }
    }

    /// 68-point iBUG scheme (dlib, OpenCV LBF): inner lip centers 62/66,
    /// mouth corners 48/54
    pub const fn ibug68() -> Self {
        Self {
            top: 62,
            bottom: 66,
            left: 48,
            right: 54,
        }
    }

    /// Smallest collection length that contains all four indices
    pub fn required_len(&self) -> usize {
        self.top.max(self.bottom).max(self.left).max(self.right) + 1
    }
}

impl Default for MouthLandmarkIndices {
    fn default() -> Self {
        Self::face_mesh()
    }
}

/// Map the normalized landmark at `index` to pixel space.
///
/// Landmarks are `(x, y)` pairs in `[0, 1]` relative to the frame.
/// Returns `None` if `index` is out of range.
pub fn landmark_point(
    landmarks: &[(f32, f32)],
    index: usize,
    frame_width: u32,
    frame_height: u32,
) -> Option<LandmarkPoint> {
    landmarks.get(index).map(|&(x, y)| {
        LandmarkPoint::new(x * frame_width as f32, y * frame_height as f32)
    })
}

impl MouthPoints {
    /// Pick the mouth points out of a normalized landmark collection
    pub fn from_normalized(
        landmarks: &[(f32, f32)],
        indices: &MouthLandmarkIndices,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let at = |index| landmark_point(landmarks, index, frame_width, frame_height);

        Some(Self::new(
            at(indices.top)?,
            at(indices.bottom)?,
            at(indices.left)?,
            at(indices.right)?,
        ))
    }

    /// Pick the mouth points out of a landmark collection already in pixels
    pub fn from_pixels(landmarks: &[LandmarkPoint], indices: &MouthLandmarkIndices) -> Option<Self> {
        Some(Self::new(
            *landmarks.get(indices.top)?,
            *landmarks.get(indices.bottom)?,
            *landmarks.get(indices.left)?,
            *landmarks.get(indices.right)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_landmark_point_scales_to_frame() {
        let landmarks = vec![(0.25, 0.5), (1.0, 1.0)];

        let p = landmark_point(&landmarks, 0, 640, 480).unwrap();
        assert_relative_eq!(p.x, 160.0);
        assert_relative_eq!(p.y, 240.0);

        let corner = landmark_point(&landmarks, 1, 640, 480).unwrap();
        assert_relative_eq!(corner.x, 640.0);
        assert_relative_eq!(corner.y, 480.0);
    }

    #[test]
    fn test_landmark_point_out_of_range() {
        let landmarks = vec![(0.1, 0.1); 4];
        assert!(landmark_point(&landmarks, 4, 640, 480).is_none());
    }

    #[test]
    fn test_required_len() {
        assert_eq!(MouthLandmarkIndices::face_mesh().required_len(), 292);
        assert_eq!(MouthLandmarkIndices::ibug68().required_len(), 67);
    }

    #[test]
    fn test_from_normalized_face_mesh() {
        let indices = MouthLandmarkIndices::face_mesh();
        let mut landmarks = vec![(0.5, 0.5); 468];
        landmarks[indices.top] = (0.5, 0.60);
        landmarks[indices.bottom] = (0.5, 0.65);
        landmarks[indices.left] = (0.4, 0.62);
        landmarks[indices.right] = (0.6, 0.62);

        let mouth = MouthPoints::from_normalized(&landmarks, &indices, 100, 100).unwrap();
        assert_relative_eq!(mouth.vertical_distance(), 5.0, epsilon = 1e-4);
        assert_relative_eq!(mouth.horizontal_distance(), 20.0, epsilon = 1e-4);
        assert_relative_eq!(mouth.ratio(), 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_truncated_collection_is_rejected() {
        let landmarks = vec![(0.5, 0.5); 68];
        assert!(
            MouthPoints::from_normalized(&landmarks, &MouthLandmarkIndices::face_mesh(), 10, 10)
                .is_none()
        );

        let pixels = vec![LandmarkPoint::default(); 60];
        assert!(MouthPoints::from_pixels(&pixels, &MouthLandmarkIndices::ibug68()).is_none());
    }

    #[test]
    fn test_from_pixels_ibug68() {
        let indices = MouthLandmarkIndices::ibug68();
        let mut pixels = vec![LandmarkPoint::default(); 68];
        pixels[indices.top] = LandmarkPoint::new(50.0, 40.0);
        pixels[indices.bottom] = LandmarkPoint::new(50.0, 52.0);
        pixels[indices.left] = LandmarkPoint::new(30.0, 46.0);
        pixels[indices.right] = LandmarkPoint::new(70.0, 46.0);

        let mouth = MouthPoints::from_pixels(&pixels, &indices).unwrap();
        assert_relative_eq!(mouth.ratio(), 0.3, epsilon = 1e-6);
    }
}
