//! Hand landmark observation type and the joint index contract.
//!
//! The pose producer delivers 21 normalized points per detected hand,
//! index-addressed by anatomical joint. Frames with no hand carry no
//! observation at all, never a zero-filled one.

use crate::error::DetectError;

pub const LANDMARK_COUNT: usize = 21;

// Joint indices, fixed contract with the upstream hand tracker.
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// One tracked hand keypoint, normalized to [0,1] image coordinates.
/// Smaller y is higher in the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn distance_to(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A validated 21-point hand observation. Construction checks the point
/// count and coordinate range, so rule predicates can index freely.
#[derive(Debug, Clone)]
pub struct LandmarkFrame {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkFrame {
    pub fn new(points: Vec<Landmark>) -> Result<Self, DetectError> {
        if points.len() != LANDMARK_COUNT {
            return Err(DetectError::InvalidObservation(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                points.len()
            )));
        }
        for (i, p) in points.iter().enumerate() {
            if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
                return Err(DetectError::InvalidObservation(format!(
                    "landmark {i} out of range: ({}, {})",
                    p.x, p.y
                )));
            }
        }
        let mut arr = [Landmark { x: 0.0, y: 0.0 }; LANDMARK_COUNT];
        arr.copy_from_slice(&points);
        Ok(Self { points: arr })
    }

    pub fn from_pairs(pairs: &[[f32; 2]]) -> Result<Self, DetectError> {
        Self::new(pairs.iter().map(|p| Landmark { x: p[0], y: p[1] }).collect())
    }

    pub fn point(&self, idx: usize) -> &Landmark {
        &self.points[idx]
    }

    /// Tip above its reference joint, i.e. the finger reads as extended.
    pub fn extended(&self, tip: usize, base: usize) -> bool {
        self.points[tip].y < self.points[base].y
    }

    /// Tip below its reference joint, i.e. the finger reads as folded.
    pub fn folded(&self, tip: usize, base: usize) -> bool {
        self.points[tip].y > self.points[base].y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_point_count() {
        let err = LandmarkFrame::new(vec![Landmark { x: 0.5, y: 0.5 }; 20]).unwrap_err();
        assert!(matches!(err, DetectError::InvalidObservation(_)));
    }

    #[test]
    fn rejects_out_of_range_coordinate() {
        let mut pts = vec![Landmark { x: 0.5, y: 0.5 }; 21];
        pts[7].y = 1.2;
        let err = LandmarkFrame::new(pts).unwrap_err();
        assert!(matches!(err, DetectError::InvalidObservation(_)));
    }

    #[test]
    fn extended_and_folded_follow_image_y() {
        let mut pts = vec![Landmark { x: 0.5, y: 0.5 }; 21];
        pts[INDEX_TIP].y = 0.2;
        pts[INDEX_PIP].y = 0.4;
        let frame = LandmarkFrame::new(pts).unwrap();
        assert!(frame.extended(INDEX_TIP, INDEX_PIP));
        assert!(!frame.folded(INDEX_TIP, INDEX_PIP));
    }
}
