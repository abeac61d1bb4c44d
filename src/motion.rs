//! Motion-magnitude fallback classifier.
//!
//! When no landmark producer is available the source falls back to a single
//! scalar per frame pair: the mean per-pixel channel difference between two
//! consecutive video frames. Labeled half-open bins turn that scalar into a
//! candidate. The first observation of a session only establishes the
//! baseline and never classifies.

use serde::Deserialize;

use crate::error::DetectError;
use crate::rules::Candidate;

#[derive(Debug, Clone, Deserialize)]
pub struct MotionBin {
    pub label: String,
    pub confidence: f32,
    pub low: f64,
    /// Exclusive upper bound; `None` means the bin is open-ended.
    pub high: Option<f64>,
}

impl MotionBin {
    fn contains(&self, magnitude: f64) -> bool {
        magnitude >= self.low && self.high.is_none_or(|h| magnitude < h)
    }

    pub fn overlaps(&self, other: &MotionBin) -> bool {
        let self_below = self.high.is_some_and(|h| h <= other.low);
        let other_below = other.high.is_some_and(|h| h <= self.low);
        !(self_below || other_below)
    }
}

/// Built-in bins. Non-overlapping and deliberately not exhaustive: a
/// magnitude under the lowest floor is treated as stillness, not a sign.
pub fn default_bins() -> Vec<MotionBin> {
    let table: &[(&str, f32, f64, Option<f64>)] = &[
        ("Hello", 0.70, 50.0, Some(100.0)),
        ("Thank you", 0.75, 100.0, Some(150.0)),
        ("Please", 0.80, 150.0, Some(200.0)),
        ("Yes", 0.85, 200.0, Some(250.0)),
        ("No", 0.80, 250.0, Some(300.0)),
        ("I love you", 0.90, 300.0, None),
    ];
    table
        .iter()
        .map(|(label, confidence, low, high)| MotionBin {
            label: (*label).to_string(),
            confidence: *confidence,
            low: *low,
            high: *high,
        })
        .collect()
}

/// Stateful bin classifier with a one-shot warm-up per session.
#[derive(Debug)]
pub struct MotionClassifier {
    bins: Vec<MotionBin>,
    has_baseline: bool,
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new(default_bins())
    }
}

impl MotionClassifier {
    pub fn new(bins: Vec<MotionBin>) -> Self {
        Self {
            bins,
            has_baseline: false,
        }
    }

    /// Classify one magnitude. The very first call after construction or
    /// `reset` caches the frame as baseline and yields nothing, whatever the
    /// magnitude.
    pub fn classify(&mut self, magnitude: f64) -> Result<Option<Candidate>, DetectError> {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(DetectError::InvalidObservation(format!(
                "motion magnitude must be non-negative, got {magnitude}"
            )));
        }
        if !self.has_baseline {
            self.has_baseline = true;
            return Ok(None);
        }
        Ok(self.bins.iter().find(|b| b.contains(magnitude)).map(|b| {
            Candidate {
                label: b.label.clone(),
                confidence: b.confidence,
            }
        }))
    }

    /// Drop the baseline; the next call warms up again.
    pub fn reset(&mut self) {
        self.has_baseline = false;
    }
}

/// Mean per-pixel channel difference between two RGBA frames of equal size,
/// for producers that hold raw pixels rather than precomputed magnitudes.
pub fn frame_diff(current: &[u8], previous: &[u8]) -> Result<f64, DetectError> {
    if current.len() != previous.len() || current.len() % 4 != 0 {
        return Err(DetectError::InvalidObservation(format!(
            "frame buffers must be equal-length RGBA, got {} vs {}",
            current.len(),
            previous.len()
        )));
    }
    if current.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0f64;
    for (c, p) in current.chunks_exact(4).zip(previous.chunks_exact(4)) {
        let r = (c[0] as i32 - p[0] as i32).abs();
        let g = (c[1] as i32 - p[1] as i32).abs();
        let b = (c[2] as i32 - p[2] as i32).abs();
        total += (r + g + b) as f64 / 3.0;
    }
    Ok(total / (current.len() / 4) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_up_frame_never_classifies() {
        let mut c = MotionClassifier::default();
        // Well inside the top bin, still swallowed by warm-up.
        assert!(c.classify(500.0).unwrap().is_none());
        let cand = c.classify(500.0).unwrap().unwrap();
        assert_eq!(cand.label, "I love you");
    }

    #[test]
    fn reset_restores_warm_up() {
        let mut c = MotionClassifier::default();
        c.classify(120.0).unwrap();
        assert!(c.classify(120.0).unwrap().is_some());
        c.reset();
        assert!(c.classify(120.0).unwrap().is_none());
    }

    #[test]
    fn bins_are_half_open() {
        let mut c = MotionClassifier::default();
        c.classify(0.0).unwrap();
        assert_eq!(c.classify(100.0).unwrap().unwrap().label, "Thank you");
        assert_eq!(c.classify(120.0).unwrap().unwrap().confidence, 0.75);
        assert_eq!(c.classify(99.9).unwrap().unwrap().label, "Hello");
        // Below the lowest floor: stillness.
        assert!(c.classify(10.0).unwrap().is_none());
    }

    #[test]
    fn negative_magnitude_is_rejected() {
        let mut c = MotionClassifier::default();
        assert!(c.classify(-1.0).is_err());
        // Rejected frames do not consume the warm-up.
        assert!(c.classify(120.0).unwrap().is_none());
    }

    #[test]
    fn adjacent_half_open_bins_do_not_overlap() {
        let bins = default_bins();
        for (i, a) in bins.iter().enumerate() {
            for b in &bins[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a.label, b.label);
            }
        }
        let open_ended = MotionBin {
            label: "x".into(),
            confidence: 0.5,
            low: 200.0,
            high: None,
        };
        assert!(open_ended.overlaps(&bins[5]));
    }

    #[test]
    fn frame_diff_is_mean_channel_delta() {
        let prev = vec![0u8; 8];
        let mut cur = vec![0u8; 8];
        cur[0] = 30; // r of pixel 0
        cur[5] = 60; // g of pixel 1
        // (30/3 + 60/3) / 2 pixels = 15
        assert_eq!(frame_diff(&cur, &prev).unwrap(), 15.0);
        assert!(frame_diff(&cur, &prev[..4]).is_err());
    }
}
