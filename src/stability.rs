//! Temporal stability filter.
//!
//! Converts the noisy per-frame candidate stream into discrete confirmed
//! events. A label must recur enough times within a bounded rolling window
//! before it is released, and a released label stays suppressed until a
//! different label earns its own confirmation. Counting is over the live
//! window only, so a single flicker to a wrong label does not reset a
//! streak.

use std::collections::VecDeque;

use serde::Serialize;

use crate::rules::Candidate;

/// Default bounded-history capacity.
pub const DEFAULT_WINDOW: usize = 5;
/// Landmark rules are precise per frame and confirm fast.
pub const LANDMARK_CONFIRM: usize = 2;
/// The motion fallback is coarser and needs a longer streak.
pub const MOTION_CONFIRM: usize = 3;

/// A candidate that survived the threshold check, released to the caller at
/// most once per distinct gesture transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedEvent {
    pub label: String,
    pub confidence: f32,
}

/// Per-session debounce state. One instance per active session; never
/// shared.
#[derive(Debug)]
pub struct StabilityFilter {
    history: VecDeque<String>,
    capacity: usize,
    last_emitted: Option<String>,
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl StabilityFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_emitted: None,
        }
    }

    /// Feed one classification pass. Frames without a candidate are no-ops
    /// for the history but still count as a call.
    pub fn accept(&mut self, candidate: Option<&Candidate>, threshold: usize) -> Option<ConfirmedEvent> {
        let candidate = candidate?;

        self.history.push_back(candidate.label.clone());
        if self.history.len() > self.capacity {
            self.history.pop_front();
        }

        // Sustained hold of the label we already released: suppress.
        if self.last_emitted.as_deref() == Some(candidate.label.as_str()) {
            return None;
        }

        let count = self
            .history
            .iter()
            .filter(|l| l.as_str() == candidate.label)
            .count();
        if count >= threshold {
            self.last_emitted = Some(candidate.label.clone());
            return Some(ConfirmedEvent {
                label: candidate.label.clone(),
                confidence: candidate.confidence,
            });
        }
        None
    }

    /// Clear history and the last-emitted label, as on session stop.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_emitted = None;
    }

    #[cfg(test)]
    fn window(&self) -> Vec<&str> {
        self.history.iter().map(|s| s.as_str()).collect()
    }
}
