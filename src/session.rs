//! Detection session: observation source -> frame classifier -> stability
//! filter -> emission sink, with start/stop/cleanup lifecycle.
//!
//! One session owns one filter history and one motion baseline; sessions
//! never share state. Frames are processed strictly one at a time and
//! emissions are fire-and-forget through a channel, so a slow sink never
//! blocks the next observation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::landmarks::LandmarkFrame;
use crate::motion::MotionClassifier;
use crate::rules::RuleTable;
use crate::stability::{ConfirmedEvent, StabilityFilter};

/// One inbound observation, as delivered by the external producer.
/// NDJSON wire forms: `{"landmarks": [[x,y], ...21]}`, `{"motion": m}`,
/// `{}` for a frame with no hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Landmarks { landmarks: Vec<[f32; 2]> },
    Motion { motion: f64 },
    Empty {},
}

/// Pull-style frame supplier. `Ok(None)` means the stream ended.
pub trait ObservationSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, DetectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
    /// After cleanup; the session cannot be restarted.
    Closed,
}

pub struct DetectionSession {
    rules: RuleTable,
    motion: MotionClassifier,
    filter: StabilityFilter,
    landmark_confirm: usize,
    motion_confirm: usize,
    state: State,
}

impl DetectionSession {
    pub fn new(
        rules: RuleTable,
        motion: MotionClassifier,
        window: usize,
        landmark_confirm: usize,
        motion_confirm: usize,
    ) -> Self {
        Self {
            rules,
            motion,
            filter: StabilityFilter::new(window),
            landmark_confirm,
            motion_confirm,
            state: State::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    pub fn start(&mut self) -> Result<(), DetectError> {
        match self.state {
            State::Active => Err(DetectError::AlreadyActive),
            State::Closed => Err(DetectError::SourceUnavailable(
                "session was cleaned up; re-initialize to restart".into(),
            )),
            State::Idle => {
                self.state = State::Active;
                Ok(())
            }
        }
    }

    /// Classify and debounce one frame. Malformed observations error out
    /// before any state is touched; the frame is simply lost.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<ConfirmedEvent>, DetectError> {
        if self.state != State::Active {
            return Err(DetectError::SourceUnavailable(
                "session is not active".into(),
            ));
        }
        match frame {
            Frame::Empty {} => Ok(self.filter.accept(None, self.landmark_confirm)),
            Frame::Landmarks { landmarks } => {
                let observation = LandmarkFrame::from_pairs(landmarks)?;
                let candidate = self.rules.classify(&observation);
                Ok(self.filter.accept(candidate.as_ref(), self.landmark_confirm))
            }
            Frame::Motion { motion } => {
                let candidate = self.motion.classify(*motion)?;
                Ok(self.filter.accept(candidate.as_ref(), self.motion_confirm))
            }
        }
    }

    /// Pull frames until the source ends or `cancel` is raised, sending each
    /// confirmed event into `sink`. Per-frame failures are logged and
    /// skipped; they never tear the session down. Returns to Idle when done.
    pub fn run<S: ObservationSource>(
        &mut self,
        source: &mut S,
        sink: &mpsc::Sender<ConfirmedEvent>,
        cancel: &AtomicBool,
    ) -> Result<(), DetectError> {
        self.start()?;
        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!("session cancelled");
                break;
            }
            let frame = match source.next_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e @ DetectError::SourceUnavailable(_)) => {
                    self.stop();
                    return Err(e);
                }
                Err(e) => {
                    warn!("dropping malformed frame: {e}");
                    continue;
                }
            };
            match self.process_frame(&frame) {
                Ok(Some(event)) => {
                    debug!("confirmed '{}' ({:.2})", event.label, event.confidence);
                    if sink.send(event).is_err() {
                        warn!("emission sink closed; stopping session");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("dropping frame: {e}"),
            }
        }
        self.stop();
        Ok(())
    }

    /// Return to Idle, clearing filter history, the last-emitted label and
    /// the motion baseline. Idempotent.
    pub fn stop(&mut self) {
        if self.state == State::Active {
            self.state = State::Idle;
        }
        self.filter.reset();
        self.motion.reset();
    }

    /// Stop and release the session for good.
    pub fn cleanup(&mut self) {
        self.stop();
        self.state = State::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{INDEX_TIP, MIDDLE_TIP, PINKY_TIP, RING_TIP};
    use crate::stability::{DEFAULT_WINDOW, LANDMARK_CONFIRM, MOTION_CONFIRM};

    fn session() -> DetectionSession {
        DetectionSession::new(
            RuleTable::default(),
            MotionClassifier::default(),
            DEFAULT_WINDOW,
            LANDMARK_CONFIRM,
            MOTION_CONFIRM,
        )
    }

    fn open_palm_frame() -> Frame {
        let mut pts = vec![[0.5f32, 0.5f32]; 21];
        for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
            pts[tip][1] = 0.2;
        }
        Frame::Landmarks { landmarks: pts }
    }

    #[test]
    fn double_start_is_rejected_and_leaves_session_running() {
        let mut s = session();
        s.start().unwrap();
        assert!(matches!(s.start(), Err(DetectError::AlreadyActive)));
        assert!(s.is_active());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut s = session();
        s.start().unwrap();
        s.stop();
        assert!(!s.is_active());
        s.stop();
        assert!(!s.is_active());
        s.start().unwrap();
    }

    #[test]
    fn cleanup_prevents_restart() {
        let mut s = session();
        s.cleanup();
        assert!(matches!(s.start(), Err(DetectError::SourceUnavailable(_))));
    }

    #[test]
    fn open_palm_emits_on_the_second_matching_frame() {
        let mut s = session();
        s.start().unwrap();
        assert!(s.process_frame(&open_palm_frame()).unwrap().is_none());
        let evt = s.process_frame(&open_palm_frame()).unwrap().unwrap();
        assert_eq!(evt.label, "Hello, how are you?");
        assert_eq!(evt.confidence, 0.97);
        // Held gesture: no re-emission.
        assert!(s.process_frame(&open_palm_frame()).unwrap().is_none());
    }

    #[test]
    fn motion_path_confirms_at_the_third_occurrence() {
        let mut s = session();
        s.start().unwrap();
        // Warm-up frame establishes the baseline.
        assert!(s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap().is_none());
        assert!(s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap().is_none());
        assert!(s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap().is_none());
        let evt = s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap().unwrap();
        assert_eq!(evt.label, "Thank you");
        assert_eq!(evt.confidence, 0.75);
    }

    #[test]
    fn malformed_frame_errs_without_touching_history() {
        let mut s = session();
        s.start().unwrap();
        s.process_frame(&open_palm_frame()).unwrap();
        let bad = Frame::Landmarks {
            landmarks: vec![[0.5, 0.5]; 7],
        };
        assert!(matches!(
            s.process_frame(&bad),
            Err(DetectError::InvalidObservation(_))
        ));
        // The streak from the first frame survives the bad one.
        assert!(s.process_frame(&open_palm_frame()).unwrap().is_some());
    }

    #[test]
    fn stop_clears_motion_baseline_and_history() {
        let mut s = session();
        s.start().unwrap();
        s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap();
        s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap();
        s.stop();
        s.start().unwrap();
        // New session start: the first motion frame is a warm-up again.
        assert!(s.process_frame(&Frame::Motion { motion: 120.0 }).unwrap().is_none());
    }

    struct VecSource(Vec<Frame>);
    impl ObservationSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, DetectError> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.0.remove(0)))
            }
        }
    }

    #[test]
    fn run_routes_emissions_to_the_sink_and_returns_to_idle() {
        let mut s = session();
        let mut source = VecSource(vec![
            open_palm_frame(),
            Frame::Empty {},
            open_palm_frame(),
            open_palm_frame(),
        ]);
        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);
        s.run(&mut source, &tx, &cancel).unwrap();
        drop(tx);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "Hello, how are you?");
        assert!(!s.is_active());
    }

    #[test]
    fn frame_wire_forms_round_trip() {
        let f: Frame = serde_json::from_str(r#"{"motion": 120.0}"#).unwrap();
        assert!(matches!(f, Frame::Motion { motion } if motion == 120.0));
        let f: Frame = serde_json::from_str("{}").unwrap();
        assert!(matches!(f, Frame::Empty {}));
        let json = serde_json::to_string(&Frame::Motion { motion: 3.5 }).unwrap();
        assert_eq!(json, r#"{"motion":3.5}"#);
    }
}
