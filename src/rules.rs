//! Classifier registry: ordered geometric rules over a landmark frame.
//!
//! Rules are a closed set of predicate kinds evaluated by one interpreter.
//! Order is significant: classification stops at the first matching rule.
//! Landmark matches carry one fixed high confidence since the predicates are
//! exact geometric tests, not probabilistic scores.

use std::collections::HashMap;

use log::warn;

use crate::landmarks::{
    INDEX_MCP, INDEX_PIP, INDEX_TIP, LandmarkFrame, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP, PINKY_MCP,
    PINKY_PIP, PINKY_TIP, RING_MCP, RING_PIP, RING_TIP, THUMB_MCP, THUMB_TIP,
};

/// Confidence assigned to every landmark-rule match.
pub const LANDMARK_CONFIDENCE: f32 = 0.97;
/// Tip-to-tip distance below which the proximity rule fires, in normalized
/// coordinate space.
pub const PROXIMITY_THRESHOLD: f32 = 0.05;

/// Unconfirmed per-frame classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
}

/// The closed set of recognized hand shapes. `matches` is the single
/// interpreter over a validated frame; every predicate is pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    OpenPalm,
    PeaceSign,
    ClosedFist,
    RaisedRing,
    OkSign,
    IlySign,
    RaisedIndex,
    RaisedIndexMiddle,
    ThumbsUp,
    RaisedPinky,
    RaisedIndexThumb,
    ThumbsDown,
    RaisedIndexPinky,
    RaisedIndexMiddleThumb,
    RaisedIndexRing,
    RaisedIndexMiddlePinky,
    RaisedThumbPinky,
}

impl GestureKind {
    /// Stable key used for profile phrase bindings.
    pub fn key(&self) -> &'static str {
        match self {
            GestureKind::OpenPalm => "open_palm",
            GestureKind::PeaceSign => "peace_sign",
            GestureKind::ClosedFist => "closed_fist",
            GestureKind::RaisedRing => "raised_ring",
            GestureKind::OkSign => "ok_sign",
            GestureKind::IlySign => "ily_sign",
            GestureKind::RaisedIndex => "raised_index",
            GestureKind::RaisedIndexMiddle => "raised_index_middle",
            GestureKind::ThumbsUp => "thumbs_up",
            GestureKind::RaisedPinky => "raised_pinky",
            GestureKind::RaisedIndexThumb => "raised_index_thumb",
            GestureKind::ThumbsDown => "thumbs_down",
            GestureKind::RaisedIndexPinky => "raised_index_pinky",
            GestureKind::RaisedIndexMiddleThumb => "raised_index_middle_thumb",
            GestureKind::RaisedIndexRing => "raised_index_ring",
            GestureKind::RaisedIndexMiddlePinky => "raised_index_middle_pinky",
            GestureKind::RaisedThumbPinky => "raised_thumb_pinky",
        }
    }

    pub fn matches(&self, f: &LandmarkFrame, proximity: f32) -> bool {
        let thumb_up = f.extended(THUMB_TIP, THUMB_MCP);
        let thumb_down = f.folded(THUMB_TIP, THUMB_MCP);
        let index_up = f.extended(INDEX_TIP, INDEX_PIP);
        let index_down = f.folded(INDEX_TIP, INDEX_PIP);
        let middle_up = f.extended(MIDDLE_TIP, MIDDLE_PIP);
        let middle_down = f.folded(MIDDLE_TIP, MIDDLE_PIP);
        let ring_up = f.extended(RING_TIP, RING_PIP);
        let ring_down = f.folded(RING_TIP, RING_PIP);
        let pinky_up = f.extended(PINKY_TIP, PINKY_PIP);
        let pinky_down = f.folded(PINKY_TIP, PINKY_PIP);

        match self {
            // Open palm and fist compare tips against the MCP knuckle row,
            // not the PIP joints.
            GestureKind::OpenPalm => {
                f.extended(INDEX_TIP, INDEX_MCP)
                    && f.extended(MIDDLE_TIP, MIDDLE_MCP)
                    && f.extended(RING_TIP, RING_MCP)
                    && f.extended(PINKY_TIP, PINKY_MCP)
            }
            GestureKind::ClosedFist => {
                f.folded(INDEX_TIP, INDEX_MCP)
                    && f.folded(MIDDLE_TIP, MIDDLE_MCP)
                    && f.folded(RING_TIP, RING_MCP)
                    && f.folded(PINKY_TIP, PINKY_MCP)
            }
            GestureKind::PeaceSign => index_up && middle_up && ring_down && pinky_down,
            GestureKind::RaisedRing => {
                ring_up && index_down && middle_down && pinky_down && thumb_down
            }
            GestureKind::OkSign => {
                f.point(THUMB_TIP).distance_to(f.point(INDEX_TIP)) < proximity
            }
            GestureKind::IlySign => {
                thumb_up && index_up && pinky_up && middle_down && ring_down
            }
            GestureKind::RaisedIndex => {
                index_up && middle_down && ring_down && pinky_down && thumb_down
            }
            GestureKind::RaisedIndexMiddle => {
                index_up && middle_up && ring_down && pinky_down && thumb_down
            }
            GestureKind::ThumbsUp => {
                thumb_up && index_down && middle_down && ring_down && pinky_down
            }
            GestureKind::RaisedPinky => {
                pinky_up && index_down && middle_down && ring_down && thumb_down
            }
            GestureKind::RaisedIndexThumb => {
                index_up && thumb_up && middle_down && ring_down && pinky_down
            }
            GestureKind::ThumbsDown => {
                thumb_down && index_down && middle_down && ring_down && pinky_down
            }
            GestureKind::RaisedIndexPinky => {
                index_up && pinky_up && middle_down && ring_down && thumb_down
            }
            GestureKind::RaisedIndexMiddleThumb => {
                thumb_up && index_up && middle_up && ring_down && pinky_down
            }
            GestureKind::RaisedIndexRing => {
                index_up && ring_up && middle_down && pinky_down && thumb_down
            }
            GestureKind::RaisedIndexMiddlePinky => {
                index_up && middle_up && pinky_up && thumb_down && ring_down
            }
            GestureKind::RaisedThumbPinky => {
                thumb_up && pinky_up && index_down && middle_down && ring_down
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: GestureKind,
    pub label: String,
}

/// Ordered rule list with first-match-wins evaluation.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    confidence: f32,
    proximity: f32,
}

/// Canonical vocabulary, in priority order. The upstream phrase map listed
/// some predicates twice with different phrases; those later entries were
/// unreachable under first-match-wins and are not carried here.
pub fn default_rules() -> Vec<Rule> {
    let table: &[(GestureKind, &str)] = &[
        (GestureKind::OpenPalm, "Hello, how are you?"),
        (GestureKind::PeaceSign, "Good morning!"),
        (GestureKind::ClosedFist, "Thank you very much."),
        (GestureKind::RaisedRing, "Please help me."),
        (GestureKind::OkSign, "Okay."),
        (GestureKind::IlySign, "I love you."),
        (GestureKind::RaisedIndex, "Can you repeat that?"),
        (GestureKind::RaisedIndexMiddle, "What's your name?"),
        (GestureKind::ThumbsUp, "Nice to meet you."),
        (GestureKind::RaisedPinky, "Excuse me."),
        (GestureKind::RaisedIndexThumb, "Yes, I understand."),
        (GestureKind::ThumbsDown, "No, I don't understand."),
        (GestureKind::RaisedIndexPinky, "Where is the bathroom?"),
        (GestureKind::RaisedIndexMiddleThumb, "How much does this cost?"),
        (GestureKind::RaisedIndexRing, "I need help."),
        (GestureKind::RaisedIndexMiddlePinky, "Goodbye!"),
        (GestureKind::RaisedThumbPinky, "Have a good day!"),
    ];
    table
        .iter()
        .map(|(kind, label)| Rule {
            kind: *kind,
            label: (*label).to_string(),
        })
        .collect()
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(default_rules(), LANDMARK_CONFIDENCE, PROXIMITY_THRESHOLD)
    }
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>, confidence: f32, proximity: f32) -> Self {
        let table = Self {
            rules,
            confidence,
            proximity,
        };
        table.flag_duplicates();
        table
    }

    /// Apply per-profile phrase overrides keyed by gesture name.
    pub fn with_phrases(mut self, phrases: &HashMap<String, String>) -> Self {
        for rule in &mut self.rules {
            if let Some(phrase) = phrases.get(rule.kind.key()) {
                rule.label = phrase.clone();
            }
        }
        self
    }

    /// A predicate kind appearing twice makes every entry after the first
    /// unreachable. Flag it loudly instead of resolving it in silence.
    fn flag_duplicates(&self) {
        let mut seen: HashMap<GestureKind, &str> = HashMap::new();
        for rule in &self.rules {
            if let Some(first) = seen.get(&rule.kind) {
                warn!(
                    "rule table: predicate {:?} already bound to '{first}'; \
                     entry '{}' is unreachable",
                    rule.kind, rule.label
                );
            } else {
                seen.insert(rule.kind, &rule.label);
            }
        }
    }

    /// First-match-wins classification of one landmark frame.
    pub fn classify(&self, frame: &LandmarkFrame) -> Option<Candidate> {
        self.rules
            .iter()
            .find(|r| r.kind.matches(frame, self.proximity))
            .map(|r| Candidate {
                label: r.label.clone(),
                confidence: self.confidence,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LANDMARK_COUNT, Landmark};

    // Neutral hand: every joint at the same height, nothing extended or
    // folded, no rule matches.
    fn neutral() -> Vec<Landmark> {
        (0..LANDMARK_COUNT)
            .map(|i| Landmark {
                x: 0.1 + 0.03 * i as f32,
                y: 0.5,
            })
            .collect()
    }

    fn frame(mutate: impl Fn(&mut Vec<Landmark>)) -> LandmarkFrame {
        let mut pts = neutral();
        mutate(&mut pts);
        LandmarkFrame::new(pts).unwrap()
    }

    fn open_palm() -> LandmarkFrame {
        frame(|pts| {
            for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
                pts[tip].y = 0.2;
            }
        })
    }

    #[test]
    fn open_palm_classifies_with_fixed_confidence() {
        let table = RuleTable::default();
        let cand = table.classify(&open_palm()).unwrap();
        assert_eq!(cand.label, "Hello, how are you?");
        assert_eq!(cand.confidence, LANDMARK_CONFIDENCE);
    }

    #[test]
    fn neutral_hand_yields_no_candidate() {
        let table = RuleTable::default();
        assert!(table.classify(&frame(|_| {})).is_none());
    }

    #[test]
    fn classify_is_deterministic() {
        let table = RuleTable::default();
        let f = open_palm();
        assert_eq!(table.classify(&f), table.classify(&f));
    }

    #[test]
    fn thumbs_up_wins_when_fingers_curl_past_pip_but_not_mcp() {
        let table = RuleTable::default();
        let f = frame(|pts| {
            pts[THUMB_TIP].y = 0.3;
            // Tips curl past the PIP row but straddle the knuckle row, so
            // neither OpenPalm nor ClosedFist (tip-vs-MCP tests) fires
            // first.
            for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
                pts[tip].y = 0.55;
            }
            pts[INDEX_MCP].y = 0.52;
            pts[MIDDLE_MCP].y = 0.6;
            pts[RING_MCP].y = 0.52;
            pts[PINKY_MCP].y = 0.6;
        });
        assert_eq!(table.classify(&f).unwrap().label, "Nice to meet you.");
    }

    #[test]
    fn deep_fist_with_raised_thumb_is_still_a_fist() {
        // Tips fully below the knuckle row match ClosedFist before ThumbsUp
        // ever gets evaluated; rule order is part of the contract.
        let table = RuleTable::default();
        let f = frame(|pts| {
            pts[THUMB_TIP].y = 0.3;
            for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
                pts[tip].y = 0.7;
            }
        });
        assert_eq!(table.classify(&f).unwrap().label, "Thank you very much.");
    }

    #[test]
    fn first_match_wins_on_overlapping_predicates() {
        // Fist with thumb and index tips touching satisfies both ClosedFist
        // and OkSign; ClosedFist appears earlier and must win.
        let table = RuleTable::default();
        let f = frame(|pts| {
            for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
                pts[tip].y = 0.8;
            }
            pts[THUMB_TIP] = pts[INDEX_TIP];
        });
        let touch_only = frame(|pts| {
            pts[THUMB_TIP] = Landmark { x: 0.9, y: 0.5 };
            pts[INDEX_TIP] = Landmark { x: 0.9, y: 0.5 };
        });
        assert!(GestureKind::OkSign.matches(&f, PROXIMITY_THRESHOLD));
        assert_eq!(table.classify(&f).unwrap().label, "Thank you very much.");
        // Proximity alone still reaches the OkSign rule.
        assert_eq!(table.classify(&touch_only).unwrap().label, "Okay.");
    }

    #[test]
    fn proximity_rule_respects_the_threshold() {
        let near = frame(|pts| {
            pts[THUMB_TIP] = Landmark { x: 0.50, y: 0.5 };
            pts[INDEX_TIP] = Landmark { x: 0.51, y: 0.5 };
        });
        let far = frame(|pts| {
            pts[THUMB_TIP] = Landmark { x: 0.50, y: 0.5 };
            pts[INDEX_TIP] = Landmark { x: 0.70, y: 0.5 };
        });
        assert!(GestureKind::OkSign.matches(&near, PROXIMITY_THRESHOLD));
        assert!(!GestureKind::OkSign.matches(&far, PROXIMITY_THRESHOLD));
    }

    #[test]
    fn phrase_overrides_rebind_labels() {
        let mut phrases = HashMap::new();
        phrases.insert("open_palm".to_string(), "Hi there".to_string());
        let table = RuleTable::default().with_phrases(&phrases);
        assert_eq!(table.classify(&open_palm()).unwrap().label, "Hi there");
    }
}
