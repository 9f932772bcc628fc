//! Focus, stress and blink heuristics derived from head and shoulder
//! keypoints across consecutive frames.
//!
//! Every output here is a best-effort proxy. Yaw and pitch are pixel offsets
//! and ratios rather than calibrated angles, and the blink counter is sampled
//! (see [`BlinkSource`]). None of it is a clinical signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pose::{Frame, Joint, CONFIDENCE_THRESHOLD};
use crate::pose::metrics::Point;

use super::blink::{BlinkSource, RandomBlinkSource};

pub const DEFAULT_BLINK_PROBABILITY: f64 = 0.05;
const MAX_BLINK_RATE: u32 = 30;

const YAW_STRONG: f64 = 30.0;
const YAW_MILD: f64 = 15.0;
const PITCH_HEAD_DOWN: f64 = 0.8;
const FRONTAL_EAR_CONFIDENCE: f64 = 0.5;
const HEAD_MOVEMENT_PX: f64 = 20.0;
const RAISED_SHOULDER_GAP_PX: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessMetrics {
    /// Blinks per minute, capped at 30.
    pub blink_rate: u32,
    pub focus_score: u8,
    pub stress_level: u8,
    pub eye_openness: f64,
    pub is_blinking: bool,
}

/// Counters for one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Nose height on the previous usable frame. `None` right after a reset,
    /// so the first frame never counts as head movement.
    pub last_head_y: Option<f64>,
    pub blink_count: u32,
    pub session_start: DateTime<Utc>,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_head_y: None,
            blink_count: 0,
            session_start: now,
        }
    }
}

pub struct WellnessEstimator {
    state: SessionState,
    blink: Box<dyn BlinkSource>,
}

impl WellnessEstimator {
    pub fn new(blink: Box<dyn BlinkSource>, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::new(now),
            blink,
        }
    }

    pub fn with_probability(probability: f64, seed: Option<u64>, now: DateTime<Utc>) -> Self {
        let blink: Box<dyn BlinkSource> = match seed {
            Some(seed) => Box::new(RandomBlinkSource::seeded(probability, seed)),
            None => Box::new(RandomBlinkSource::new(probability)),
        };
        Self::new(blink, now)
    }

    /// Start a fresh session: clears head position, blink count and the
    /// session clock.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::new(now);
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns `None` when the nose or both ears are missing; callers keep
    /// showing the previous reading in that case.
    pub fn update(&mut self, frame: &Frame, now: DateTime<Utc>) -> Option<WellnessMetrics> {
        let nose = frame.confident(Joint::Nose, CONFIDENCE_THRESHOLD)?;
        let left_ear = frame.confident(Joint::LeftEar, CONFIDENCE_THRESHOLD);
        let right_ear = frame.confident(Joint::RightEar, CONFIDENCE_THRESHOLD);
        if left_ear.is_none() && right_ear.is_none() {
            return None;
        }
        let left_shoulder = frame.confident(Joint::LeftShoulder, CONFIDENCE_THRESHOLD);
        let right_shoulder = frame.confident(Joint::RightShoulder, CONFIDENCE_THRESHOLD);

        let head_yaw = match (left_ear, right_ear) {
            (Some(left), Some(right)) => (nose.x - (left.x + right.x) / 2.0).abs(),
            (Some(ear), None) | (None, Some(ear)) => (nose.x - ear.x).abs() / 2.0,
            (None, None) => 0.0,
        };

        let head_pitch = match (left_shoulder, right_shoulder) {
            (Some(left), Some(right)) => {
                let shoulder_mid_y = (left.y + right.y) / 2.0;
                let width = Point::distance(left.into(), right.into());
                let width = if width > 0.0 { width } else { 1.0 };
                (shoulder_mid_y - nose.y) / width
            }
            _ => 0.0,
        };

        let mut focus: i32 = 100;
        if head_yaw > YAW_STRONG {
            focus -= 30;
        } else if head_yaw > YAW_MILD {
            focus -= 15;
        }
        if head_pitch < PITCH_HEAD_DOWN {
            focus -= 20;
        }
        let frontal = matches!(
            (left_ear, right_ear),
            (Some(left), Some(right))
                if left.confidence > FRONTAL_EAR_CONFIDENCE && right.confidence > FRONTAL_EAR_CONFIDENCE
        );
        if frontal {
            focus = (focus + 10).min(100);
        }
        let focus_score = focus.clamp(0, 100) as u8;

        let mut stress: i32 = 0;
        if let Some(last_y) = self.state.last_head_y {
            if (nose.y - last_y).abs() > HEAD_MOVEMENT_PX {
                stress += 25;
            }
        }
        self.state.last_head_y = Some(nose.y);

        if let (Some(ls), Some(rs), Some(le), Some(re)) =
            (left_shoulder, right_shoulder, left_ear, right_ear)
        {
            let ear_to_shoulder = ((ls.y - le.y) + (rs.y - re.y)) / 2.0;
            if ear_to_shoulder < RAISED_SHOULDER_GAP_PX {
                stress += 30;
            }
        }
        let stress_level = stress.clamp(0, 100) as u8;

        if self.blink.sample() {
            self.state.blink_count += 1;
        }

        Some(WellnessMetrics {
            blink_rate: self.blink_rate(now),
            focus_score,
            stress_level,
            eye_openness: eye_openness(focus_score),
            is_blinking: false,
        })
    }

    fn blink_rate(&self, now: DateTime<Utc>) -> u32 {
        let elapsed_ms = (now - self.state.session_start).num_milliseconds();
        if elapsed_ms <= 0 {
            return 0;
        }
        let minutes = (elapsed_ms as f64 / 60_000.0).max(1.0);
        let rate = (self.state.blink_count as f64 / minutes).round() as u32;
        rate.min(MAX_BLINK_RATE)
    }
}

/// Coarse three-step proxy; nothing measures the eyes.
fn eye_openness(focus_score: u8) -> f64 {
    if focus_score > 70 {
        0.35
    } else if focus_score > 40 {
        0.25
    } else {
        0.15
    }
}
