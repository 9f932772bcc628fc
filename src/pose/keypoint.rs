use serde::{Deserialize, Deserializer, Serialize};

/// Joints the scoring pipeline reads from a frame.
///
/// Upstream detectors disagree on naming (`left_shoulder` vs `leftShoulder`);
/// [`Joint::from_alias`] maps every known spelling onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

const JOINT_ALIASES: &[(Joint, &[&str])] = &[
    (Joint::Nose, &["nose", "Nose"]),
    (Joint::LeftEar, &["left_ear", "leftEar", "LeftEar"]),
    (Joint::RightEar, &["right_ear", "rightEar", "RightEar"]),
    (
        Joint::LeftShoulder,
        &["left_shoulder", "leftShoulder", "LeftShoulder"],
    ),
    (
        Joint::RightShoulder,
        &["right_shoulder", "rightShoulder", "RightShoulder"],
    ),
    (Joint::LeftHip, &["left_hip", "leftHip", "LeftHip"]),
    (Joint::RightHip, &["right_hip", "rightHip", "RightHip"]),
];

impl Joint {
    pub fn from_alias(name: &str) -> Option<Self> {
        JOINT_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&name))
            .map(|(joint, _)| *joint)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
        }
    }
}

/// A single 2D joint estimate in image space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Upstream joint name, resolved lazily through [`Joint::from_alias`].
    #[serde(alias = "part")]
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Detectors that omit a score, or send `null`, are treated as zero
    /// confidence.
    #[serde(alias = "score", default, deserialize_with = "confidence_or_zero")]
    pub confidence: f64,
}

fn confidence_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            confidence,
        }
    }

    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

/// All keypoints reported for one instant. No ordering guarantee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub keypoints: Vec<Keypoint>,
    /// Capture time in epoch milliseconds, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl Frame {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            timestamp_ms: None,
        }
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints
            .iter()
            .find(|point| Joint::from_alias(&point.name) == Some(joint))
    }

    /// Like [`Frame::get`] but drops joints below `threshold`.
    pub fn confident(&self, joint: Joint, threshold: f64) -> Option<&Keypoint> {
        self.get(joint).filter(|point| point.is_confident(threshold))
    }
}
