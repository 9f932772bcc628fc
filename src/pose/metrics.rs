//! Geometric posture metrics from a single keypoint frame.
//!
//! Angles are image-space proxies: they are measured on the 2D projection and
//! discard direction, so leaning left and leaning right by the same amount
//! produce the same value.

use serde::{Deserialize, Serialize};

use super::keypoint::{Frame, Joint, Keypoint};

/// Joints below this confidence are treated as missing.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

const REQUIRED_JOINTS: [Joint; 6] = [
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
    Joint::LeftEar,
    Joint::RightEar,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureMetrics {
    /// Hip-mid to shoulder-mid, degrees from vertical.
    pub spine_angle: f64,
    /// Shoulder-mid to ear-mid, degrees from vertical.
    pub neck_tilt: f64,
    /// Left to right shoulder, degrees from horizontal.
    pub shoulder_tilt: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn midpoint(a: Point, b: Point) -> Point {
        Point {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    }

    pub fn distance(a: Point, b: Point) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }
}

impl From<&Keypoint> for Point {
    fn from(point: &Keypoint) -> Self {
        Point {
            x: point.x,
            y: point.y,
        }
    }
}

/// Angle between the `a -> b` vector and the vertical axis, in [0, 90].
pub(crate) fn angle_from_vertical(a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx.abs().atan2(dy.abs()).to_degrees()
}

/// Angle between the `a -> b` vector and the horizontal axis, in [0, 90].
pub(crate) fn angle_from_horizontal(a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dy.abs().atan2(dx.abs()).to_degrees()
}

/// Returns `None` when any of the six torso/head joints is missing or below
/// [`CONFIDENCE_THRESHOLD`]. That is the common case while the user is
/// settling into frame and is not an error.
pub fn extract_metrics(frame: &Frame) -> Option<PostureMetrics> {
    let joints = REQUIRED_JOINTS.map(|joint| frame.confident(joint, CONFIDENCE_THRESHOLD));
    let [Some(left_shoulder), Some(right_shoulder), Some(left_hip), Some(right_hip), Some(left_ear), Some(right_ear)] =
        joints
    else {
        return None;
    };

    let shoulder_mid = Point::midpoint(left_shoulder.into(), right_shoulder.into());
    let hip_mid = Point::midpoint(left_hip.into(), right_hip.into());
    let ear_mid = Point::midpoint(left_ear.into(), right_ear.into());

    let confidence = [
        left_shoulder,
        right_shoulder,
        left_hip,
        right_hip,
        left_ear,
        right_ear,
    ]
    .iter()
    .map(|point| point.confidence)
    .sum::<f64>()
        / REQUIRED_JOINTS.len() as f64;

    Some(PostureMetrics {
        spine_angle: angle_from_vertical(hip_mid, shoulder_mid),
        neck_tilt: angle_from_vertical(shoulder_mid, ear_mid),
        shoulder_tilt: angle_from_horizontal(left_shoulder.into(), right_shoulder.into()),
        confidence: confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Upright torso facing the camera, image coordinates (y grows downward).
    pub(crate) fn upright_frame() -> Frame {
        Frame::new(vec![
            Keypoint::new("nose", 320.0, 120.0, 0.95),
            Keypoint::new("left_ear", 350.0, 110.0, 0.9),
            Keypoint::new("right_ear", 290.0, 110.0, 0.9),
            Keypoint::new("left_shoulder", 400.0, 240.0, 0.9),
            Keypoint::new("right_shoulder", 240.0, 240.0, 0.9),
            Keypoint::new("left_hip", 380.0, 480.0, 0.8),
            Keypoint::new("right_hip", 260.0, 480.0, 0.8),
        ])
    }

    fn with_point(frame: &Frame, name: &str, x: f64, y: f64, confidence: f64) -> Frame {
        let mut frame = frame.clone();
        frame.keypoints.retain(|point| point.name != name);
        frame.keypoints.push(Keypoint::new(name, x, y, confidence));
        frame
    }

    #[test]
    fn test_upright_frame_is_near_zero() {
        let metrics = extract_metrics(&upright_frame()).expect("all joints present");
        assert!(metrics.spine_angle.abs() < 1e-9);
        assert!(metrics.neck_tilt.abs() < 1e-9);
        assert!(metrics.shoulder_tilt.abs() < 1e-9);
        assert!((metrics.confidence - (0.9 * 4.0 + 0.8 * 2.0) / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_head_raises_neck_tilt() {
        // Ears shifted 130px sideways over a 130px vertical gap: 45 degrees.
        let frame = with_point(&upright_frame(), "left_ear", 480.0, 110.0, 0.9);
        let frame = with_point(&frame, "right_ear", 420.0, 110.0, 0.9);
        let metrics = extract_metrics(&frame).unwrap();
        assert!((metrics.neck_tilt - 45.0).abs() < 1e-9, "{}", metrics.neck_tilt);
    }

    #[test]
    fn test_lean_direction_is_ignored() {
        let left = with_point(&upright_frame(), "left_shoulder", 380.0, 240.0, 0.9);
        let left = with_point(&left, "right_shoulder", 220.0, 240.0, 0.9);
        let right = with_point(&upright_frame(), "left_shoulder", 420.0, 240.0, 0.9);
        let right = with_point(&right, "right_shoulder", 260.0, 240.0, 0.9);
        let left_metrics = extract_metrics(&left).unwrap();
        let right_metrics = extract_metrics(&right).unwrap();
        assert!(left_metrics.spine_angle > 0.0);
        assert!((left_metrics.spine_angle - right_metrics.spine_angle).abs() < 1e-9);

        let left_high = with_point(&upright_frame(), "left_shoulder", 400.0, 230.0, 0.9);
        let right_high = with_point(&upright_frame(), "right_shoulder", 240.0, 230.0, 0.9);
        let left_high = extract_metrics(&left_high).unwrap();
        let right_high = extract_metrics(&right_high).unwrap();
        assert!(left_high.shoulder_tilt > 0.0);
        assert!((left_high.shoulder_tilt - right_high.shoulder_tilt).abs() < 1e-9);
    }

    #[test]
    fn test_missing_joint_is_undetermined() {
        let mut frame = upright_frame();
        frame.keypoints.retain(|point| point.name != "right_hip");
        assert!(extract_metrics(&frame).is_none());
    }

    #[test]
    fn test_low_confidence_joint_is_undetermined() {
        let frame = with_point(&upright_frame(), "left_ear", 350.0, 110.0, 0.29);
        assert!(extract_metrics(&frame).is_none());

        let frame = with_point(&upright_frame(), "left_ear", 350.0, 110.0, 0.3);
        assert!(extract_metrics(&frame).is_some());
    }

    #[test]
    fn test_camel_case_names_are_accepted() {
        let frame = Frame::new(
            upright_frame()
                .keypoints
                .into_iter()
                .map(|mut point| {
                    point.name = match point.name.as_str() {
                        "left_shoulder" => "leftShoulder".into(),
                        "right_hip" => "rightHip".into(),
                        _ => point.name,
                    };
                    point
                })
                .collect(),
        );
        assert!(extract_metrics(&frame).is_some());
    }

    #[test]
    fn test_angles_stay_in_range() {
        let offsets = [-500.0, -120.0, -3.0, 0.0, 7.5, 64.0, 900.0];
        for &dx in &offsets {
            for &dy in &offsets {
                let frame = with_point(&upright_frame(), "left_shoulder", 400.0 + dx, 240.0 + dy, 1.0);
                let frame = with_point(&frame, "right_ear", 290.0 - dy, 110.0 + dx, 0.3);
                let metrics = extract_metrics(&frame).unwrap();
                for angle in [metrics.spine_angle, metrics.neck_tilt, metrics.shoulder_tilt] {
                    assert!((0.0..=90.0).contains(&angle), "angle {} for dx={} dy={}", angle, dx, dy);
                }
                assert!((0.0..=1.0).contains(&metrics.confidence));
            }
        }
    }
}
