use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::pose::PostureMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostureStatus {
    Good,
    Warning,
    Bad,
    #[default]
    Unknown,
}

impl PostureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostureStatus::Good => "good",
            PostureStatus::Warning => "warning",
            PostureStatus::Bad => "bad",
            PostureStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "good" => Ok(PostureStatus::Good),
            "warning" => Ok(PostureStatus::Warning),
            "bad" => Ok(PostureStatus::Bad),
            "unknown" => Ok(PostureStatus::Unknown),
            other => Err(anyhow!("unknown posture status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub warn: f64,
    pub bad: f64,
}

/// Degrees past which each metric counts as drifting (`warn`) or poor (`bad`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub spine: Threshold,
    pub neck: Threshold,
    pub shoulder: Threshold,
}

pub const THRESHOLDS: Thresholds = Thresholds {
    spine: Threshold { warn: 12.0, bad: 20.0 },
    neck: Threshold { warn: 10.0, bad: 18.0 },
    shoulder: Threshold { warn: 6.0, bad: 12.0 },
};

pub fn thresholds() -> Thresholds {
    THRESHOLDS
}

const PENALTY_PER_DEGREE: f64 = 4.0;

struct Rule {
    value: fn(&PostureMetrics) -> f64,
    threshold: Threshold,
    /// Degrees tolerated before the score starts dropping.
    baseline: f64,
    issue: &'static str,
}

fn spine_angle(metrics: &PostureMetrics) -> f64 {
    metrics.spine_angle
}

fn neck_tilt(metrics: &PostureMetrics) -> f64 {
    metrics.neck_tilt
}

fn shoulder_tilt(metrics: &PostureMetrics) -> f64 {
    metrics.shoulder_tilt
}

const RULES: [Rule; 3] = [
    Rule {
        value: spine_angle,
        threshold: THRESHOLDS.spine,
        baseline: 8.0,
        issue: "Straighten your spine",
    },
    Rule {
        value: neck_tilt,
        threshold: THRESHOLDS.neck,
        baseline: 8.0,
        issue: "Lift your chin slightly",
    },
    Rule {
        value: shoulder_tilt,
        threshold: THRESHOLDS.shoulder,
        baseline: 4.0,
        issue: "Level your shoulders",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: PostureStatus,
    pub score: u8,
    pub issues: Vec<String>,
}

/// Classify one set of metrics. Pure: the same metrics always produce the
/// same evaluation.
pub fn evaluate(metrics: &PostureMetrics) -> Evaluation {
    let mut status = PostureStatus::Good;
    let mut issues = Vec::new();
    let mut penalty = 0.0;

    for rule in &RULES {
        let value = (rule.value)(metrics);

        if value > rule.threshold.warn {
            issues.push(rule.issue.to_string());
            if status == PostureStatus::Good {
                status = PostureStatus::Warning;
            }
        }
        if value > rule.threshold.bad {
            status = PostureStatus::Bad;
        }

        penalty += (value - rule.baseline).max(0.0) * PENALTY_PER_DEGREE;
    }

    let score = (100.0 - penalty).round().clamp(0.0, 100.0) as u8;

    Evaluation {
        status,
        score,
        issues,
    }
}
