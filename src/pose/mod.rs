pub mod keypoint;
pub mod metrics;

pub use keypoint::{Frame, Joint, Keypoint};
pub use metrics::{extract_metrics, PostureMetrics, CONFIDENCE_THRESHOLD};
