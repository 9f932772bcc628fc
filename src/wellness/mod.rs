pub mod blink;
pub mod estimator;

pub use blink::{BlinkSource, RandomBlinkSource};
pub use estimator::{SessionState, WellnessEstimator, WellnessMetrics, DEFAULT_BLINK_PROBABILITY};
