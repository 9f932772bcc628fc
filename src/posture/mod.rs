pub mod classifier;
pub mod snapshot;

pub use classifier::{evaluate, thresholds, Evaluation, PostureStatus, Thresholds};
pub use snapshot::Snapshot;
