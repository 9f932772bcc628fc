pub mod controller;
pub mod loop_worker;
pub mod persistence;
pub mod state;

pub use controller::CaptureController;
pub use loop_worker::{FrameOutcome, FrameProcessor};
pub use persistence::{persistence_loop, SampleSink};
pub use state::{CaptureCommand, CaptureConfig, CaptureExit, CaptureFeed, PipelineStatus};
