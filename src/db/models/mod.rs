pub mod posture_sample;
pub mod session;

pub use posture_sample::PostureSample;
pub use session::{CaptureSession, SessionStatus};
