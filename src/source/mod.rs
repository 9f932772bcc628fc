//! Pull-based keypoint input. The detector itself lives outside this crate;
//! anything that can hand over [`Frame`]s implements [`KeypointSource`].

pub mod replay;

use async_trait::async_trait;
use thiserror::Error;

use crate::pose::Frame;

pub use replay::ReplaySource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Transient: the detector is loading, busy or briefly gone.
    #[error("keypoint detector unavailable: {0}")]
    Unavailable(String),
    /// Terminal: the device or stream is gone for good.
    #[error("keypoint source lost: {0}")]
    Lost(String),
}

#[async_trait]
pub trait KeypointSource: Send {
    /// Next frame from the detector. Must be cancel-safe: dropping the
    /// returned future before it resolves must not lose a frame.
    async fn next_frame(&mut self) -> Result<Frame, SourceError>;

    /// Frees the underlying device. Called once when capture stops.
    async fn release(&mut self);
}
