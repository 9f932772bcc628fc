use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::time::Duration;

use crate::pose::Frame;

use super::{KeypointSource, SourceError};

/// Plays back recorded frames, one JSON object per line.
///
/// Each frame is delivered `pace` after the previous one. Once the recording
/// runs out the source reports [`SourceError::Lost`].
pub struct ReplaySource {
    frames: VecDeque<Frame>,
    pace: Duration,
    released: Arc<AtomicBool>,
}

impl ReplaySource {
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>, pace: Duration) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            pace,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_jsonl(raw: &str, pace: Duration) -> Result<Self> {
        let mut frames = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Frame = serde_json::from_str(line)
                .with_context(|| format!("invalid frame on line {}", index + 1))?;
            frames.push(frame);
        }
        Ok(Self::from_frames(frames, pace))
    }

    pub fn from_path(path: &Path, pace: Duration) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read frames from {}", path.display()))?;
        Self::from_jsonl(&raw, pace)
            .with_context(|| format!("failed to parse frames in {}", path.display()))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Shared flag that flips once [`KeypointSource::release`] has run.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl KeypointSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(SourceError::Lost("source released".into()));
        }
        // Sleep before popping so a cancelled poll leaves the queue intact.
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        self.frames
            .pop_front()
            .ok_or_else(|| SourceError::Lost("replay exhausted".into()))
    }

    async fn release(&mut self) {
        self.frames.clear();
        self.released.store(true, Ordering::SeqCst);
    }
}
