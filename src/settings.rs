use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::wellness::DEFAULT_BLINK_PROBABILITY;

/// Tunables for the capture pipeline and its periodic workers. Missing
/// fields in the settings file fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineSettings {
    pub min_frame_interval_ms: u64,
    pub emit_interval_ms: u64,
    pub persist_interval_secs: u64,
    pub analytics_refresh_secs: u64,
    pub analytics_timeout_secs: u64,
    pub break_interval_mins: u32,
    pub wellness_alert_interval_mins: u32,
    pub blink_probability: f64,
    /// Fixes the blink sampler for reproducible runs.
    pub blink_seed: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 100,
            emit_interval_ms: 200,
            persist_interval_secs: 60,
            analytics_refresh_secs: 300,
            analytics_timeout_secs: 10,
            break_interval_mins: 45,
            wellness_alert_interval_mins: 20,
            blink_probability: DEFAULT_BLINK_PROBABILITY,
            blink_seed: None,
        }
    }
}

impl PipelineSettings {
    /// Raises the periodic worker intervals to at least one second. Tokio
    /// timers reject a zero period.
    pub fn normalized(mut self) -> Self {
        for (name, secs) in [
            ("persistIntervalSecs", &mut self.persist_interval_secs),
            ("analyticsRefreshSecs", &mut self.analytics_refresh_secs),
            ("analyticsTimeoutSecs", &mut self.analytics_timeout_secs),
        ] {
            if *secs == 0 {
                warn!("{name} must be at least 1 second, using 1");
                *secs = 1;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    pipeline: PipelineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`. A missing or unreadable-as-JSON file yields defaults;
    /// only I/O errors on an existing file are reported.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: UserSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };
        data.pipeline = data.pipeline.normalized();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn pipeline(&self) -> PipelineSettings {
        self.read().pipeline.clone()
    }

    pub fn update_pipeline(&self, settings: PipelineSettings) -> Result<()> {
        let mut guard = self.write();
        guard.pipeline = settings.normalized();
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let mut data: UserSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        data.pipeline = data.pipeline.normalized();
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
