use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowsingSettings {
    pub urls: Vec<String>,
    pub interval_secs: u64,
}

impl Default for BrowsingSettings {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://www.apple.com".into(),
                "https://www.google.com".into(),
                "https://www.github.com".into(),
            ],
            interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub blur_sigma: f32,
    pub frame_interval_ms: u64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            blur_sigma: 10.0,
            // ~30 fps
            frame_interval_ms: 33,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeavyLoadSettings {
    /// Trig iterations between two checks of the cancellation token.
    pub trig_iterations_per_pass: u32,
    pub chunk_count: usize,
    pub chunk_bytes: usize,
    pub pause_ms: u64,
}

impl Default for HeavyLoadSettings {
    fn default() -> Self {
        Self {
            trig_iterations_per_pass: 200_000,
            chunk_count: 10,
            chunk_bytes: 10 * 1024 * 1024,
            pause_ms: 50,
        }
    }
}

/// Tunables for the tester. The critical floor and bucket width have no
/// documented origin, so they live here instead of in code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TesterSettings {
    /// Fraction at or below which a running test is aborted and a checkpoint forced.
    pub critical_floor: f64,
    /// Width in percentage points of the checkpoint buckets.
    pub bucket_width: i64,
    pub poll_interval_secs: u64,
    pub sample_interval_secs: u64,
    /// Sampling ticks between two progress summaries in the test log.
    pub summary_every_ticks: u64,
    pub sleep_reason: String,
    pub browsing: BrowsingSettings,
    pub video: VideoSettings,
    pub heavy_load: HeavyLoadSettings,
}

impl Default for TesterSettings {
    fn default() -> Self {
        Self {
            critical_floor: 0.02,
            bucket_width: 5,
            poll_interval_secs: 10,
            sample_interval_secs: 1,
            summary_every_ticks: 60,
            sleep_reason: "Battery Life Test in Progress".into(),
            browsing: BrowsingSettings::default(),
            video: VideoSettings::default(),
            heavy_load: HeavyLoadSettings::default(),
        }
    }
}

impl TesterSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    /// Applies `DRAINLAB_DEBUG`, which logs a summary on every sampling tick.
    pub fn with_env_overrides(mut self) -> Self {
        let debug_mode = std::env::var("DRAINLAB_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.summary_every_ticks = 1;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: TesterSettings,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing or corrupt file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings at {}: {err}", path.display());
                TesterSettings::default()
            })
        } else {
            TesterSettings::default()
        };

        Ok(Self { path, data })
    }

    pub fn tester(&self) -> TesterSettings {
        self.data.clone()
    }

    /// Writes the loaded settings out when no file exists yet, so a first run
    /// leaves an editable `settings.json` behind. Returns whether it wrote.
    pub fn write_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.persist(&self.data)?;
        Ok(true)
    }

    fn persist(&self, data: &TesterSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let settings = store.tester();
        assert_eq!(settings, TesterSettings::default());
        assert_eq!(settings.critical_floor, 0.02);
        assert_eq!(settings.bucket_width, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"critical_floor": 0.05, "video": {"width": 640}}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().tester();
        assert_eq!(settings.critical_floor, 0.05);
        assert_eq!(settings.bucket_width, 5);
        assert_eq!(settings.video.width, 640);
        assert_eq!(settings.video.height, 1080);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = SettingsStore::new(path).unwrap().tester();
        assert_eq!(settings, TesterSettings::default());
    }

    #[test]
    fn first_run_leaves_an_editable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        assert!(store.write_if_missing().unwrap());
        assert!(!store.write_if_missing().unwrap());

        let reloaded = SettingsStore::new(path).unwrap().tester();
        assert_eq!(reloaded, TesterSettings::default());
    }

    #[test]
    fn existing_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"bucket_width": 10}"#).unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert!(!store.write_if_missing().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"bucket_width": 10}"#);
        assert_eq!(store.tester().bucket_width, 10);
    }
}
