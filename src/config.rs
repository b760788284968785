use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sample rate the segmentation core operates at. Input files at other
    /// rates are resampled on load.
    pub sample_rate: u32,
    /// Target loop length in seconds before the end is quantized to the
    /// nearest onset.
    pub bar_size: f32,
    /// Number of parallel workers for batch mode. 0 = auto-detect
    /// (cores / 2, min 1).
    pub workers: usize,
    /// Background task pacing.
    pub task: TaskTiming,
}

/// Pacing of the background segmentation task: a lead-in pause before the
/// unit loop starts and a settling pause between units. Both waits are
/// bounded and wake early on cancellation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskTiming {
    /// Pause after the initial status update, in milliseconds.
    pub lead_in_ms: u64,
    /// Pause between units, in milliseconds.
    pub settle_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            bar_size: crate::DEFAULT_BAR_SIZE,
            workers: 0,
            task: TaskTiming::default(),
        }
    }
}

impl Default for TaskTiming {
    fn default() -> Self {
        Self {
            lead_in_ms: 2000,
            settle_ms: 500,
        }
    }
}

impl TaskTiming {
    /// Zero-delay timing for tests and batch mode, where pacing only slows
    /// things down.
    pub fn immediate() -> Self {
        Self {
            lead_in_ms: 0,
            settle_ms: 0,
        }
    }

    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl AppConfig {
    /// Load config from `~/.config/loopsmith/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to parse {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!(
                        "Failed to read {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
