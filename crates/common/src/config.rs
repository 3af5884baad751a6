//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where rendered artifacts are written by default.
    pub output_dir: PathBuf,

    /// Default render settings.
    pub render: RenderDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default render parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDefaults {
    /// Output frame rate.
    pub fps: u32,

    /// How long a seek may stall before the render proceeds anyway (ms).
    pub seek_timeout_ms: u64,

    /// Progress is reported once every this many frames.
    pub progress_interval_frames: u64,

    /// Largest canvas the pipeline renders at.
    pub max_width: u32,
    pub max_height: u32,

    /// Byte size of the effect processor's buffer arena.
    pub arena_bytes: usize,

    /// Default container ("webm", "mp4", "raw").
    pub container: String,

    /// Default video codec ("vp8", "vp9", "h264", "h265", "raw").
    pub video_codec: String,

    /// Target video bitrate in kbps.
    pub bitrate_kbps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "nebula_render_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            render: RenderDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            seek_timeout_ms: 100,
            progress_interval_frames: 10,
            max_width: 1920,
            max_height: 1080,
            // Four 1080p RGBA frames: two transition inputs, one result, one spare.
            arena_bytes: 4 * 1920 * 1080 * 4,
            container: "webm".to_string(),
            video_codec: "vp8".to_string(),
            bitrate_kbps: 2500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Where [`AppConfig::load`] looks and [`AppConfig::save`] writes.
    pub fn path() -> PathBuf {
        config_file_path()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("nebula").join("config.json")
}

/// Default output directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("nebula")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults_match_pipeline_expectations() {
        let defaults = RenderDefaults::default();
        assert_eq!(defaults.fps, 30);
        assert_eq!(defaults.seek_timeout_ms, 100);
        assert_eq!(defaults.progress_interval_frames, 10);
        assert!(defaults.arena_bytes >= 3 * 1920 * 1080 * 4);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.render.container, "webm");
        assert_eq!(parsed.logging.level, "info");
    }
}
