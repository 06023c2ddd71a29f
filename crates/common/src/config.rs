//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EfvResult;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session resource settings.
    pub session: SessionDefaults,

    /// Loopback simulation settings used by the CLI.
    pub simulation: SimulationDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Resource limits applied when a session is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    /// Capacity of the internal image source and the output writer.
    pub max_images: usize,

    /// Name given to the frame relay worker thread.
    pub relay_thread_name: String,
}

/// Parameters for a loopback session run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationDefaults {
    /// Preview frame rate produced by the loopback sensor.
    pub fps: u32,

    /// Number of preview frames to produce.
    pub frames: u32,

    /// Preview output width.
    pub preview_width: u32,

    /// Preview output height.
    pub preview_height: u32,

    /// Sensor active array width.
    pub active_array_width: i32,

    /// Sensor active array height.
    pub active_array_height: i32,

    /// Artificial latency of the loopback output surface per frame.
    pub forward_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "efv_session=trace,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            max_images: 10,
            relay_thread_name: "efv-image-relay".to_string(),
        }
    }
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            frames: 90,
            preview_width: 1920,
            preview_height: 1080,
            active_array_width: 4000,
            active_array_height: 3000,
            forward_delay_ms: 5,
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
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Read and parse the config file at `path`.
    pub fn load_from(path: &Path) -> EfvResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> EfvResult<()> {
        self.save_to(&config_file_path())
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> EfvResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Path the configuration is read from and saved to.
    pub fn path() -> PathBuf {
        config_file_path()
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
    base.join("efv").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EfvError;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "session": { "max_images": 4 } }"#).unwrap();
        assert_eq!(config.session.max_images, 4);
        assert_eq!(config.session.relay_thread_name, "efv-image-relay");
        assert_eq!(config.simulation.fps, 30);
        assert_eq!(config.logging.level, "info");
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("efv-config-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_save_then_load_from_path() {
        let path = scratch_path("saved/config.json");
        let mut config = AppConfig::default();
        config.session.max_images = 3;
        config.logging.json = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.session.max_images, 3);
        assert!(loaded.logging.json);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_errors_are_typed() {
        let missing = AppConfig::load_from(&scratch_path("missing/config.json"));
        assert!(matches!(missing, Err(EfvError::Io(_))));

        let path = scratch_path("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(EfvError::Json(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        assert!(AppConfig::path().ends_with("efv/config.json"));
    }
}
