//! Application configuration.
//!
//! Loaded from YAML; every section and field has a default, so an empty
//! file (or no file at all) yields a working simulated setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::correction::ModelConfig;
use crate::device::{DeviceConfig, DisplayArea};
use crate::error::{GazeError, Result};
use crate::streaming::{EventLogConfig, GazeStreamerConfig};
use crate::types::DisplaySize;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Physical and logical display geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width_px: u32,
    pub height_px: u32,
    /// Physical size; 0 leaves the tracker's display area untouched
    pub width_mm: f32,
    pub height_mm: f32,
    /// Horizontal tracker offset from the display centre
    pub mount_offset_mm: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width_px: 1920,
            height_px: 1080,
            width_mm: 0.0,
            height_mm: 0.0,
            mount_offset_mm: 0.0,
        }
    }
}

impl DisplayConfig {
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width_px, self.height_px)
    }

    /// Tracker display area, when the physical size is known
    pub fn area(&self) -> Option<DisplayArea> {
        (self.width_mm > 0.0 && self.height_mm > 0.0)
            .then(|| DisplayArea::basic(self.width_mm, self.height_mm, self.mount_offset_mm))
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub mark_freq: u32,
    pub buffer_capacity: usize,
    pub smoothing_window: usize,
    pub wait_timeout_ms: u64,
    /// 0 disables the refresh thread
    pub clock_refresh_secs: u64,
    pub clock_refresh_resyncs: bool,
    pub cursor_capture: bool,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            mark_freq: 10,
            buffer_capacity: 450_000,
            smoothing_window: 5,
            wait_timeout_ms: 100,
            clock_refresh_secs: 10,
            clock_refresh_resyncs: false,
            cursor_capture: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub gaze: GazeConfig,
    pub calibration_path: Option<PathBuf>,
    pub license_path: Option<PathBuf>,
    pub model: Option<ModelConfig>,
    pub event_log: EventLogConfig,
}

impl AppConfig {
    /// `<config dir>/aeye/config.yaml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("aeye").join(CONFIG_FILE_NAME))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    /// Load and validate `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GazeError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Explicit path if given (must exist), else the default path if it
    /// exists, else built-in defaults. Also returns the file used.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                Ok((config, Some(path)))
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.width_px == 0 || self.display.height_px == 0 {
            return Err(GazeError::InvalidConfig(
                "display resolution must be non-zero".to_string(),
            ));
        }
        if self.gaze.mark_freq == 0 {
            return Err(GazeError::InvalidConfig("mark_freq must be at least 1".to_string()));
        }
        if self.gaze.buffer_capacity == 0 {
            return Err(GazeError::InvalidConfig(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.gaze.smoothing_window == 0 {
            return Err(GazeError::InvalidConfig(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn streamer_config(&self) -> GazeStreamerConfig {
        GazeStreamerConfig {
            display: self.display.size(),
            buffer_capacity: self.gaze.buffer_capacity,
            mark_freq: self.gaze.mark_freq,
            smoothing_window: self.gaze.smoothing_window,
            wait_timeout: Duration::from_millis(self.gaze.wait_timeout_ms.max(1)),
            clock_refresh: (self.gaze.clock_refresh_secs > 0)
                .then(|| Duration::from_secs(self.gaze.clock_refresh_secs)),
            clock_refresh_resyncs: self.gaze.clock_refresh_resyncs,
            ..Default::default()
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = AppConfig::from_yaml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.gaze.buffer_capacity, 450_000);
        assert_eq!(config.gaze.mark_freq, 10);
        assert!(config.validate().is_ok());
        assert!(config.display.area().is_none());
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
display:
  width_px: 2560
  height_px: 1440
  width_mm: 597.0
  height_mm: 336.0
gaze:
  mark_freq: 3
  clock_refresh_secs: 0
model:
  type: affine
  path: /etc/aeye/model.yaml
device:
  type: simulated
  rate_hz: 120
  invalid_every: 9
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.display.size(), DisplaySize::new(2560, 1440));
        assert_eq!(config.gaze.smoothing_window, 5);
        assert!(config.display.area().is_some());
        assert!(matches!(config.model, Some(ModelConfig::Affine { .. })));
        match &config.device {
            DeviceConfig::Simulated(sim) => {
                assert_eq!(sim.rate_hz, 120.0);
                assert_eq!(sim.invalid_every, 9);
                assert_eq!(sim.dwell_samples, 45);
            }
            other => panic!("unexpected device: {:?}", other),
        }

        let streamer = config.streamer_config();
        assert_eq!(streamer.mark_freq, 3);
        assert_eq!(streamer.clock_refresh, None);
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.gaze.mark_freq = 0;
        assert!(matches!(config.validate(), Err(GazeError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.display.height_px = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gaze.smoothing_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_and_resolve() {
        assert!(matches!(
            AppConfig::load(Path::new("/nonexistent/aeye.yaml")),
            Err(GazeError::ConfigNotFound(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gaze:\n  buffer_capacity: 1000").unwrap();
        let (config, used) = AppConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(config.gaze.buffer_capacity, 1000);
        assert_eq!(used.as_deref(), Some(file.path()));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "gaze: [1, 2").unwrap();
        assert!(matches!(
            AppConfig::load(bad.path()),
            Err(GazeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let text = AppConfig::default().to_yaml().unwrap();
        assert_eq!(AppConfig::from_yaml_str(&text).unwrap(), AppConfig::default());
    }
}
