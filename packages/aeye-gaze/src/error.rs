use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::device::DeviceError;

/// The stage of pipeline bring-up that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Enumeration,
    Session,
    License,
    Calibration,
    ClockSync,
    Subscribe,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enumeration => "device enumeration",
            Self::Session => "device session",
            Self::License => "license",
            Self::Calibration => "calibration",
            Self::ClockSync => "clock synchronization",
            Self::Subscribe => "gaze stream subscription",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum GazeError {
    #[error("Startup failed during {stage}: {source}")]
    Startup {
        stage: StartupStage,
        #[source]
        source: DeviceError,
    },

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Gaze stream worker failed: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Coordinate correction failed: {0}")]
    Correction(String),

    #[error("Marker display error: {0}")]
    Display(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GazeError {
    pub fn startup(stage: StartupStage, source: DeviceError) -> Self {
        Self::Startup { stage, source }
    }

    /// The failing startup stage, if this error came from bring-up.
    pub fn stage(&self) -> Option<StartupStage> {
        match self {
            Self::Startup { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GazeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_message_names_stage() {
        let err = GazeError::startup(
            StartupStage::Enumeration,
            DeviceError::NotFound("no eye trackers attached".into()),
        );
        assert_eq!(err.stage(), Some(StartupStage::Enumeration));
        assert_eq!(
            err.to_string(),
            "Startup failed during device enumeration: Device not found: no eye trackers attached"
        );

        let err = GazeError::Worker("gone".into());
        assert_eq!(err.stage(), None);
    }
}
