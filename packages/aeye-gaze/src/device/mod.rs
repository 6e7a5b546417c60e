// Eye-tracker device boundary
//
// The pipeline talks to hardware only through the `DeviceSession` and
// `DeviceProvider` traits. A vendor SDK binding implements both; the crate
// ships two software devices that need no hardware:
// - `SimulatedDevice`: synthetic fixations at a fixed rate
// - `ReplayDevice`: re-delivers a previously exported gaze log
//
// Delivery follows the usual tracker SDK pattern: subscribe a callback, then
// repeatedly wait for data and process pending callbacks on the same thread.

mod paced;
mod replay;
mod simulated;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::{EyeSample, Vec3};

pub use paced::{PacedDevice, SampleGenerator, CALIBRATION_MAGIC};
pub use replay::{ReplayDevice, ReplayGenerator, ReplayProvider};
pub use simulated::{SimulatedConfig, SimulatedDevice, SimulatedProvider, SyntheticGaze};

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported across the device boundary
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("License rejected: {0}")]
    License(LicenseStatus),

    #[error("Operation requires an elevated session")]
    InsufficientLicense,

    #[error("Already subscribed to the gaze stream")]
    AlreadySubscribed,

    #[error("Unknown subscription handle: {0}")]
    UnknownSubscription(u64),

    #[error("Calibration rejected: {0}")]
    Calibration(String),

    #[error("Device protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of validating a license against a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseStatus {
    Valid,
    Expired,
    Invalid,
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Expired => f.write_str("expired"),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}

/// Privilege level of an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLevel {
    Standard,
    Elevated,
}

/// Outcome of waiting for callback delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Data is pending; call `process_callbacks`
    Ready,
    /// Nothing arrived within the timeout
    TimedOut,
}

/// Token identifying an active gaze subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// One eye's reading as delivered by the device
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeReading {
    /// Whether the gaze point for this eye is trustworthy
    pub valid: bool,
    pub sample: EyeSample,
}

/// A raw binocular sample in the device clock domain
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceGazeSample {
    /// Device clock timestamp in microseconds
    pub device_timestamp_us: i64,
    pub left: EyeReading,
    pub right: EyeReading,
}

impl DeviceGazeSample {
    pub fn both_eyes_valid(&self) -> bool {
        self.left.valid && self.right.valid
    }
}

/// Per-sample callback invoked on the thread that calls `process_callbacks`
pub type GazeCallback = Box<dyn FnMut(&DeviceGazeSample) + Send>;

/// Descriptive device metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub url: String,
    pub serial_number: String,
    pub model: String,
    pub generation: String,
    pub firmware_version: String,
    pub integration_type: String,
    pub runtime_build_version: String,
    pub session_level: SessionLevel,
}

/// Physical display corners in tracker space (millimetres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayArea {
    pub top_left: Vec3,
    pub top_right: Vec3,
    pub bottom_left: Vec3,
}

impl DisplayArea {
    /// Display area for a tracker mounted at the bottom centre of the
    /// screen, shifted horizontally by `offset_mm`.
    pub fn basic(width_mm: f32, height_mm: f32, offset_mm: f32) -> Self {
        let half = width_mm / 2.0;
        Self {
            top_left: Vec3::new(offset_mm - half, height_mm, 0.0),
            top_right: Vec3::new(offset_mm + half, height_mm, 0.0),
            bottom_left: Vec3::new(offset_mm - half, 0.0, 0.0),
        }
    }

    pub fn width_mm(&self) -> f32 {
        self.top_right.x - self.top_left.x
    }

    pub fn height_mm(&self) -> f32 {
        self.top_left.y - self.bottom_left.y
    }
}

/// An open session with one eye tracker.
///
/// Methods take `&self`; implementations synchronize internally because the
/// ingestion worker, the clock refresher and the caller share one session.
pub trait DeviceSession: Send + Sync {
    fn info(&self) -> DeviceInfo;

    /// Nominal gaze output frequency in Hz
    fn output_frequency(&self) -> f32;

    fn subscribe(&self, callback: GazeCallback) -> DeviceResult<SubscriptionHandle>;

    fn unsubscribe(&self, handle: SubscriptionHandle) -> DeviceResult<()>;

    /// Block until data is pending or `timeout` elapses
    fn wait_for_callbacks(&self, timeout: Duration) -> DeviceResult<WaitOutcome>;

    /// Invoke the subscribed callback for every pending sample
    fn process_callbacks(&self) -> DeviceResult<()>;

    /// Current device clock in microseconds
    fn clock_now_us(&self) -> DeviceResult<i64>;

    /// Let the device re-align its internal clock; does not move host offsets
    fn update_timesync(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn calibration_blob(&self) -> DeviceResult<Vec<u8>>;

    fn apply_calibration(&self, blob: &[u8]) -> DeviceResult<()>;

    fn set_display_area(&self, _area: DisplayArea) -> DeviceResult<()> {
        Err(DeviceError::InsufficientLicense)
    }
}

/// Enumerates and opens devices
pub trait DeviceProvider: Send + Sync {
    /// URLs of the devices currently attached
    fn enumerate(&self) -> DeviceResult<Vec<String>>;

    /// Open `url`, elevated when a license is supplied and accepted
    fn open(&self, url: &str, license: Option<&[u8]>) -> DeviceResult<Arc<dyn DeviceSession>>;
}

/// Which software device backs the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceConfig {
    /// Synthetic gaze generator
    #[serde(rename = "simulated")]
    Simulated(SimulatedConfig),

    /// Replay of an exported gaze log
    #[serde(rename = "replay")]
    Replay {
        path: PathBuf,
        rate_hz: f32,
        #[serde(default)]
        loop_playback: bool,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::Simulated(SimulatedConfig::default())
    }
}

/// Create the provider described by `config`
pub fn create_provider(config: &DeviceConfig) -> DeviceResult<Box<dyn DeviceProvider>> {
    match config {
        DeviceConfig::Simulated(sim) => Ok(Box::new(SimulatedProvider::new(sim.clone()))),
        DeviceConfig::Replay {
            path,
            rate_hz,
            loop_playback,
        } => Ok(Box::new(ReplayProvider::new(
            path.clone(),
            *rate_hz,
            *loop_playback,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_display_area() {
        let area = DisplayArea::basic(698.5, 393.7, 0.0);
        assert!((area.width_mm() - 698.5).abs() < 1e-3);
        assert!((area.height_mm() - 393.7).abs() < 1e-3);
        assert!((area.top_left.x + 349.25).abs() < 1e-3);

        let shifted = DisplayArea::basic(600.0, 300.0, 20.0);
        assert!((shifted.top_left.x + 280.0).abs() < 1e-3);
        assert!((shifted.top_right.x - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_device_config_yaml() {
        let yaml = "type: replay\npath: /tmp/gaze.csv\nrate_hz: 60\n";
        let config: DeviceConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            DeviceConfig::Replay {
                rate_hz,
                loop_playback,
                ..
            } => {
                assert_eq!(rate_hz, 60.0);
                assert!(!loop_playback);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
