pub mod calibration;
pub mod config;
pub mod correction;
pub mod device;
pub mod error;
pub mod session;
pub mod streaming;
pub mod types;

pub use calibration::{load_calibration, save_calibration, CalibrationStatus, MAX_CALIBRATION_BYTES};
pub use config::AppConfig;
pub use correction::{AffineCorrector, CoordCorrector, ModelConfig, RemoteCorrector};
pub use device::{DeviceConfig, DeviceError, DeviceProvider, DeviceSession};
pub use error::{GazeError, Result, StartupStage};
pub use session::{open_session, LicenseOutcome, OpenedSession};
pub use streaming::{
    ClockSync, CoordinateMapper, GazeEventLogger, GazeSampleBuffer, GazeStreamer,
    GazeStreamerConfig, MarkerPresenter, SnapshotExporter, StreamState, StreamStats,
};
pub use types::*;
