//! Calibration blob persistence.
//!
//! The blob is opaque and moved wholesale between the device and a file.
//! A missing or rejected file at startup is not fatal: the device keeps its
//! built-in calibration and one warning is logged.

use std::path::Path;

use crate::device::DeviceSession;
use crate::error::{GazeError, Result};

/// Largest calibration blob accepted in either direction
pub const MAX_CALIBRATION_BYTES: usize = 400_000;

/// Which calibration the device ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    DeviceDefault,
    Applied { bytes: usize },
}

/// Fetch the device's calibration and write it to `path`
pub fn save_calibration(device: &dyn DeviceSession, path: &Path) -> Result<usize> {
    let blob = device.calibration_blob()?;
    check_size(blob.len())?;
    std::fs::write(path, &blob)?;
    log::info!("Saved {} calibration bytes to {}", blob.len(), path.display());
    Ok(blob.len())
}

/// Read `path` and apply it to the device
pub fn apply_calibration_file(device: &dyn DeviceSession, path: &Path) -> Result<usize> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_CALIBRATION_BYTES as u64 {
        return Err(GazeError::Calibration(format!(
            "{} is {} bytes, over the {} byte limit",
            path.display(),
            size,
            MAX_CALIBRATION_BYTES
        )));
    }

    let blob = std::fs::read(path)?;
    check_size(blob.len())?;
    device
        .apply_calibration(&blob)
        .map_err(|e| GazeError::Calibration(e.to_string()))?;
    Ok(blob.len())
}

/// Apply the calibration at `path`, falling back to the device default
pub fn load_calibration(device: &dyn DeviceSession, path: &Path) -> CalibrationStatus {
    match apply_calibration_file(device, path) {
        Ok(bytes) => {
            log::info!("Applied calibration from {} ({} bytes)", path.display(), bytes);
            CalibrationStatus::Applied { bytes }
        }
        Err(e) => {
            log::warn!(
                "Calibration {} not applied ({}); using device default",
                path.display(),
                e
            );
            CalibrationStatus::DeviceDefault
        }
    }
}

fn check_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(GazeError::Calibration("calibration data is empty".to_string()));
    }
    if len > MAX_CALIBRATION_BYTES {
        return Err(GazeError::Calibration(format!(
            "calibration data is {} bytes, over the {} byte limit",
            len, MAX_CALIBRATION_BYTES
        )));
    }
    Ok(())
}
