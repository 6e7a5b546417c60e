//! Device session bring-up.
//!
//! Picks the first attached tracker and opens it, elevated when a usable
//! license file is supplied. A rejected or unreadable license is not fatal:
//! the session falls back to standard level with one warning.

use std::path::Path;
use std::sync::Arc;

use crate::device::{
    DeviceError, DeviceProvider, DeviceSession, DisplayArea, LicenseStatus, SessionLevel,
};
use crate::error::{GazeError, Result, StartupStage};

/// What happened to the license during `open_session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseOutcome {
    NotProvided,
    Accepted,
    /// Rejected with this status; the session is standard level
    Fallback(LicenseStatus),
}

/// An open device session plus how it was obtained
pub struct OpenedSession {
    pub url: String,
    pub device: Arc<dyn DeviceSession>,
    pub license: LicenseOutcome,
}

impl OpenedSession {
    pub fn level(&self) -> SessionLevel {
        self.device.info().session_level
    }
}

/// Open the first tracker `provider` reports
pub fn open_session(provider: &dyn DeviceProvider, license_path: Option<&Path>) -> Result<OpenedSession> {
    let urls = provider
        .enumerate()
        .map_err(|e| GazeError::startup(StartupStage::Enumeration, e))?;
    let url = urls.into_iter().next().ok_or_else(|| {
        GazeError::startup(
            StartupStage::Enumeration,
            DeviceError::NotFound("no eye trackers attached".to_string()),
        )
    })?;
    log::info!("Using eye tracker at {}", url);

    let Some(license_path) = license_path else {
        let device = open_standard(provider, &url)?;
        return Ok(OpenedSession {
            url,
            device,
            license: LicenseOutcome::NotProvided,
        });
    };

    let status = match std::fs::read(license_path) {
        Ok(license) => match provider.open(&url, Some(&license)) {
            Ok(device) => {
                log::info!("License {} accepted", license_path.display());
                return Ok(OpenedSession {
                    url,
                    device,
                    license: LicenseOutcome::Accepted,
                });
            }
            Err(DeviceError::License(status)) => status,
            Err(e) => return Err(GazeError::startup(StartupStage::License, e)),
        },
        Err(e) => {
            log::debug!("Cannot read license {}: {}", license_path.display(), e);
            LicenseStatus::Invalid
        }
    };

    match status {
        LicenseStatus::Expired => log::warn!(
            "License {} has expired; continuing with a standard session",
            license_path.display()
        ),
        _ => log::warn!(
            "License {} is invalid; continuing with a standard session",
            license_path.display()
        ),
    }

    let device = open_standard(provider, &url)?;
    Ok(OpenedSession {
        url,
        device,
        license: LicenseOutcome::Fallback(status),
    })
}

fn open_standard(provider: &dyn DeviceProvider, url: &str) -> Result<Arc<dyn DeviceSession>> {
    provider
        .open(url, None)
        .map_err(|e| GazeError::startup(StartupStage::Session, e))
}

/// Apply `area` to the device. Failure is a warning only.
pub fn apply_display_area(device: &dyn DeviceSession, area: DisplayArea) -> bool {
    match device.set_display_area(area) {
        Ok(()) => {
            log::info!(
                "Display area set to {:.1} x {:.1} mm",
                area.width_mm(),
                area.height_mm()
            );
            true
        }
        Err(e) => {
            log::warn!("Display area not applied: {}", e);
            false
        }
    }
}
