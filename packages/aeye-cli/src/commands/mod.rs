pub mod calibration;
pub mod info;
pub mod record;
pub mod stream;

use aeye_gaze::correction::create_corrector;
use aeye_gaze::device::{create_provider, DeviceConfig};
use aeye_gaze::session::apply_display_area;
use aeye_gaze::streaming::MarkerDisplay;
use aeye_gaze::{load_calibration, open_session, AppConfig, GazeError, GazeStreamer, OpenedSession};
use anyhow::Context;
use std::path::Path;

use crate::cli::SourceArgs;

/// Load the config file named on the command line, or the default one
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let (config, used) = AppConfig::resolve(path)?;
    match used {
        Some(path) => log::info!("Using config {}", path.display()),
        None => log::info!("Using built-in configuration"),
    }
    Ok(config)
}

/// Apply command-line device overrides to `config`
pub fn apply_source(config: &mut AppConfig, source: &SourceArgs) -> anyhow::Result<()> {
    if let Some(rate) = source.rate {
        if !(rate.is_finite() && rate > 0.0) {
            let message = format!("rate must be positive, got {}", rate);
            return Err(GazeError::InvalidConfig(message).into());
        }
    }

    if let Some(path) = &source.replay {
        let rate_hz = match (&config.device, source.rate) {
            (_, Some(rate)) => rate,
            (DeviceConfig::Replay { rate_hz, .. }, None) => *rate_hz,
            (DeviceConfig::Simulated(sim), None) => sim.rate_hz,
        };
        config.device = DeviceConfig::Replay {
            path: path.clone(),
            rate_hz,
            loop_playback: false,
        };
    } else if let Some(rate) = source.rate {
        match &mut config.device {
            DeviceConfig::Simulated(sim) => sim.rate_hz = rate,
            DeviceConfig::Replay { rate_hz, .. } => *rate_hz = rate,
        }
    }

    if let Some(every) = source.invalid_every {
        match &mut config.device {
            DeviceConfig::Simulated(sim) => sim.invalid_every = every,
            DeviceConfig::Replay { .. } => {
                log::warn!("--invalid-every only applies to the simulated device")
            }
        }
    }

    Ok(())
}

/// Open the configured tracker, apply display area and calibration
pub fn open_device(config: &AppConfig) -> anyhow::Result<OpenedSession> {
    let provider = create_provider(&config.device).map_err(GazeError::from)?;
    let session = open_session(provider.as_ref(), config.license_path.as_deref())?;

    if let Some(area) = config.display.area() {
        apply_display_area(session.device.as_ref(), area);
    }
    if let Some(path) = &config.calibration_path {
        load_calibration(session.device.as_ref(), path);
    }
    Ok(session)
}

/// Streamer for `session` with the configured correction and marker
pub fn build_streamer(
    config: &AppConfig,
    session: &OpenedSession,
    cursor_capture: bool,
) -> anyhow::Result<GazeStreamer> {
    let mut builder = GazeStreamer::builder(session.device.clone(), config.streamer_config())
        .cursor_capture(cursor_capture);

    if let Some(model) = &config.model {
        let corrector = create_corrector(model).context("Failed to load gaze correction model")?;
        builder = builder.corrector(corrector);
    }
    if let Some(display) = marker_display(cursor_capture) {
        builder = builder.display(display);
    }

    Ok(builder.build())
}

#[cfg(feature = "pointer")]
fn marker_display(cursor_capture: bool) -> Option<Box<dyn MarkerDisplay>> {
    if !cursor_capture {
        return None;
    }
    match aeye_gaze::streaming::PointerDisplay::new() {
        Ok(display) => Some(Box::new(display)),
        Err(e) => {
            log::warn!("{}; the pointer will not move", e);
            None
        }
    }
}

#[cfg(not(feature = "pointer"))]
fn marker_display(cursor_capture: bool) -> Option<Box<dyn MarkerDisplay>> {
    if cursor_capture {
        log::warn!("Built without pointer support; cursor capture is simulated");
    }
    None
}
