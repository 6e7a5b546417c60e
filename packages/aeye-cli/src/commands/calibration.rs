use aeye_gaze::calibration::apply_calibration_file;
use aeye_gaze::save_calibration;
use anyhow::Context;
use std::path::Path;

use crate::cli::{CalibrationAction, CalibrationArgs};
use crate::commands::{load_config, open_device};
use crate::exit_codes;

pub fn execute(args: CalibrationArgs, config_path: Option<&Path>) -> i32 {
    match run(args, config_path) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => exit_codes::report(e),
    }
}

fn run(args: CalibrationArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    // The command manages calibration explicitly.
    config.calibration_path = None;
    let session = open_device(&config)?;

    match args.action {
        CalibrationAction::Save { file } => {
            let bytes = save_calibration(session.device.as_ref(), &file)
                .with_context(|| format!("Failed to save calibration to {}", file.display()))?;
            println!("Saved {} calibration bytes to {}", bytes, file.display());
        }
        CalibrationAction::Apply { file } => {
            let bytes = apply_calibration_file(session.device.as_ref(), &file)
                .with_context(|| format!("Failed to apply calibration {}", file.display()))?;
            println!("Applied {} calibration bytes from {}", bytes, file.display());
        }
    }
    Ok(())
}
