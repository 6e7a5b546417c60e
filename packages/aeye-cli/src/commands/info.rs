use aeye_gaze::device::DeviceInfo;
use aeye_gaze::{AppConfig, LicenseOutcome};
use serde::Serialize;
use std::path::Path;

use crate::cli::InfoArgs;
use crate::commands::{load_config, open_device};
use crate::exit_codes;
use crate::output;

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    device: DeviceInfo,
    output_frequency_hz: f32,
    license: String,
    config: AppConfig,
}

pub fn execute(args: InfoArgs, config_path: Option<&Path>) -> i32 {
    match run(&args, config_path) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => exit_codes::report(e),
    }
}

fn run(args: &InfoArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let session = open_device(&config)?;

    let license = match session.license {
        LicenseOutcome::NotProvided => "none".to_string(),
        LicenseOutcome::Accepted => "accepted".to_string(),
        LicenseOutcome::Fallback(status) => format!("{} (standard session)", status),
    };

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        device: session.device.info(),
        output_frequency_hz: session.device.output_frequency(),
        license,
        config,
    };

    if args.json {
        return output::print_json(&info);
    }

    println!("aeye CLI v{}", info.cli_version);
    println!();
    println!("Address:          {}", info.device.url);
    println!("Serial number:    {}", info.device.serial_number);
    println!("Model:            {}", info.device.model);
    println!("Generation:       {}", info.device.generation);
    println!("Firmware version: {}", info.device.firmware_version);
    println!("Integration:      {}", info.device.integration_type);
    println!("Runtime build:    {}", info.device.runtime_build_version);
    println!("Session level:    {:?}", info.device.session_level);
    println!("Output frequency: {} Hz", info.output_frequency_hz);
    println!("License:          {}", info.license);
    println!();
    println!(
        "Display:          {} x {} px",
        info.config.display.width_px, info.config.display.height_px
    );
    println!(
        "Buffer capacity:  {} samples",
        info.config.gaze.buffer_capacity
    );
    println!("Mark frequency:   every {} samples", info.config.gaze.mark_freq);
    println!(
        "Smoothing window: {} samples",
        info.config.gaze.smoothing_window
    );
    Ok(())
}
