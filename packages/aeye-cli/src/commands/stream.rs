use aeye_gaze::{GazeError, SmoothedGazePoint, StreamStats};
use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::cli::StreamArgs;
use crate::commands::{apply_source, build_streamer, load_config, open_device};
use crate::exit_codes;
use crate::output;

#[derive(Serialize)]
struct StreamOutput {
    stream_id: String,
    device: String,
    started_at: String,
    duration_secs: f64,
    output_frequency_hz: f32,
    last_point: Option<SmoothedGazePoint>,
    exported: Option<ExportOutput>,
    stats: StreamStats,
}

#[derive(Serialize)]
struct ExportOutput {
    path: String,
    captured: usize,
    written: usize,
}

pub fn execute(args: StreamArgs, config_path: Option<&Path>) -> i32 {
    match run(&args, config_path) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => exit_codes::report(e),
    }
}

fn run(args: &StreamArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    if !(args.duration.is_finite() && args.duration >= 0.0) {
        let message = format!("duration must be non-negative, got {}", args.duration);
        return Err(GazeError::InvalidConfig(message).into());
    }

    let mut config = load_config(config_path)?;
    apply_source(&mut config, &args.source)?;
    config.validate()?;

    let session = open_device(&config)?;
    let streamer = build_streamer(
        &config,
        &session,
        args.cursor_capture || config.gaze.cursor_capture,
    )?;

    let started_at: DateTime<Local> = Local::now();
    streamer.start()?;
    std::thread::sleep(Duration::from_secs_f64(args.duration));
    let last_point = streamer.smoothed(config.gaze.smoothing_window);
    streamer.stop()?;

    let exported = match &args.export {
        Some(path) => {
            let captured = streamer
                .export(path, args.samples, args.label.as_deref())
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            let written = match streamer.wait_for_export() {
                Some(result) => {
                    result.with_context(|| format!("Failed to write {}", path.display()))?
                }
                None => 0,
            };
            Some(ExportOutput {
                path: path.display().to_string(),
                captured,
                written,
            })
        }
        None => None,
    };

    let summary = StreamOutput {
        stream_id: streamer.id.clone(),
        device: session.url.clone(),
        started_at: started_at.to_rfc3339(),
        duration_secs: args.duration,
        output_frequency_hz: streamer.output_frequency(),
        last_point: last_point.is_valid().then_some(last_point),
        exported,
        stats: streamer.stats(),
    };

    if args.json {
        return output::print_json(&summary);
    }

    let stats = &summary.stats;
    println!("Stream {} on {}", summary.stream_id, summary.device);
    println!(
        "Started {} for {:.1}s at {} Hz",
        started_at.format("%Y-%m-%d %H:%M:%S"),
        summary.duration_secs,
        summary.output_frequency_hz
    );
    println!("Callbacks:       {}", stats.callbacks_received);
    println!("Samples:         {}", stats.samples_enqueued);
    println!("Invalid dropped: {}", stats.invalid_dropped);
    println!("Marks placed:    {}", stats.marks_placed);
    if let Some(rate) = stats.sample_rate_hz {
        println!("Measured rate:   {:.1} Hz", rate);
    }
    match summary.last_point {
        Some(point) => println!(
            "Last gaze point: ({}, {}) over {} samples",
            point.x_coord, point.y_coord, point.n_samples
        ),
        None => println!("Last gaze point: none"),
    }
    if let Some(export) = &summary.exported {
        println!(
            "Exported {} of {} samples to {}",
            export.written, export.captured, export.path
        );
    }
    Ok(())
}
