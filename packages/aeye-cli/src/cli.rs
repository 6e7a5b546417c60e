use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aeye",
    version,
    about = "Eye-tracker gaze streaming tool",
    long_about = "Stream gaze from an eye tracker, place a gaze marker, and log gaze to CSV.\n\
                  Without hardware bindings the built-in simulated tracker is used;\n\
                  previously exported logs can be replayed with --replay."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (YAML). Defaults to <config dir>/aeye/config.yaml when present
    #[arg(long, env = "AEYE_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show tracker information and the effective configuration
    Info(InfoArgs),
    /// Stream gaze for a while, optionally exporting it
    Stream(StreamArgs),
    /// Save or apply the tracker calibration
    Calibration(CalibrationArgs),
    /// Log gaze around events read from stdin, one event per line
    Record(RecordArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Device overrides shared by commands that stream
#[derive(Args, Clone)]
pub struct SourceArgs {
    /// Replay an exported gaze log instead of using the configured device
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Device rate in Hz (simulated or replayed)
    #[arg(long)]
    pub rate: Option<f32>,

    /// Simulated device: mark every Kth sample as not tracking
    #[arg(long)]
    pub invalid_every: Option<u32>,
}

#[derive(Args)]
pub struct StreamArgs {
    /// Seconds to stream
    #[arg(long, default_value_t = 5.0)]
    pub duration: f64,

    /// Append the newest samples to this CSV file when done
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Number of newest samples to export (0 = all)
    #[arg(long, default_value_t = 0)]
    pub samples: usize,

    /// Label appended to every exported row
    #[arg(long, requires = "export")]
    pub label: Option<String>,

    /// Move the OS pointer instead of the overlay marker
    #[arg(long)]
    pub cursor_capture: bool,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Output statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CalibrationArgs {
    #[command(subcommand)]
    pub action: CalibrationAction,
}

#[derive(Subcommand)]
pub enum CalibrationAction {
    /// Write the tracker's current calibration to a file
    Save {
        /// Calibration file path
        #[arg(long)]
        file: PathBuf,
    },
    /// Apply a calibration file to the tracker
    Apply {
        /// Calibration file path
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Args)]
pub struct RecordArgs {
    /// Stop after this many seconds even if stdin stays open
    #[arg(long)]
    pub duration: Option<f64>,

    /// Directory for the gaze logs (overrides the config)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceArgs,
}
