use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let config_path = cli.config.as_deref();
    let exit_code = match cli.command {
        cli::Command::Info(args) => commands::info::execute(args, config_path),
        cli::Command::Stream(args) => commands::stream::execute(args, config_path),
        cli::Command::Calibration(args) => commands::calibration::execute(args, config_path),
        cli::Command::Record(args) => commands::record::execute(args, config_path),
    };

    std::process::exit(exit_code);
}
