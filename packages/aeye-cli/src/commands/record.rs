use aeye_gaze::streaming::GazeEventLogger;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::RecordArgs;
use crate::commands::{apply_source, build_streamer, load_config, open_device};
use crate::exit_codes;

pub fn execute(args: RecordArgs, config_path: Option<&Path>) -> i32 {
    match run(args, config_path) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => exit_codes::report(e),
    }
}

fn run(args: RecordArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_source(&mut config, &args.source)?;
    if let Some(dir) = args.out_dir {
        config.event_log.out_dir = dir;
    }
    config.validate()?;

    let session = open_device(&config)?;
    let streamer = Arc::new(build_streamer(&config, &session, config.gaze.cursor_capture)?);
    let logger = GazeEventLogger::new(Arc::clone(&streamer), config.event_log.clone())?;

    streamer.start()?;
    logger.start()?;
    eprintln!(
        "Logging gaze to {}; each input line marks an event",
        config.event_log.out_dir.display()
    );

    let lines = spawn_stdin_reader();
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut events = 0u64;

    loop {
        let timeout = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            },
            None => Duration::from_secs(3600),
        };

        match lines.recv_timeout(timeout) {
            Ok(line) => {
                log::debug!("Event: {}", line.trim());
                logger.event();
                events += 1;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    logger.stop()?;
    streamer.stop()?;

    println!(
        "{} events, {} gaze exports in {}",
        events,
        logger.files_written(),
        config.event_log.out_dir.display()
    );
    Ok(())
}

/// Forward stdin lines over a channel; the channel closes at EOF
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Stopped reading events: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
