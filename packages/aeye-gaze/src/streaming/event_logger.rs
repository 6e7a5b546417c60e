// Event-triggered gaze logging
//
// A worker thread waits for event signals. On an event it exports the
// samples covering the last `writeback_secs`, then keeps exporting whatever
// accumulates every `writeafter_secs` for as long as new events keep
// arriving. Files are named after the local time the export started.

use chrono::Local;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{GazeError, Result};
use crate::streaming::streamer::GazeStreamer;

const FILE_NAME_FORMAT: &str = "%Y-%m-%d--%H-%M.csv";

/// Event logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Seconds of gaze history written when an event arrives
    pub writeback_secs: f64,
    /// Seconds to keep logging after the most recent event
    pub writeafter_secs: f64,
    pub out_dir: PathBuf,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            writeback_secs: 5.0,
            writeafter_secs: 5.0,
            out_dir: PathBuf::from("logs/gaze"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Event,
    Stop,
}

struct Worker {
    tx: Sender<Signal>,
    handle: JoinHandle<()>,
}

/// Writes gaze around user-signalled events
pub struct GazeEventLogger {
    streamer: Arc<GazeStreamer>,
    config: EventLogConfig,
    writeback_samples: usize,
    worker: Mutex<Option<Worker>>,
    files_written: Arc<AtomicU64>,
}

impl GazeEventLogger {
    pub fn new(streamer: Arc<GazeStreamer>, config: EventLogConfig) -> Result<Self> {
        if !(config.writeback_secs > 0.0 && config.writeafter_secs > 0.0) {
            return Err(GazeError::InvalidConfig(
                "writeback and writeafter must be positive".to_string(),
            ));
        }

        let rate = f64::from(streamer.output_frequency());
        let writeback_samples = (config.writeback_secs * rate).ceil() as usize;
        let writeafter_samples = (config.writeafter_secs * rate).ceil() as usize;
        let capacity = streamer.buffer().capacity();
        if writeback_samples > capacity || writeafter_samples > capacity {
            return Err(GazeError::InvalidConfig(format!(
                "event log window exceeds gaze buffer capacity of {} samples",
                capacity
            )));
        }

        Ok(Self {
            streamer,
            config,
            writeback_samples,
            worker: Mutex::new(None),
            files_written: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start the watcher thread
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::warn!("Gaze event logger already started");
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.out_dir)?;

        let (tx, rx) = channel::bounded(1);
        let watcher = Watcher {
            streamer: Arc::clone(&self.streamer),
            out_dir: self.config.out_dir.clone(),
            writeback_samples: self.writeback_samples,
            writeafter: Duration::from_secs_f64(self.config.writeafter_secs),
            files_written: Arc::clone(&self.files_written),
        };

        let handle = std::thread::Builder::new()
            .name("aeye-event-log".to_string())
            .spawn(move || watcher.run(rx))
            .map_err(|e| GazeError::Worker(format!("Failed to spawn event logger: {}", e)))?;

        *worker = Some(Worker { tx, handle });
        log::info!("Gaze event logger writing to {}", self.config.out_dir.display());
        Ok(())
    }

    /// Signal an event; extra signals while one is queued are dropped
    pub fn event(&self) {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            log::error!("Gaze event received but the logger is not started");
            return;
        };

        match worker.tx.try_send(Signal::Event) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Gaze event received but the logger has stopped");
            }
        }
    }

    /// Stop the watcher, flushing anything accumulated since the last write
    pub fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let _ = worker.tx.send(Signal::Stop);
        worker
            .handle
            .join()
            .map_err(|_| GazeError::Worker("Gaze event logger panicked".to_string()))?;
        self.streamer.wait_for_export();
        log::info!("Gaze event logger stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn writeback_samples(&self) -> usize {
        self.writeback_samples
    }

    /// Number of exports issued so far
    pub fn files_written(&self) -> u64 {
        self.files_written.load(Ordering::Relaxed)
    }
}

impl Drop for GazeEventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{}", e);
        }
    }
}

struct Watcher {
    streamer: Arc<GazeStreamer>,
    out_dir: PathBuf,
    writeback_samples: usize,
    writeafter: Duration,
    files_written: Arc<AtomicU64>,
}

impl Watcher {
    fn run(self, rx: Receiver<Signal>) {
        while let Ok(Signal::Event) = rx.recv() {
            self.write(self.writeback_samples);
            if self.follow(&rx) == Signal::Stop {
                break;
            }
        }
        log::debug!("Gaze event watcher exiting");
    }

    /// Write every `writeafter` until no event has arrived for that long.
    ///
    /// Writes keep their fixed schedule however often events arrive.
    /// Returns `Stop` when a stop signal ended the follow-up early.
    fn follow(&self, rx: &Receiver<Signal>) -> Signal {
        let mut next_write = Instant::now() + self.writeafter;
        let mut write_until = next_write;
        loop {
            let timeout = next_write.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(Signal::Event) => {
                    write_until = Instant::now() + self.writeafter;
                    continue;
                }
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    self.write(0);
                    return Signal::Stop;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.write(0);
                    next_write += self.writeafter;
                    let now = Instant::now();
                    if next_write <= now {
                        next_write = now + self.writeafter;
                    }
                }
            }

            if Instant::now() >= write_until {
                return Signal::Event;
            }
        }
    }

    fn write(&self, n: usize) {
        let path = log_path(&self.out_dir);
        match self.streamer.export(&path, n, None) {
            Ok(0) => log::warn!("No gaze data to log; is the tracker streaming?"),
            Ok(captured) => {
                self.files_written.fetch_add(1, Ordering::Relaxed);
                log::debug!("Logging {} gaze samples to {}", captured, path.display());
            }
            Err(e) => log::error!("Gaze event export failed: {}", e),
        }
    }
}

fn log_path(out_dir: &Path) -> PathBuf {
    out_dir.join(Local::now().format(FILE_NAME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SessionLevel, SimulatedConfig, SimulatedDevice};
    use crate::streaming::streamer::GazeStreamerConfig;

    fn streamer(capacity: usize) -> Arc<GazeStreamer> {
        let device = Arc::new(SimulatedDevice::simulated(
            SimulatedConfig {
                rate_hz: 200.0,
                ..Default::default()
            },
            SessionLevel::Standard,
        ));
        Arc::new(GazeStreamer::new(
            device,
            GazeStreamerConfig {
                buffer_capacity: capacity,
                wait_timeout: Duration::from_millis(20),
                clock_refresh: None,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn test_rejects_windows_larger_than_buffer() {
        let config = EventLogConfig {
            writeback_secs: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            GazeEventLogger::new(streamer(100), config),
            Err(GazeError::InvalidConfig(_))
        ));

        let config = EventLogConfig {
            writeafter_secs: 0.0,
            ..Default::default()
        };
        assert!(GazeEventLogger::new(streamer(100), config).is_err());
    }

    #[test]
    fn test_writeback_samples_from_rate() {
        let config = EventLogConfig {
            writeback_secs: 0.5,
            writeafter_secs: 0.25,
            ..Default::default()
        };
        let logger = GazeEventLogger::new(streamer(1000), config).unwrap();
        assert_eq!(logger.writeback_samples(), 100);
    }

    #[test]
    fn test_event_writes_history_and_follow_up() {
        let dir = tempfile::tempdir().unwrap();
        let streamer = streamer(10_000);
        let config = EventLogConfig {
            writeback_secs: 0.1,
            writeafter_secs: 0.05,
            out_dir: dir.path().to_path_buf(),
        };
        let logger = GazeEventLogger::new(Arc::clone(&streamer), config).unwrap();

        streamer.start().unwrap();
        logger.start().unwrap();
        logger.start().unwrap();
        std::thread::sleep(Duration::from_millis(150));

        logger.event();
        std::thread::sleep(Duration::from_millis(200));
        logger.stop().unwrap();
        streamer.stop().unwrap();

        assert!(!logger.is_running());
        assert!(logger.files_written() >= 2);

        let rows: usize = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .map(|text| text.lines().count())
            .sum();
        assert!(rows >= 20, "only {} rows logged", rows);
    }

    #[test]
    fn test_steady_events_keep_writing_on_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let streamer = streamer(10_000);
        let config = EventLogConfig {
            writeback_secs: 0.1,
            writeafter_secs: 0.1,
            out_dir: dir.path().to_path_buf(),
        };
        let logger = GazeEventLogger::new(Arc::clone(&streamer), config).unwrap();

        streamer.start().unwrap();
        logger.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            logger.event();
            std::thread::sleep(Duration::from_millis(30));
        }
        let written = logger.files_written();

        logger.stop().unwrap();
        streamer.stop().unwrap();
        assert!(written >= 5, "only {} exports during 1s of events", written);
    }

    #[test]
    fn test_event_before_start_is_ignored() {
        let logger = GazeEventLogger::new(streamer(1000), EventLogConfig::default()).unwrap();
        logger.event();
        logger.stop().unwrap();
        assert_eq!(logger.files_written(), 0);
    }
}
