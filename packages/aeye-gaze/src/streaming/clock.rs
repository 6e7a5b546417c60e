// Device/host clock synchronization
//
// The tracker stamps samples with its own monotonic clock. `sync()` records
// `offset = host_now - device_now` once; conversions add that offset.
//
// The optional refresh thread only asks the device to re-align its internal
// clock (`update_timesync`). The stored offset moves only when `sync()` runs
// again, which the refresher does only when `resync` is enabled.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::device::DeviceSession;
use crate::error::{GazeError, Result};

/// Host wall clock in microseconds since the Unix epoch
pub fn host_now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

struct ClockState {
    device: Arc<dyn DeviceSession>,
    offset_us: AtomicI64,
    synced: AtomicBool,
}

impl ClockState {
    fn sync(&self) -> Result<i64> {
        let device_now = self.device.clock_now_us().map_err(GazeError::Device)?;
        let offset = host_now_us() - device_now;
        let previous = self.offset_us.swap(offset, Ordering::AcqRel);

        if self.synced.swap(true, Ordering::AcqRel) {
            log::debug!("Clock offset resynced: {} us (drift {} us)", offset, offset - previous);
        } else {
            log::info!("Clock offset established: {} us", offset);
        }
        Ok(offset)
    }
}

struct Refresher {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Offset between the device clock and the host clock
pub struct ClockSync {
    state: Arc<ClockState>,
    refresher: Mutex<Option<Refresher>>,
}

impl ClockSync {
    pub fn new(device: Arc<dyn DeviceSession>) -> Self {
        Self {
            state: Arc::new(ClockState {
                device,
                offset_us: AtomicI64::new(0),
                synced: AtomicBool::new(false),
            }),
            refresher: Mutex::new(None),
        }
    }

    /// Query the device clock once and store the new offset
    pub fn sync(&self) -> Result<i64> {
        self.state.sync()
    }

    pub fn is_synced(&self) -> bool {
        self.state.synced.load(Ordering::Acquire)
    }

    /// Current offset; 0 until the first `sync()`
    pub fn offset_us(&self) -> i64 {
        self.state.offset_us.load(Ordering::Acquire)
    }

    /// Convert a device timestamp to host time.
    ///
    /// Meaningless until `sync()` has succeeded at least once.
    pub fn device_to_system(&self, device_ts_us: i64) -> i64 {
        device_ts_us + self.offset_us()
    }

    /// Start the periodic refresh thread. A running refresher is replaced.
    pub fn start_refresh(&self, interval: Duration, resync: bool) -> Result<()> {
        self.stop_refresh();

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let state = Arc::clone(&self.state);

        let handle = std::thread::Builder::new()
            .name("aeye-clock-refresh".to_string())
            .spawn(move || {
                log::debug!("Clock refresh every {:?} (resync: {})", interval, resync);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = state.device.update_timesync() {
                                log::warn!("Device time sync update failed: {}", e);
                            }
                            if resync {
                                if let Err(e) = state.sync() {
                                    log::warn!("Clock resync failed: {}", e);
                                }
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Clock refresh stopped");
            })
            .map_err(|e| GazeError::Worker(format!("Failed to spawn clock refresh: {}", e)))?;

        *self.refresher.lock() = Some(Refresher { stop_tx, handle });
        Ok(())
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresher.lock().is_some()
    }

    /// Stop and join the refresh thread, if any
    pub fn stop_refresh(&self) {
        let refresher = self.refresher.lock().take();
        if let Some(refresher) = refresher {
            let _ = refresher.stop_tx.send(());
            if refresher.handle.join().is_err() {
                log::error!("Clock refresh thread panicked");
            }
        }
    }
}

impl Drop for ClockSync {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SessionLevel, SimulatedConfig, SimulatedDevice};

    fn device() -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::simulated(
            SimulatedConfig {
                clock_epoch_us: 42_000_000,
                ..Default::default()
            },
            SessionLevel::Standard,
        ))
    }

    #[test]
    fn test_offset_is_additive() {
        let clock = ClockSync::new(device());
        assert!(!clock.is_synced());
        clock.sync().unwrap();
        assert!(clock.is_synced());

        for t in [0i64, 1, 1_000, 123_456_789] {
            assert_eq!(clock.device_to_system(t) - clock.device_to_system(0), t);
        }
    }

    #[test]
    fn test_synced_time_tracks_host_clock() {
        let device = device();
        let clock = ClockSync::new(device.clone());
        clock.sync().unwrap();

        let converted = clock.device_to_system(device.clock_now_us().unwrap());
        assert!((converted - host_now_us()).abs() < 50_000);
    }

    #[test]
    fn test_refresh_updates_device_timesync() {
        let device = device();
        let clock = ClockSync::new(device.clone());
        clock.sync().unwrap();
        let offset = clock.offset_us();

        clock.start_refresh(Duration::from_millis(5), false).unwrap();
        assert!(clock.is_refreshing());
        std::thread::sleep(Duration::from_millis(60));
        clock.stop_refresh();

        assert!(!clock.is_refreshing());
        assert!(device.timesync_updates() >= 1);
        assert_eq!(clock.offset_us(), offset);
    }
}
