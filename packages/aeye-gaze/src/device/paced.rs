// Rate-paced software device
//
// Delivers samples from a `SampleGenerator` at a fixed rate, the way a
// hardware tracker pushes gaze data: sample `k` becomes due `k / rate`
// seconds after subscription and carries the device clock value of that
// instant. Callbacks run inside `process_callbacks` with the delivery lock
// held, so they must not call back into the device.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{
    DeviceError, DeviceGazeSample, DeviceInfo, DeviceResult, DeviceSession, DisplayArea,
    GazeCallback, LicenseStatus, SessionLevel, SubscriptionHandle, WaitOutcome,
};

/// Header every calibration blob produced by a software device starts with
pub const CALIBRATION_MAGIC: &[u8] = b"AEYE-CAL";

const LICENSE_HEADER: &str = "AEYE-LICENSE";

/// Produces the samples a paced device delivers
pub trait SampleGenerator: Send {
    /// Sample number `index`, stamped `device_timestamp_us`; `None` once exhausted
    fn generate(&mut self, index: u64, device_timestamp_us: i64) -> Option<DeviceGazeSample>;
}

struct Delivery<G> {
    generator: G,
    subscription: Option<(SubscriptionHandle, GazeCallback)>,
    next_handle: u64,
    anchor: Option<Instant>,
    delivered: u64,
    exhausted: bool,
}

/// A software device that paces a generator at `rate_hz`
pub struct PacedDevice<G> {
    info: DeviceInfo,
    rate_hz: f32,
    clock_epoch_us: i64,
    created: Instant,
    delivery: Mutex<Delivery<G>>,
    calibration: Mutex<Vec<u8>>,
    display_area: Mutex<Option<DisplayArea>>,
    timesync_updates: AtomicU64,
}

impl<G: SampleGenerator> PacedDevice<G> {
    pub fn new(info: DeviceInfo, rate_hz: f32, clock_epoch_us: i64, generator: G) -> Self {
        let rate_hz = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            log::warn!("Invalid device rate {}, using 90 Hz", rate_hz);
            90.0
        };

        let mut calibration = CALIBRATION_MAGIC.to_vec();
        calibration.extend_from_slice(info.serial_number.as_bytes());

        Self {
            info,
            rate_hz,
            clock_epoch_us,
            created: Instant::now(),
            delivery: Mutex::new(Delivery {
                generator,
                subscription: None,
                next_handle: 1,
                anchor: None,
                delivered: 0,
                exhausted: false,
            }),
            calibration: Mutex::new(calibration),
            display_area: Mutex::new(None),
            timesync_updates: AtomicU64::new(0),
        }
    }

    /// Offset of sample `index` from the subscription anchor
    fn due_offset(&self, index: u64) -> Duration {
        Duration::from_secs_f64(index as f64 / self.rate_hz as f64)
    }

    fn device_time_at(&self, instant: Instant) -> i64 {
        let since_creation = instant.saturating_duration_since(self.created);
        self.clock_epoch_us + since_creation.as_micros() as i64
    }

    /// Number of samples handed to callbacks so far
    pub fn delivered(&self) -> u64 {
        self.delivery.lock().delivered
    }

    /// Number of `update_timesync` calls received
    pub fn timesync_updates(&self) -> u64 {
        self.timesync_updates.load(Ordering::Relaxed)
    }

    pub fn display_area(&self) -> Option<DisplayArea> {
        *self.display_area.lock()
    }
}

impl<G: SampleGenerator> DeviceSession for PacedDevice<G> {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn output_frequency(&self) -> f32 {
        self.rate_hz
    }

    fn subscribe(&self, callback: GazeCallback) -> DeviceResult<SubscriptionHandle> {
        let mut delivery = self.delivery.lock();
        if delivery.subscription.is_some() {
            return Err(DeviceError::AlreadySubscribed);
        }

        let handle = SubscriptionHandle(delivery.next_handle);
        delivery.next_handle += 1;
        delivery.subscription = Some((handle, callback));
        delivery.anchor = Some(Instant::now());
        delivery.delivered = 0;
        delivery.exhausted = false;

        log::debug!("{}: gaze subscription {:?} opened", self.info.url, handle);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> DeviceResult<()> {
        let mut delivery = self.delivery.lock();
        match delivery.subscription {
            Some((active, _)) if active == handle => {
                delivery.subscription = None;
                delivery.anchor = None;
                log::debug!("{}: gaze subscription {:?} closed", self.info.url, handle);
                Ok(())
            }
            _ => Err(DeviceError::UnknownSubscription(handle.0)),
        }
    }

    fn wait_for_callbacks(&self, timeout: Duration) -> DeviceResult<WaitOutcome> {
        let next_due = {
            let delivery = self.delivery.lock();
            match (&delivery.subscription, delivery.anchor) {
                (Some(_), Some(anchor)) if !delivery.exhausted => {
                    Some(anchor + self.due_offset(delivery.delivered))
                }
                _ => None,
            }
        };

        let Some(due) = next_due else {
            std::thread::sleep(timeout);
            return Ok(WaitOutcome::TimedOut);
        };

        let now = Instant::now();
        if due <= now {
            return Ok(WaitOutcome::Ready);
        }

        let until_due = due - now;
        if until_due > timeout {
            std::thread::sleep(timeout);
            Ok(WaitOutcome::TimedOut)
        } else {
            std::thread::sleep(until_due);
            Ok(WaitOutcome::Ready)
        }
    }

    fn process_callbacks(&self) -> DeviceResult<()> {
        let now = Instant::now();
        let mut guard = self.delivery.lock();
        let delivery = &mut *guard;

        let (Some((_, callback)), Some(anchor)) = (delivery.subscription.as_mut(), delivery.anchor)
        else {
            return Ok(());
        };

        while !delivery.exhausted {
            let due = anchor + self.due_offset(delivery.delivered);
            if due > now {
                break;
            }

            let timestamp = self.device_time_at(due);
            match delivery.generator.generate(delivery.delivered, timestamp) {
                Some(sample) => {
                    (*callback)(&sample);
                    delivery.delivered += 1;
                }
                None => {
                    log::info!("{}: sample source exhausted", self.info.url);
                    delivery.exhausted = true;
                }
            }
        }

        Ok(())
    }

    fn clock_now_us(&self) -> DeviceResult<i64> {
        Ok(self.device_time_at(Instant::now()))
    }

    fn update_timesync(&self) -> DeviceResult<()> {
        self.timesync_updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn calibration_blob(&self) -> DeviceResult<Vec<u8>> {
        Ok(self.calibration.lock().clone())
    }

    fn apply_calibration(&self, blob: &[u8]) -> DeviceResult<()> {
        if !blob.starts_with(CALIBRATION_MAGIC) {
            return Err(DeviceError::Calibration(
                "blob does not carry a calibration header".to_string(),
            ));
        }
        *self.calibration.lock() = blob.to_vec();
        Ok(())
    }

    fn set_display_area(&self, area: DisplayArea) -> DeviceResult<()> {
        if self.info.session_level != SessionLevel::Elevated {
            return Err(DeviceError::InsufficientLicense);
        }
        *self.display_area.lock() = Some(area);
        Ok(())
    }
}

/// Validate a software-device license.
///
/// The first line must be the license header; an optional `expires=YYYY-MM-DD`
/// line bounds its validity.
pub(crate) fn check_license(license: &[u8]) -> LicenseStatus {
    let Ok(text) = std::str::from_utf8(license) else {
        return LicenseStatus::Invalid;
    };

    let mut lines = text.lines().map(str::trim);
    if lines.next() != Some(LICENSE_HEADER) {
        return LicenseStatus::Invalid;
    }

    for line in lines {
        if let Some(date) = line.strip_prefix("expires=") {
            return match chrono::NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
                Ok(expires) if expires < chrono::Utc::now().date_naive() => LicenseStatus::Expired,
                Ok(_) => LicenseStatus::Valid,
                Err(_) => LicenseStatus::Invalid,
            };
        }
    }

    LicenseStatus::Valid
}

/// Session level for an optional license, or the rejection status
pub(crate) fn session_level_for(license: Option<&[u8]>) -> DeviceResult<SessionLevel> {
    match license {
        None => Ok(SessionLevel::Standard),
        Some(bytes) => match check_license(bytes) {
            LicenseStatus::Valid => Ok(SessionLevel::Elevated),
            status => Err(DeviceError::License(status)),
        },
    }
}
