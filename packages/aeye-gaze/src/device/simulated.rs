// Synthetic eye tracker
//
// Generates binocular gaze that dwells on a cycle of fixation points with a
// little seeded jitter, so runs are reproducible. Useful for:
// - Exercising the pipeline without tracker hardware
// - Integration tests and demos

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::paced::{session_level_for, PacedDevice, SampleGenerator};
use super::{
    DeviceError, DeviceGazeSample, DeviceInfo, DeviceProvider, DeviceResult, DeviceSession,
    EyeReading, SessionLevel,
};
use crate::types::{EyeSample, NormPoint, Vec3};

pub const SIMULATED_URL: &str = "sim://aeye-0";

/// Settings for the synthetic tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Output frequency in Hz
    pub rate_hz: f32,
    /// Mark every Nth sample as not tracking (0 = never)
    pub invalid_every: u32,
    /// Uniform jitter amplitude, normalized display units
    pub jitter: f32,
    /// Samples spent on each fixation point
    pub dwell_samples: u32,
    pub seed: u64,
    /// Device clock value at creation, microseconds
    pub clock_epoch_us: i64,
    /// Fixation points visited in order
    pub fixations: Vec<NormPoint>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            rate_hz: 90.0,
            invalid_every: 0,
            jitter: 0.002,
            dwell_samples: 45,
            seed: 7,
            clock_epoch_us: 1_000_000_000,
            fixations: vec![
                NormPoint::new(0.5, 0.5),
                NormPoint::new(0.25, 0.25),
                NormPoint::new(0.75, 0.25),
                NormPoint::new(0.75, 0.75),
                NormPoint::new(0.25, 0.75),
            ],
        }
    }
}

/// Generator behind `SimulatedDevice`
pub struct SyntheticGaze {
    config: SimulatedConfig,
    rng: StdRng,
}

impl SyntheticGaze {
    pub fn new(config: SimulatedConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    fn jitter(&mut self) -> f32 {
        let amplitude = self.config.jitter.abs();
        if amplitude > 0.0 {
            self.rng.random_range(-amplitude..=amplitude)
        } else {
            0.0
        }
    }

    fn fixation(&self, index: u64) -> NormPoint {
        if self.config.fixations.is_empty() {
            return NormPoint::new(0.5, 0.5);
        }
        let dwell = u64::from(self.config.dwell_samples.max(1));
        let slot = (index / dwell) as usize % self.config.fixations.len();
        self.config.fixations[slot]
    }

    fn eye(&mut self, target: NormPoint, side: f32) -> EyeSample {
        let x = (target.x + side * 0.004 + self.jitter()).clamp(0.0, 1.0);
        let y = (target.y + self.jitter()).clamp(0.0, 1.0);
        let center = Vec3::new(side * 31.0, 0.0, 620.0);

        EyeSample {
            pupil_diameter_mm: 3.2 + self.jitter() * 10.0,
            position_in_trackbox: Vec3::new(0.5 + side * 0.05, 0.5, 0.5),
            eyeball_center_mm: center,
            gaze_origin_mm: center,
            gaze_point_mm: Vec3::new((x - 0.5) * 600.0, (1.0 - y) * 340.0, 0.0),
            gaze_point_on_display: NormPoint::new(x, y),
        }
    }
}

impl SampleGenerator for SyntheticGaze {
    fn generate(&mut self, index: u64, device_timestamp_us: i64) -> Option<DeviceGazeSample> {
        let tracking = self.config.invalid_every == 0
            || (index + 1) % u64::from(self.config.invalid_every) != 0;
        let target = self.fixation(index);

        Some(DeviceGazeSample {
            device_timestamp_us,
            left: EyeReading {
                valid: tracking,
                sample: self.eye(target, -1.0),
            },
            right: EyeReading {
                valid: tracking,
                sample: self.eye(target, 1.0),
            },
        })
    }
}

pub type SimulatedDevice = PacedDevice<SyntheticGaze>;

impl PacedDevice<SyntheticGaze> {
    pub fn simulated(config: SimulatedConfig, level: SessionLevel) -> Self {
        let info = DeviceInfo {
            url: SIMULATED_URL.to_string(),
            serial_number: format!("SIM-{:08X}", config.seed),
            model: "AEye Simulated Tracker".to_string(),
            generation: "SIM".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            integration_type: "software".to_string(),
            runtime_build_version: env!("CARGO_PKG_VERSION").to_string(),
            session_level: level,
        };
        let rate_hz = config.rate_hz;
        let epoch = config.clock_epoch_us;
        PacedDevice::new(info, rate_hz, epoch, SyntheticGaze::new(config))
    }
}

/// Provider exposing a single simulated tracker
pub struct SimulatedProvider {
    config: SimulatedConfig,
}

impl SimulatedProvider {
    pub fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }
}

impl DeviceProvider for SimulatedProvider {
    fn enumerate(&self) -> DeviceResult<Vec<String>> {
        Ok(vec![SIMULATED_URL.to_string()])
    }

    fn open(&self, url: &str, license: Option<&[u8]>) -> DeviceResult<Arc<dyn DeviceSession>> {
        if url != SIMULATED_URL {
            return Err(DeviceError::NotFound(url.to_string()));
        }
        let level = session_level_for(license)?;
        log::info!("Opened simulated tracker ({:?} session)", level);
        Ok(Arc::new(SimulatedDevice::simulated(self.config.clone(), level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LicenseStatus;

    #[test]
    fn test_generator_is_reproducible() {
        let mut a = SyntheticGaze::new(SimulatedConfig::default());
        let mut b = SyntheticGaze::new(SimulatedConfig::default());

        for i in 0..20 {
            assert_eq!(a.generate(i, i as i64), b.generate(i, i as i64));
        }
    }

    #[test]
    fn test_invalid_every_marks_both_eyes() {
        let mut gen = SyntheticGaze::new(SimulatedConfig {
            invalid_every: 4,
            ..Default::default()
        });

        let validity: Vec<bool> = (0..8)
            .map(|i| gen.generate(i, 0).unwrap().both_eyes_valid())
            .collect();
        assert_eq!(
            validity,
            vec![true, true, true, false, true, true, true, false]
        );
    }

    #[test]
    fn test_fixation_cycle() {
        let mut gen = SyntheticGaze::new(SimulatedConfig {
            jitter: 0.0,
            dwell_samples: 2,
            fixations: vec![NormPoint::new(0.1, 0.2), NormPoint::new(0.9, 0.8)],
            ..Default::default()
        });

        let first = gen.generate(0, 0).unwrap();
        let third = gen.generate(2, 0).unwrap();
        let fifth = gen.generate(4, 0).unwrap();

        assert!((first.left.sample.gaze_point_on_display.y - 0.2).abs() < 1e-6);
        assert!((third.right.sample.gaze_point_on_display.y - 0.8).abs() < 1e-6);
        assert!((fifth.left.sample.gaze_point_on_display.y - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_provider_license_levels() {
        let provider = SimulatedProvider::new(SimulatedConfig::default());
        assert_eq!(provider.enumerate().unwrap(), vec![SIMULATED_URL.to_string()]);

        let standard = provider.open(SIMULATED_URL, None).unwrap();
        assert_eq!(standard.info().session_level, SessionLevel::Standard);

        let elevated = provider
            .open(SIMULATED_URL, Some(b"AEYE-LICENSE\n".as_slice()))
            .unwrap();
        assert_eq!(elevated.info().session_level, SessionLevel::Elevated);

        let expired = provider.open(
            SIMULATED_URL,
            Some(b"AEYE-LICENSE\nexpires=2001-02-03".as_slice()),
        );
        assert!(matches!(
            expired,
            Err(DeviceError::License(LicenseStatus::Expired))
        ));

        assert!(matches!(
            provider.open("usb://elsewhere", None),
            Err(DeviceError::NotFound(_))
        ));
    }
}
