// Replay device
//
// Re-delivers a gaze log written by `SnapshotExporter`. Rows are loaded up
// front and paced at a fixed rate; the logged host timestamps are discarded
// and each row is re-stamped with the replay device clock. Rows carry only
// valid samples, so every replayed sample has both eyes valid.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::paced::{session_level_for, PacedDevice, SampleGenerator};
use super::{
    DeviceError, DeviceGazeSample, DeviceInfo, DeviceProvider, DeviceResult, DeviceSession,
    EyeReading, SessionLevel,
};
use crate::streaming::exporter::GAZE_FIELD_COUNT;
use crate::types::{EyeSample, NormPoint, Vec3};

type EyePair = (EyeSample, EyeSample);

/// Generator behind `ReplayDevice`
pub struct ReplayGenerator {
    rows: Arc<Vec<EyePair>>,
    loop_playback: bool,
}

impl ReplayGenerator {
    fn new(rows: Arc<Vec<EyePair>>, loop_playback: bool) -> Self {
        Self {
            rows,
            loop_playback,
        }
    }
}

impl SampleGenerator for ReplayGenerator {
    fn generate(&mut self, index: u64, device_timestamp_us: i64) -> Option<DeviceGazeSample> {
        if self.rows.is_empty() {
            return None;
        }
        let idx = index as usize;
        let (left, right) = if idx < self.rows.len() {
            self.rows[idx]
        } else if self.loop_playback {
            self.rows[idx % self.rows.len()]
        } else {
            return None;
        };

        Some(DeviceGazeSample {
            device_timestamp_us,
            left: EyeReading {
                valid: true,
                sample: left,
            },
            right: EyeReading {
                valid: true,
                sample: right,
            },
        })
    }
}

pub type ReplayDevice = PacedDevice<ReplayGenerator>;

/// Provider exposing one replay device for a gaze log
pub struct ReplayProvider {
    url: String,
    rows: Arc<Vec<EyePair>>,
    rate_hz: f32,
    loop_playback: bool,
}

impl ReplayProvider {
    /// Load `path`; fails when the file is missing, malformed or empty
    pub fn new(path: PathBuf, rate_hz: f32, loop_playback: bool) -> DeviceResult<Self> {
        let rows = load_rows(&path)?;
        if rows.is_empty() {
            return Err(DeviceError::Protocol(format!(
                "Gaze log {} contains no samples",
                path.display()
            )));
        }

        log::info!("Loaded {} gaze samples from {}", rows.len(), path.display());

        Ok(Self {
            url: format!("replay://{}", path.display()),
            rows: Arc::new(rows),
            rate_hz,
            loop_playback,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.rows.len()
    }
}

impl DeviceProvider for ReplayProvider {
    fn enumerate(&self) -> DeviceResult<Vec<String>> {
        Ok(vec![self.url.clone()])
    }

    fn open(&self, url: &str, license: Option<&[u8]>) -> DeviceResult<Arc<dyn DeviceSession>> {
        if url != self.url {
            return Err(DeviceError::NotFound(url.to_string()));
        }
        let level = session_level_for(license)?;

        let info = DeviceInfo {
            url: self.url.clone(),
            serial_number: "REPLAY".to_string(),
            model: "AEye Replay".to_string(),
            generation: "REPLAY".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            integration_type: "file".to_string(),
            runtime_build_version: env!("CARGO_PKG_VERSION").to_string(),
            session_level: level,
        };
        let generator = ReplayGenerator::new(Arc::clone(&self.rows), self.loop_playback);

        Ok(Arc::new(ReplayDevice::new(info, self.rate_hz, 0, generator)))
    }
}

fn load_rows(path: &Path) -> DeviceResult<Vec<EyePair>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let pair = parse_record(&record).map_err(|msg| {
            DeviceError::Protocol(format!("{}:{}: {}", path.display(), line + 1, msg))
        })?;
        rows.push(pair);
    }
    Ok(rows)
}

fn csv_error(path: &Path, err: csv::Error) -> DeviceError {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => DeviceError::Io(io),
            other => DeviceError::Protocol(format!("{}: {:?}", path.display(), other)),
        }
    } else {
        DeviceError::Protocol(format!("{}: {}", path.display(), err))
    }
}

/// Parse one exported row back into the per-eye readings.
///
/// Column order: timestamp, pupil L/R, track-box position L/R, eyeball
/// centre L/R, gaze origin L/R, gaze point mm L/R, normalized gaze point
/// L/R, combined x/y, then an optional label.
fn parse_record(record: &StringRecord) -> Result<EyePair, String> {
    if record.len() < GAZE_FIELD_COUNT {
        return Err(format!(
            "expected at least {} fields, found {}",
            GAZE_FIELD_COUNT,
            record.len()
        ));
    }

    let mut values = [0f32; GAZE_FIELD_COUNT];
    for (i, slot) in values.iter_mut().enumerate() {
        let field = &record[i];
        *slot = field
            .parse::<f32>()
            .map_err(|_| format!("field {} is not a number: {:?}", i + 1, field))?;
    }

    let vec3 = |at: usize| Vec3::new(values[at], values[at + 1], values[at + 2]);

    let left = EyeSample {
        pupil_diameter_mm: values[1],
        position_in_trackbox: vec3(3),
        eyeball_center_mm: vec3(9),
        gaze_origin_mm: vec3(15),
        gaze_point_mm: vec3(21),
        gaze_point_on_display: NormPoint::new(values[27], values[28]),
    };
    let right = EyeSample {
        pupil_diameter_mm: values[2],
        position_in_trackbox: vec3(6),
        eyeball_center_mm: vec3(12),
        gaze_origin_mm: vec3(18),
        gaze_point_mm: vec3(24),
        gaze_point_on_display: NormPoint::new(values[29], values[30]),
    };

    Ok((left, right))
}
