// Snapshot export to CSV
//
// `export` swaps the buffer out, then writes the captured samples on a
// worker thread. One writer at a time: a new export joins the previous
// worker before spawning its own, and `wait` joins the last one.
//
// Row layout (comma-space separated, appended):
//   timestamp_us,
//   pupil L, pupil R,
//   track-box position L xyz, R xyz,
//   eyeball centre L xyz, R xyz,
//   gaze origin L xyz, R xyz,
//   gaze point mm L xyz, R xyz,
//   normalized gaze point L xy, R xy,
//   combined x, combined y
//   [, label]

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crate::error::{GazeError, Result};
use crate::streaming::buffer::GazeSampleBuffer;
use crate::types::{GazeSample, Vec3};

/// Number of data columns in an exported row, label excluded
pub const GAZE_FIELD_COUNT: usize = 33;

const SEPARATOR: &str = ", ";

/// Format one sample as an export row (no trailing newline)
pub fn format_row(sample: &GazeSample, label: Option<&str>) -> String {
    let left = sample.left();
    let right = sample.right();
    let mut fields: Vec<String> = Vec::with_capacity(GAZE_FIELD_COUNT + 1);

    let push_vec = |fields: &mut Vec<String>, v: &Vec3| {
        fields.push(v.x.to_string());
        fields.push(v.y.to_string());
        fields.push(v.z.to_string());
    };

    fields.push(sample.timestamp_us().to_string());
    fields.push(left.pupil_diameter_mm.to_string());
    fields.push(right.pupil_diameter_mm.to_string());
    for (l, r) in [
        (&left.position_in_trackbox, &right.position_in_trackbox),
        (&left.eyeball_center_mm, &right.eyeball_center_mm),
        (&left.gaze_origin_mm, &right.gaze_origin_mm),
        (&left.gaze_point_mm, &right.gaze_point_mm),
    ] {
        push_vec(&mut fields, l);
        push_vec(&mut fields, r);
    }
    for point in [&left.gaze_point_on_display, &right.gaze_point_on_display] {
        fields.push(point.x.to_string());
        fields.push(point.y.to_string());
    }
    fields.push(sample.combined_x().to_string());
    fields.push(sample.combined_y().to_string());

    if let Some(label) = label {
        fields.push(label.to_string());
    }

    fields.join(SEPARATOR)
}

/// Append the newest `min(n, len)` samples to `path` in timestamp order.
///
/// `n == 0` writes every sample. Returns the number of rows written.
pub fn write_samples(
    path: &Path,
    mut samples: Vec<GazeSample>,
    n: usize,
    label: Option<&str>,
) -> io::Result<usize> {
    samples.sort_by_key(GazeSample::timestamp_us);
    let keep = if n == 0 { samples.len() } else { n.min(samples.len()) };
    let start = samples.len() - keep;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for sample in &samples[start..] {
        writeln!(writer, "{}", format_row(sample, label))?;
    }
    writer.flush()?;

    Ok(keep)
}

/// Exports buffer snapshots on a background writer
#[derive(Default)]
pub struct SnapshotExporter {
    job: Mutex<Option<JoinHandle<io::Result<usize>>>>,
    exports_started: AtomicU64,
}

impl SnapshotExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `buffer` and write its newest `n` samples to `path`.
    ///
    /// Returns the number of samples captured, which may exceed what is
    /// written. An empty snapshot returns 0 without touching the file.
    pub fn export(
        &self,
        buffer: &GazeSampleBuffer,
        path: &Path,
        n: usize,
        label: Option<&str>,
    ) -> Result<usize> {
        // Snapshot under the job lock so writers run in snapshot order
        let mut job = self.job.lock();
        let snapshot = buffer.snapshot_and_reset();
        let captured = snapshot.len();
        if captured == 0 {
            log::debug!("Export to {} skipped: buffer empty", path.display());
            return Ok(0);
        }

        if let Some(previous) = job.take() {
            // failures are logged by `finish`
            let _ = Self::finish(previous);
        }

        let path: PathBuf = path.to_path_buf();
        let label = label.map(str::to_string);
        let handle = std::thread::Builder::new()
            .name("aeye-export".to_string())
            .spawn(move || {
                let written = write_samples(&path, snapshot, n, label.as_deref())?;
                log::info!("Exported {} gaze samples to {}", written, path.display());
                Ok(written)
            })
            .map_err(|e| GazeError::Worker(format!("Failed to spawn export worker: {}", e)))?;

        *job = Some(handle);
        self.exports_started.fetch_add(1, Ordering::Relaxed);
        Ok(captured)
    }

    /// Block until the in-flight export, if any, has finished.
    ///
    /// Returns that export's outcome.
    pub fn wait(&self) -> Option<io::Result<usize>> {
        let handle = self.job.lock().take()?;
        Some(Self::finish(handle))
    }

    pub fn exports_started(&self) -> u64 {
        self.exports_started.load(Ordering::Relaxed)
    }

    fn finish(handle: JoinHandle<io::Result<usize>>) -> io::Result<usize> {
        let result = handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("export worker panicked")));
        if let Err(e) = &result {
            log::error!("Gaze export failed: {}", e);
        }
        result
    }
}

impl Drop for SnapshotExporter {
    fn drop(&mut self) {
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DisplaySize, EyeSample, NormPoint};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample(ts: i64) -> GazeSample {
        let eye = EyeSample {
            pupil_diameter_mm: 3.5,
            gaze_point_on_display: NormPoint::new(0.5, 0.5),
            ..Default::default()
        };
        GazeSample::new(ts, eye, eye, DisplaySize::new(1920, 1080))
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn first_field(line: &str) -> i64 {
        line.split(SEPARATOR).next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_row_layout() {
        let row = format_row(&sample(7), Some("typing"));
        let fields: Vec<&str> = row.split(SEPARATOR).collect();

        assert_eq!(fields.len(), GAZE_FIELD_COUNT + 1);
        assert_eq!(fields[0], "7");
        assert_eq!(fields[1], "3.5");
        assert_eq!(fields[27], "0.5");
        assert_eq!(fields[31], "960");
        assert_eq!(fields[32], "540");
        assert_eq!(fields[33], "typing");

        assert_eq!(format_row(&sample(7), None).split(SEPARATOR).count(), GAZE_FIELD_COUNT);
    }

    #[test]
    fn test_export_fewer_than_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaze.csv");
        let buffer = GazeSampleBuffer::new(100);
        for ts in [30, 10, 20] {
            buffer.push(sample(ts));
        }

        let exporter = SnapshotExporter::new();
        assert_eq!(exporter.export(&buffer, &path, 5, None).unwrap(), 3);
        assert_eq!(exporter.wait().unwrap().unwrap(), 3);

        let lines = read_lines(&path);
        assert_eq!(lines.iter().map(|l| first_field(l)).collect::<Vec<_>>(), vec![10, 20, 30]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_export_keeps_newest_n() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaze.csv");
        let buffer = GazeSampleBuffer::new(100);
        for ts in 0..10 {
            buffer.push(sample(ts));
        }

        let exporter = SnapshotExporter::new();
        assert_eq!(exporter.export(&buffer, &path, 4, Some("x")).unwrap(), 10);
        exporter.wait();

        let lines = read_lines(&path);
        assert_eq!(lines.iter().map(|l| first_field(l)).collect::<Vec<_>>(), vec![6, 7, 8, 9]);
        assert!(lines.iter().all(|l| l.ends_with(", x")));
    }

    #[test]
    fn test_empty_snapshot_does_no_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaze.csv");
        let exporter = SnapshotExporter::new();

        assert_eq!(exporter.export(&GazeSampleBuffer::new(4), &path, 5, None).unwrap(), 0);
        assert!(exporter.wait().is_none());
        assert!(!path.exists());
        assert_eq!(exporter.exports_started(), 0);
    }

    #[test]
    fn test_back_to_back_exports_append_whole_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaze.csv");
        let buffer = GazeSampleBuffer::new(10_000);
        let exporter = SnapshotExporter::new();

        for ts in 0..2000 {
            buffer.push(sample(ts));
        }
        exporter.export(&buffer, &path, 0, None).unwrap();
        for ts in 2000..4000 {
            buffer.push(sample(ts));
        }
        exporter.export(&buffer, &path, 0, None).unwrap();
        exporter.wait();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 4000);
        assert!(lines.iter().all(|l| l.split(SEPARATOR).count() == GAZE_FIELD_COUNT));
        let stamps: Vec<i64> = lines.iter().map(|l| first_field(l)).collect();
        assert_eq!(stamps, (0..4000).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_exports_keep_snapshot_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaze.csv");
        let buffer = Arc::new(GazeSampleBuffer::new(100_000));
        let exporter = Arc::new(SnapshotExporter::new());
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let buffer = Arc::clone(&buffer);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for ts in 0..20_000 {
                    buffer.push(sample(ts));
                }
                done.store(true, Ordering::Release);
            })
        };

        let exporters: Vec<_> = (0..3)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                let exporter = Arc::clone(&exporter);
                let done = Arc::clone(&done);
                let path = path.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        exporter.export(&buffer, &path, 0, None).unwrap();
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for handle in exporters {
            handle.join().unwrap();
        }
        exporter.export(&buffer, &path, 0, None).unwrap();
        exporter.wait();

        let stamps: Vec<i64> = read_lines(&path).iter().map(|l| first_field(l)).collect();
        assert_eq!(stamps, (0..20_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_write_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("gaze.csv");
        let buffer = GazeSampleBuffer::new(4);
        buffer.push(sample(1));

        let exporter = SnapshotExporter::new();
        assert_eq!(exporter.export(&buffer, &path, 1, None).unwrap(), 1);
        assert!(exporter.wait().unwrap().is_err());
    }
}
