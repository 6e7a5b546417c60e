// Device-to-screen coordinate mapping
//
// Normalized display coordinates become pixels by scaling with the display
// resolution. The combined point of a sample is the mean of the two eyes'
// pixel points. Smoothing averages the last N buffered points, or the
// corrector's output for them when a correction model is configured.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::correction::CoordCorrector;
use crate::streaming::buffer::GazeSampleBuffer;
use crate::types::{DisplaySize, EyeSample, GazeSample, SmoothedGazePoint};

/// Scale a normalized point to pixels, rounding to nearest
pub fn normalized_to_pixel(x_norm: f32, y_norm: f32, disp_w_px: u32, disp_h_px: u32) -> (i32, i32) {
    let x = (f64::from(x_norm) * f64::from(disp_w_px)).round();
    let y = (f64::from(y_norm) * f64::from(disp_h_px)).round();
    (x as i32, y as i32)
}

/// Midpoint of the two eyes' pixel coordinates
pub fn combine_binocular(left_px: (i32, i32), right_px: (i32, i32)) -> (i32, i32) {
    let mid = |a: i32, b: i32| ((i64::from(a) + i64::from(b)) as f64 / 2.0).round() as i32;
    (mid(left_px.0, right_px.0), mid(left_px.1, right_px.1))
}

/// Maps samples to screen space and smooths buffered points
pub struct CoordinateMapper {
    display: DisplaySize,
    corrector: Option<Box<dyn CoordCorrector>>,
    correction_warned: AtomicBool,
}

impl CoordinateMapper {
    pub fn new(display: DisplaySize) -> Self {
        Self {
            display,
            corrector: None,
            correction_warned: AtomicBool::new(false),
        }
    }

    pub fn with_corrector(mut self, corrector: Box<dyn CoordCorrector>) -> Self {
        log::info!("Gaze correction enabled ({})", corrector.name());
        self.corrector = Some(corrector);
        self
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    pub fn has_corrector(&self) -> bool {
        self.corrector.is_some()
    }

    /// Pixel position of one eye's gaze point
    pub fn eye_to_pixel(&self, eye: &EyeSample) -> (i32, i32) {
        normalized_to_pixel(
            eye.gaze_point_on_display.x,
            eye.gaze_point_on_display.y,
            self.display.width_px,
            self.display.height_px,
        )
    }

    /// Build a processed sample stamped with the host-clock `timestamp_us`
    pub fn build_sample(&self, timestamp_us: i64, left: EyeSample, right: EyeSample) -> GazeSample {
        GazeSample::new(timestamp_us, left, right, self.display)
    }

    /// Screen point for one sample, corrected when a model is configured.
    ///
    /// A failed prediction falls back to the combined point; only the first
    /// failure is logged.
    pub fn point_for(&self, sample: &GazeSample) -> (i32, i32) {
        let Some(corrector) = &self.corrector else {
            return sample.combined();
        };

        match corrector.predict(sample) {
            Ok(point) => point,
            Err(e) => {
                if !self.correction_warned.swap(true, Ordering::Relaxed) {
                    log::warn!("Gaze correction failed, using uncorrected points: {}", e);
                } else {
                    log::trace!("Gaze correction failed: {}", e);
                }
                sample.combined()
            }
        }
    }

    /// Mean point of the last `min(n, len)` buffered samples
    pub fn smoothed(&self, buffer: &GazeSampleBuffer, n: usize) -> SmoothedGazePoint {
        let window = buffer.recent(n);
        if window.is_empty() {
            return SmoothedGazePoint::default();
        }

        let (sum_x, sum_y) = window
            .iter()
            .map(|sample| self.point_for(sample))
            .fold((0i64, 0i64), |(sx, sy), (x, y)| {
                (sx + i64::from(x), sy + i64::from(y))
            });

        let count = window.len() as f64;
        SmoothedGazePoint {
            n_samples: window.len(),
            x_coord: (sum_x as f64 / count).round() as i32,
            y_coord: (sum_y as f64 / count).round() as i32,
        }
    }
}
