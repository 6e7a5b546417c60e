use serde::{Deserialize, Serialize};

use crate::streaming::mapper::{combine_binocular, normalized_to_pixel};

/// A point or vector in tracker space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A display-relative point, normalized to [0, 1] on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

impl NormPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Display resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width_px: u32,
    pub height_px: u32,
}

impl DisplaySize {
    pub const fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }
}

/// Readings for a single eye
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeSample {
    /// Pupil diameter in millimetres
    pub pupil_diameter_mm: f32,
    /// Eye position inside the track box, normalized
    pub position_in_trackbox: Vec3,
    /// Eyeball centre in millimetres
    pub eyeball_center_mm: Vec3,
    /// Gaze origin in millimetres
    pub gaze_origin_mm: Vec3,
    /// Gaze point in millimetres
    pub gaze_point_mm: Vec3,
    /// Gaze point on the display, normalized
    pub gaze_point_on_display: NormPoint,
}

/// One processed gaze sample.
///
/// The combined pixel point is derived from both eyes when the sample is
/// built and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    timestamp_us: i64,
    left: EyeSample,
    right: EyeSample,
    combined_x: i32,
    combined_y: i32,
}

impl GazeSample {
    /// Build a sample, mapping each eye onto `display` and averaging the two.
    pub fn new(timestamp_us: i64, left: EyeSample, right: EyeSample, display: DisplaySize) -> Self {
        let left_px = normalized_to_pixel(
            left.gaze_point_on_display.x,
            left.gaze_point_on_display.y,
            display.width_px,
            display.height_px,
        );
        let right_px = normalized_to_pixel(
            right.gaze_point_on_display.x,
            right.gaze_point_on_display.y,
            display.width_px,
            display.height_px,
        );
        let (combined_x, combined_y) = combine_binocular(left_px, right_px);

        Self {
            timestamp_us,
            left,
            right,
            combined_x,
            combined_y,
        }
    }

    /// Host-clock timestamp in microseconds
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn left(&self) -> &EyeSample {
        &self.left
    }

    pub fn right(&self) -> &EyeSample {
        &self.right
    }

    pub fn combined_x(&self) -> i32 {
        self.combined_x
    }

    pub fn combined_y(&self) -> i32 {
        self.combined_y
    }

    pub fn combined(&self) -> (i32, i32) {
        (self.combined_x, self.combined_y)
    }
}

/// Average of the most recent buffered gaze points.
///
/// `n_samples == 0` means there is no smoothed point yet; the coordinates
/// are meaningless in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmoothedGazePoint {
    pub n_samples: usize,
    pub x_coord: i32,
    pub y_coord: i32,
}

impl SmoothedGazePoint {
    pub fn is_valid(&self) -> bool {
        self.n_samples > 0
    }

    pub fn point(&self) -> Option<(i32, i32)> {
        self.is_valid().then_some((self.x_coord, self.y_coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye_at(x: f32, y: f32) -> EyeSample {
        EyeSample {
            gaze_point_on_display: NormPoint::new(x, y),
            ..Default::default()
        }
    }

    #[test]
    fn test_combined_point_is_binocular_midpoint() {
        let sample = GazeSample::new(
            42,
            eye_at(0.25, 0.5),
            eye_at(0.75, 0.5),
            DisplaySize::new(1920, 1080),
        );

        assert_eq!(sample.timestamp_us(), 42);
        assert_eq!(sample.combined(), (960, 540));
    }

    #[test]
    fn test_empty_smoothed_point_has_no_point() {
        let smoothed = SmoothedGazePoint::default();
        assert!(!smoothed.is_valid());
        assert_eq!(smoothed.point(), None);

        let smoothed = SmoothedGazePoint {
            n_samples: 3,
            x_coord: 10,
            y_coord: 20,
        };
        assert_eq!(smoothed.point(), Some((10, 20)));
    }
}
