//! Gaze coordinate correction.
//!
//! A corrector maps a processed [`GazeSample`] to a corrected on-screen
//! point. The pipeline only sees the [`CoordCorrector`] trait; two
//! implementations are provided:
//!
//! - [`AffineCorrector`]: a native linear model whose coefficients are read
//!   from a YAML file.
//! - [`RemoteCorrector`]: forwards the features to a local inference
//!   service over HTTP and reads back `{"x": .., "y": ..}`.
//!
//! Both consume the same eight features: left eye track-box position
//! (xyz), right eye track-box position (xyz), and the combined pixel point.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GazeError, Result};
use crate::types::GazeSample;

pub const FEATURE_COUNT: usize = 8;

/// Maps a gaze sample to a corrected pixel coordinate
pub trait CoordCorrector: Send + Sync {
    fn predict(&self, sample: &GazeSample) -> Result<(i32, i32)>;

    fn name(&self) -> &str;
}

/// Which corrector to build, as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelConfig {
    Affine {
        path: PathBuf,
    },
    Remote {
        url: String,
        #[serde(default = "default_remote_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_remote_timeout_ms() -> u64 {
    50
}

/// Build the corrector described by `config`
pub fn create_corrector(config: &ModelConfig) -> Result<Box<dyn CoordCorrector>> {
    match config {
        ModelConfig::Affine { path } => Ok(Box::new(AffineCorrector::from_file(path)?)),
        ModelConfig::Remote { url, timeout_ms } => Ok(Box::new(RemoteCorrector::new(
            url.clone(),
            Duration::from_millis(*timeout_ms),
        )?)),
    }
}

/// Model inputs for `sample`, in the fixed feature order
pub fn features(sample: &GazeSample) -> [f32; FEATURE_COUNT] {
    let left = sample.left().position_in_trackbox;
    let right = sample.right().position_in_trackbox;
    [
        left.x,
        left.y,
        left.z,
        right.x,
        right.y,
        right.z,
        sample.combined_x() as f32,
        sample.combined_y() as f32,
    ]
}

/// Linear model: each output is `w · features + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineCorrector {
    /// Eight weights followed by the bias term
    x: Vec<f32>,
    y: Vec<f32>,
}

impl AffineCorrector {
    pub fn new(x: Vec<f32>, y: Vec<f32>) -> Result<Self> {
        for (axis, coeffs) in [("x", &x), ("y", &y)] {
            if coeffs.len() != FEATURE_COUNT + 1 {
                return Err(GazeError::Correction(format!(
                    "{} model needs {} coefficients, found {}",
                    axis,
                    FEATURE_COUNT + 1,
                    coeffs.len()
                )));
            }
        }
        Ok(Self { x, y })
    }

    /// Model that returns the combined point unchanged
    pub fn identity() -> Self {
        let mut x = vec![0.0; FEATURE_COUNT + 1];
        let mut y = vec![0.0; FEATURE_COUNT + 1];
        x[6] = 1.0;
        y[7] = 1.0;
        Self { x, y }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GazeError::Correction(format!("Cannot read model {}: {}", path.display(), e))
        })?;
        let raw: AffineCorrector = serde_yaml::from_str(&text).map_err(|e| {
            GazeError::Correction(format!("Cannot parse model {}: {}", path.display(), e))
        })?;
        Self::new(raw.x, raw.y)
    }

    fn apply(coeffs: &[f32], features: &[f32; FEATURE_COUNT]) -> f32 {
        let dot: f32 = coeffs.iter().zip(features).map(|(w, f)| w * f).sum();
        dot + coeffs[FEATURE_COUNT]
    }
}

impl CoordCorrector for AffineCorrector {
    fn predict(&self, sample: &GazeSample) -> Result<(i32, i32)> {
        let f = features(sample);
        let x = Self::apply(&self.x, &f);
        let y = Self::apply(&self.y, &f);
        if !x.is_finite() || !y.is_finite() {
            return Err(GazeError::Correction("model produced a non-finite point".into()));
        }
        Ok((x.round() as i32, y.round() as i32))
    }

    fn name(&self) -> &str {
        "affine"
    }
}

#[derive(Serialize)]
struct PredictRequest {
    features: [f32; FEATURE_COUNT],
}

#[derive(Deserialize)]
struct PredictResponse {
    x: f64,
    y: f64,
}

/// Corrector served by a local inference process
pub struct RemoteCorrector {
    client: reqwest::blocking::Client,
    url: String,
}

impl RemoteCorrector {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GazeError::Correction(format!("HTTP client error: {}", e)))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CoordCorrector for RemoteCorrector {
    fn predict(&self, sample: &GazeSample) -> Result<(i32, i32)> {
        let request = PredictRequest {
            features: features(sample),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| GazeError::Correction(format!("Prediction request failed: {}", e)))?;

        let point: PredictResponse = response
            .json()
            .map_err(|e| GazeError::Correction(format!("Invalid prediction response: {}", e)))?;

        Ok((point.x.round() as i32, point.y.round() as i32))
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DisplaySize, EyeSample, NormPoint, Vec3};
    use std::io::Write;

    fn sample() -> GazeSample {
        let eye = |x: f32, pos: Vec3| EyeSample {
            position_in_trackbox: pos,
            gaze_point_on_display: NormPoint::new(x, 0.5),
            ..Default::default()
        };
        GazeSample::new(
            0,
            eye(0.25, Vec3::new(0.4, 0.5, 0.6)),
            eye(0.75, Vec3::new(0.6, 0.5, 0.6)),
            DisplaySize::new(1920, 1080),
        )
    }

    #[test]
    fn test_identity_model_returns_combined_point() {
        let point = AffineCorrector::identity().predict(&sample()).unwrap();
        assert_eq!(point, (960, 540));
    }

    #[test]
    fn test_affine_model_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "x: [100, 0, 0, 0, 0, 0, 1, 0, 5]\ny: [0, 0, 0, 0, 0, 0, 0, 0.5, -10]"
        )
        .unwrap();

        let model = AffineCorrector::from_file(file.path()).unwrap();
        // x = 100 * 0.4 + 960 + 5, y = 0.5 * 540 - 10
        assert_eq!(model.predict(&sample()).unwrap(), (1005, 260));
    }

    #[test]
    fn test_affine_model_rejects_wrong_length() {
        assert!(matches!(
            AffineCorrector::new(vec![1.0; 3], vec![1.0; 9]),
            Err(GazeError::Correction(_))
        ));
    }

    #[test]
    fn test_model_config_yaml() {
        let config: ModelConfig = serde_yaml::from_str("type: remote\nurl: http://127.0.0.1:9000/predict\n").unwrap();
        assert_eq!(
            config,
            ModelConfig::Remote {
                url: "http://127.0.0.1:9000/predict".to_string(),
                timeout_ms: 50,
            }
        );
    }

    #[test]
    fn test_unreachable_remote_is_an_error() {
        let corrector =
            RemoteCorrector::new("http://127.0.0.1:1/predict".to_string(), Duration::from_millis(200))
                .unwrap();
        assert!(corrector.predict(&sample()).is_err());
    }
}
