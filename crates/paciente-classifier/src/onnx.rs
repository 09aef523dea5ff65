//! ONNX Runtime model loader (`onnx` feature).
//!
//! Expects a single-input image classifier taking a `[1, 3, H, W]` float
//! tensor and producing `[1, N]` scores, plus a label list with `N` entries.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::model::{ClassifierError, ClassifierResult, ImageModel, ModelLoader, Prediction};

fn default_mean() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_std() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_true() -> bool {
    true
}

/// Where the model lives and how to feed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxModelConfig {
    /// Path to `model.onnx`
    pub model_path: PathBuf,
    /// Class names in output order
    pub labels: Vec<String>,
    /// Per-channel mean subtracted after scaling to [0, 1]
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    /// Per-channel divisor applied after the mean
    #[serde(default = "default_std")]
    pub std: [f32; 3],
    /// Model emits logits rather than probabilities
    #[serde(default = "default_true")]
    pub apply_softmax: bool,
}

impl OnnxModelConfig {
    pub fn new(model_path: impl Into<PathBuf>, labels: Vec<String>) -> Self {
        Self {
            model_path: model_path.into(),
            labels,
            mean: default_mean(),
            std: default_std(),
            apply_softmax: true,
        }
    }

    pub fn from_json(json: &str) -> ClassifierResult<Self> {
        serde_json::from_str(json).map_err(|e| ClassifierError::ModelLoad(e.to_string()))
    }
}

/// Loads an [`OnnxModel`] from disk.
pub struct OnnxModelLoader {
    config: OnnxModelConfig,
}

impl OnnxModelLoader {
    pub fn new(config: OnnxModelConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> ClassifierResult<Arc<dyn ImageModel>> {
        Ok(Arc::new(OnnxModel::load(&self.config.model_path, self.config.clone())?))
    }
}

/// Image classifier backed by ONNX Runtime.
///
/// `Session::run` needs `&mut self`, hence the mutex.
pub struct OnnxModel {
    session: Mutex<Session>,
    config: OnnxModelConfig,
}

impl OnnxModel {
    pub fn load(path: &Path, config: OnnxModelConfig) -> ClassifierResult<Self> {
        if !path.exists() {
            return Err(ClassifierError::ModelLoad(format!(
                "model not found: {}",
                path.display()
            )));
        }
        if config.labels.is_empty() {
            return Err(ClassifierError::ModelLoad("label list is empty".into()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassifierError::ModelLoad(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| ClassifierError::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| ClassifierError::ModelLoad(format!("ONNX load failed: {e}")))?;

        tracing::info!("ONNX classifier loaded from {}", path.display());

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    fn to_tensor(&self, input: &PixelBuffer) -> ndarray::Array4<f32> {
        let (w, h) = (input.width() as usize, input.height() as usize);
        let mut array = ndarray::Array4::<f32>::zeros((1, 3, h, w));
        for y in 0..h {
            for x in 0..w {
                if let Some(rgb) = input.rgb_at(x as u32, y as u32) {
                    for c in 0..3 {
                        let scaled = rgb[c] as f32 / 255.0;
                        array[[0, c, y, x]] = (scaled - self.config.mean[c]) / self.config.std[c];
                    }
                }
            }
        }
        array
    }
}

impl ImageModel for OnnxModel {
    fn predict(&self, input: &PixelBuffer) -> ClassifierResult<Prediction> {
        let array = self.to_tensor(input);
        let tensor = TensorRef::from_array_view(&array)
            .map_err(|e| ClassifierError::InvalidInput(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ClassifierError::Inference(format!("ONNX inference failed: {e}")))?;

        let (shape, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Output extraction: {e}")))?;

        let classes = self.config.labels.len();
        if scores.len() != classes {
            return Err(ClassifierError::Inference(format!(
                "Unexpected output shape: {shape:?}, expected [1, {classes}]"
            )));
        }

        let probs = if self.config.apply_softmax {
            softmax(scores)
        } else {
            scores.iter().map(|&s| s as f64).collect()
        };

        Ok(Prediction::probabilities(
            self.config.labels.iter().cloned().zip(probs),
        ))
    }
}

fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let config = OnnxModelConfig::new("/nonexistent/model.onnx", vec!["burn".into()]);
        let result = OnnxModelLoader::new(config).load();
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config = OnnxModelConfig::from_json(
            r#"{"model_path":"wounds.onnx","labels":["abrasion","laceration"]}"#,
        )
        .unwrap();
        assert_eq!(config.labels.len(), 2);
        assert!(config.apply_softmax);
        assert_eq!(config.std, [1.0, 1.0, 1.0]);
    }
}
