//! Model boundary: what an image classifier must provide.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::PixelBuffer;

/// Classifier errors.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Raw output of one forward pass.
///
/// Models expose a top-1 label, a class → probability mapping, or both.
/// Probabilities keep the order the model reported them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_label: Option<String>,
    pub class_probabilities: Option<Vec<(String, f64)>>,
}

impl Prediction {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            class_label: Some(label.into()),
            class_probabilities: None,
        }
    }

    pub fn probabilities<I, S>(probs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            class_label: None,
            class_probabilities: Some(probs.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

/// A loaded, immutable image classification model.
pub trait ImageModel: Send + Sync {
    /// Run one forward pass.
    fn predict(&self, input: &PixelBuffer) -> ClassifierResult<Prediction>;
}

/// Produces a ready-to-run model.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> ClassifierResult<Arc<dyn ImageModel>>;
}

/// Loader for a model that is already in memory.
pub struct Preloaded(pub Arc<dyn ImageModel>);

impl ModelLoader for Preloaded {
    fn load(&self) -> ClassifierResult<Arc<dyn ImageModel>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Model that returns the same prediction for every input (for testing).
pub struct FixedModel {
    prediction: Prediction,
}

impl FixedModel {
    pub fn new(prediction: Prediction) -> Self {
        Self { prediction }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::new(Prediction::label(label))
    }
}

impl ImageModel for FixedModel {
    fn predict(&self, _input: &PixelBuffer) -> ClassifierResult<Prediction> {
        Ok(self.prediction.clone())
    }
}

/// Model whose every forward pass fails (for testing).
pub struct FailingModel;

impl ImageModel for FailingModel {
    fn predict(&self, _input: &PixelBuffer) -> ClassifierResult<Prediction> {
        Err(ClassifierError::Inference("forward pass failed".into()))
    }
}

/// Loader that can never produce a model (for testing).
pub struct FailingLoader;

impl ModelLoader for FailingLoader {
    fn load(&self) -> ClassifierResult<Arc<dyn ImageModel>> {
        Err(ClassifierError::ModelLoad("model unavailable".into()))
    }
}
