//! Label extraction from model output.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::model::{ClassifierResult, ImageModel, ModelLoader, Preloaded, Prediction};

/// Stored when the model produced neither a label nor probabilities.
pub const NO_RESULT_LABEL: &str = "no result";

/// Stored when loading the model or running inference failed.
pub const CLASSIFY_FAILED_LABEL: &str = "error classifying";

/// Outcome of one classification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Best class reported by the model
    Label(String),
    /// Model ran but gave nothing usable
    NoResult,
    /// Model could not be loaded or run
    Failed,
}

impl Classification {
    /// The text stored on the patient record.
    pub fn as_label(&self) -> &str {
        match self {
            Classification::Label(label) => label,
            Classification::NoResult => NO_RESULT_LABEL,
            Classification::Failed => CLASSIFY_FAILED_LABEL,
        }
    }

    pub fn into_label(self) -> String {
        match self {
            Classification::Label(label) => label,
            other => other.as_label().to_string(),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Classification::Label(_))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Pick a single label out of a prediction.
///
/// A non-empty top-1 label wins. Otherwise the class with the strictly
/// greatest probability is used; on ties the first one seen is kept and NaN
/// entries are skipped.
pub fn extract_label(prediction: &Prediction) -> Classification {
    if let Some(label) = prediction.class_label.as_deref().filter(|l| !l.is_empty()) {
        return Classification::Label(label.to_string());
    }

    let best = prediction
        .class_probabilities
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|(_, p)| !p.is_nan())
        .fold(None::<&(String, f64)>, |best, entry| match best {
            Some(current) if current.1 >= entry.1 => Some(current),
            _ => Some(entry),
        });

    match best {
        Some((label, _)) => Classification::Label(label.clone()),
        None => Classification::NoResult,
    }
}

/// Best-effort classifier adapter.
///
/// Loads the model lazily on first use and keeps it. A failed load is not
/// cached, so the next photo tries again.
pub struct Classifier {
    loader: Box<dyn ModelLoader>,
    model: Mutex<Option<Arc<dyn ImageModel>>>,
}

impl Classifier {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(None),
        }
    }

    /// Classifier over a model that is already loaded.
    pub fn with_model(model: Arc<dyn ImageModel>) -> Self {
        Self::new(Preloaded(model))
    }

    fn model(&self) -> ClassifierResult<Arc<dyn ImageModel>> {
        let mut slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = self.loader.load()?;
        tracing::debug!("classification model loaded");
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Classify one prepared image. Never fails: errors become
    /// [`Classification::Failed`].
    pub fn classify(&self, input: &PixelBuffer) -> Classification {
        let prediction = self.model().and_then(|model| model.predict(input));

        match prediction {
            Ok(prediction) => {
                let classification = extract_label(&prediction);
                tracing::debug!(label = classification.as_label(), "classified image");
                classification
            }
            Err(e) => {
                tracing::warn!("classification failed: {e}");
                Classification::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;
    use crate::model::{ClassifierError, FailingLoader, FailingModel, FixedModel};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn blank_buffer() -> PixelBuffer {
        PixelBuffer::from_raw(PixelFormat::Xrgb8888, 2, 2, vec![0xFF; 128]).unwrap()
    }

    #[test]
    fn test_label_output_preferred() {
        let prediction = Prediction {
            class_label: Some("abrasion".into()),
            class_probabilities: Some(vec![("laceration".into(), 0.9)]),
        };
        assert_eq!(extract_label(&prediction), Classification::Label("abrasion".into()));
    }

    #[test]
    fn test_max_probability_wins() {
        let prediction = Prediction::probabilities([("A", 0.2), ("B", 0.7), ("C", 0.1)]);
        assert_eq!(extract_label(&prediction), Classification::Label("B".into()));
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let prediction = Prediction::probabilities([("A", 0.1), ("B", 0.45), ("C", 0.45)]);
        assert_eq!(extract_label(&prediction), Classification::Label("B".into()));
    }

    #[test]
    fn test_empty_label_falls_through_to_probabilities() {
        let prediction = Prediction {
            class_label: Some(String::new()),
            class_probabilities: Some(vec![("burn".into(), 0.6)]),
        };
        assert_eq!(extract_label(&prediction), Classification::Label("burn".into()));
    }

    #[test]
    fn test_nan_probabilities_ignored() {
        let prediction = Prediction::probabilities([("A", f64::NAN), ("B", 0.3)]);
        assert_eq!(extract_label(&prediction), Classification::Label("B".into()));

        let prediction = Prediction::probabilities([("A", f64::NAN)]);
        assert_eq!(extract_label(&prediction), Classification::NoResult);
    }

    #[test]
    fn test_nothing_usable_is_no_result() {
        assert_eq!(extract_label(&Prediction::default()), Classification::NoResult);
        let empty = Prediction::probabilities(Vec::<(String, f64)>::new());
        assert_eq!(extract_label(&empty), Classification::NoResult);
    }

    #[test]
    fn test_sentinel_labels() {
        assert_eq!(Classification::NoResult.into_label(), "no result");
        assert_eq!(Classification::Failed.into_label(), "error classifying");
        assert_eq!(Classification::Label("bruise".into()).to_string(), "bruise");
    }

    #[test]
    fn test_classify_with_fixed_model() {
        let classifier = Classifier::with_model(Arc::new(FixedModel::label("laceration")));
        assert_eq!(
            classifier.classify(&blank_buffer()),
            Classification::Label("laceration".into())
        );
    }

    #[test]
    fn test_inference_error_becomes_sentinel() {
        let classifier = Classifier::with_model(Arc::new(FailingModel));
        assert_eq!(classifier.classify(&blank_buffer()), Classification::Failed);
    }

    #[test]
    fn test_load_error_becomes_sentinel() {
        let classifier = Classifier::new(FailingLoader);
        assert_eq!(classifier.classify(&blank_buffer()), Classification::Failed);
    }

    struct FlakyLoader {
        attempts: AtomicUsize,
    }

    impl ModelLoader for FlakyLoader {
        fn load(&self) -> ClassifierResult<Arc<dyn ImageModel>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ClassifierError::ModelLoad("not yet".into()))
            } else {
                Ok(Arc::new(FixedModel::label("burn")))
            }
        }
    }

    #[test]
    fn test_failed_load_retried_then_cached() {
        let classifier = Classifier::new(FlakyLoader {
            attempts: AtomicUsize::new(0),
        });

        assert_eq!(classifier.classify(&blank_buffer()), Classification::Failed);
        assert_eq!(classifier.classify(&blank_buffer()), Classification::Label("burn".into()));
        assert_eq!(classifier.classify(&blank_buffer()), Classification::Label("burn".into()));
    }

    proptest! {
        #[test]
        fn prop_extracted_class_has_max_probability(
            probs in prop::collection::vec(0.0f64..1.0, 1..12)
        ) {
            let entries: Vec<(String, f64)> = probs
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("class-{i}"), *p))
                .collect();
            let prediction = Prediction::probabilities(entries.clone());

            let Classification::Label(label) = extract_label(&prediction) else {
                panic!("expected a label");
            };
            let idx = entries.iter().position(|(k, _)| *k == label).unwrap();
            let max = probs.iter().cloned().fold(f64::MIN, f64::max);
            prop_assert_eq!(entries[idx].1, max);
            prop_assert!(entries[..idx].iter().all(|(_, p)| *p < max));
        }
    }
}
