//! Blocking photo → label work run off the async executor.

use paciente_classifier::Classifier;

use crate::config::CoreConfig;
use crate::imaging::{self, PREPARE_FAILED_LABEL};

/// Result of running one selected photo through preparation and the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoOutcome {
    /// Label or sentinel to store on the draft
    pub label: String,
    /// Re-encoded photo, when normalization is on and decoding succeeded
    pub normalized_photo: Option<Vec<u8>>,
}

/// Decode, prepare and classify one photo. Never fails: preparation errors
/// become [`PREPARE_FAILED_LABEL`], model errors the classifier's sentinel.
pub fn classify_photo(classifier: &Classifier, photo: &[u8], config: &CoreConfig) -> PhotoOutcome {
    let image = match imaging::decode(photo) {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!("selected photo could not be decoded: {e}");
            return PhotoOutcome {
                label: PREPARE_FAILED_LABEL.to_string(),
                normalized_photo: None,
            };
        }
    };

    let normalized_photo = if config.normalize_photo {
        match imaging::normalize_photo(&image, config.photo_quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                tracing::warn!("keeping original photo bytes: {e}");
                None
            }
        }
    } else {
        None
    };

    let label = match imaging::prepare(
        &image,
        config.input_width,
        config.input_height,
        config.pixel_format,
    ) {
        Ok(buffer) => classifier.classify(&buffer).into_label(),
        Err(e) => {
            tracing::warn!("photo could not be prepared for the model: {e}");
            PREPARE_FAILED_LABEL.to_string()
        }
    };

    PhotoOutcome {
        label,
        normalized_photo,
    }
}
