//! Runtime configuration.

use paciente_classifier::PixelFormat;
use serde::{Deserialize, Serialize};

/// Input size the bundled wound classifier was trained on.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Largest accepted model input side. Keeps the prepared buffer bounded.
pub const MAX_INPUT_SIZE: u32 = 4096;

/// JPEG quality used when storing the selected photo.
pub const DEFAULT_PHOTO_QUALITY: u8 = 80;

/// Core configuration, usually supplied by the host app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Width of the buffer handed to the model
    pub input_width: u32,
    /// Height of the buffer handed to the model
    pub input_height: u32,
    /// Channel layout of the buffer handed to the model
    pub pixel_format: PixelFormat,
    /// Re-encode the selected photo as JPEG before storing it
    pub normalize_photo: bool,
    /// JPEG quality (1-100) when `normalize_photo` is set
    pub photo_quality: u8,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            pixel_format: PixelFormat::default(),
            normalize_photo: true,
            photo_quality: DEFAULT_PHOTO_QUALITY,
        }
    }
}

impl CoreConfig {
    /// Parse from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Clamp values the imaging code cannot work with.
    pub fn sanitized(mut self) -> Self {
        self.photo_quality = self.photo_quality.clamp(1, 100);
        self.input_width = self.input_width.clamp(1, MAX_INPUT_SIZE);
        self.input_height = self.input_height.clamp(1, MAX_INPUT_SIZE);
        self
    }
}
