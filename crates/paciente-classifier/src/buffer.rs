//! Pixel buffers handed to image models.

use serde::{Deserialize, Serialize};

/// Rows are padded to a multiple of this many bytes.
pub const ROW_ALIGNMENT: usize = 64;

/// Channel layout of a [`PixelBuffer`]. Every format is 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Filler byte (always 0xFF), then R, G, B.
    #[default]
    Xrgb8888,
    /// R, G, B, A.
    Rgba8888,
    /// R, G, B with no fourth channel.
    Rgb888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Xrgb8888 | PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb888 => 3,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub fn rgb_offsets(&self) -> [usize; 3] {
        match self {
            PixelFormat::Xrgb8888 => [1, 2, 3],
            PixelFormat::Rgba8888 | PixelFormat::Rgb888 => [0, 1, 2],
        }
    }

    /// Stable name used over FFI and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Xrgb8888 => "xrgb8888",
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Rgb888 => "rgb888",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xrgb8888" => Some(PixelFormat::Xrgb8888),
            "rgba8888" => Some(PixelFormat::Rgba8888),
            "rgb888" => Some(PixelFormat::Rgb888),
            _ => None,
        }
    }
}

/// Row stride for an image of `width` pixels in `format`.
pub fn bytes_per_row(width: u32, format: PixelFormat) -> usize {
    let packed = width as usize * format.bytes_per_pixel();
    packed.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

/// A fixed-size, fixed-format image ready for inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    bytes_per_row: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw pixel data. Returns `None` if `data` does not match the
    /// dimensions and stride implied by `format`.
    pub fn from_raw(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let stride = bytes_per_row(width, format);
        if data.len() != stride * height as usize {
            return None;
        }
        Some(Self {
            format,
            width,
            height,
            bytes_per_row: stride,
            data,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Red, green and blue of the pixel at (`x`, `y`).
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let base = y as usize * self.bytes_per_row + x as usize * self.format.bytes_per_pixel();
        let [r, g, b] = self.format.rgb_offsets();
        Some([self.data[base + r], self.data[base + g], self.data[base + b]])
    }
}
