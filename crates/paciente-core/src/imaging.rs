//! Photo preparation: decode, stretch to the model's input size, and lay out
//! pixels in the buffer format the model expects.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use paciente_classifier::{bytes_per_row, PixelBuffer, PixelFormat};
use thiserror::Error;

/// Stored as the label when a photo cannot be prepared for the model.
pub const PREPARE_FAILED_LABEL: &str = "error processing image";

/// Image preparation errors.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Empty canvas: {width}x{height}")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("Image encode error: {0}")]
    Encode(String),
}

pub type PrepareResult<T> = Result<T, PrepareError>;

/// Decode compressed photo bytes (JPEG, PNG, ...).
pub fn decode(bytes: &[u8]) -> PrepareResult<DynamicImage> {
    let image = image::load_from_memory(bytes).map_err(|e| PrepareError::Decode(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PrepareError::EmptyCanvas {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}

/// Stretch `image` to exactly `width` x `height` and render it into a buffer
/// of `format`. Aspect ratio is not preserved.
pub fn prepare(
    image: &DynamicImage,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> PrepareResult<PixelBuffer> {
    if width == 0 || height == 0 {
        return Err(PrepareError::EmptyCanvas { width, height });
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PrepareError::EmptyCanvas {
            width: image.width(),
            height: image.height(),
        });
    }

    let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgba8();

    let stride = bytes_per_row(width, format);
    let bpp = format.bytes_per_pixel();
    let mut data = vec![0u8; stride * height as usize];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let offset = y as usize * stride + x as usize * bpp;
        let out = &mut data[offset..offset + bpp];
        match format {
            PixelFormat::Xrgb8888 => {
                out.copy_from_slice(&[0xFF, over_black(r, a), over_black(g, a), over_black(b, a)])
            }
            PixelFormat::Rgba8888 => out.copy_from_slice(&[r, g, b, a]),
            PixelFormat::Rgb888 => {
                out.copy_from_slice(&[over_black(r, a), over_black(g, a), over_black(b, a)])
            }
        }
    }

    PixelBuffer::from_raw(format, width, height, data)
        .ok_or(PrepareError::EmptyCanvas { width, height })
}

/// Decode then [`prepare`].
pub fn prepare_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> PrepareResult<PixelBuffer> {
    let image = decode(bytes)?;
    prepare(&image, width, height, format)
}

/// Re-encode a photo as JPEG for storage.
pub fn normalize_photo(image: &DynamicImage, quality: u8) -> PrepareResult<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| PrepareError::Encode(e.to_string()))?;
    Ok(out)
}

// Opaque formats drop alpha by compositing onto black.
fn over_black(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16 + 127) / 255) as u8
}
