//! Image normalization: decode, force RGB, bound the longer edge, re-encode PNG.
//!
//! | Step | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image::load_from_memory` |
//! | Drop alpha / expand gray | `DynamicImage::to_rgb8` |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Encode | `image::codecs::png::PngEncoder` (lossless) |

use super::calculations::bounded_dimensions;
use super::source::SourceLoader;
use crate::error::JobError;
use crate::types::ImageSource;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::io::Write;

/// A canonical RGB image, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns any supported image source into a [`NormalizedImage`].
pub struct Normalizer {
    loader: SourceLoader,
}

impl Normalizer {
    pub fn new(loader: SourceLoader) -> Self {
        Self { loader }
    }

    /// Load `source` and normalize it with `max_edge` as the longer-edge bound.
    pub fn normalize(&self, source: &ImageSource, max_edge: u32) -> Result<NormalizedImage, JobError> {
        let raw = self.loader.load(source)?;
        normalize_bytes(&raw, max_edge)
    }
}

/// Normalize already-loaded image bytes.
pub fn normalize_bytes(raw: &[u8], max_edge: u32) -> Result<NormalizedImage, JobError> {
    if max_edge == 0 {
        return Err(JobError::InvalidInput("max_edge must be positive".into()));
    }
    let decoded = image::load_from_memory(raw)
        .map_err(|e| JobError::Decode(format!("unreadable image: {e}")))?;
    let rgb = decoded.to_rgb8();

    let original = rgb.dimensions();
    let (width, height) = bounded_dimensions(original, max_edge);
    let rgb = if (width, height) == original {
        rgb
    } else {
        tracing::debug!(
            from = ?original,
            to = ?(width, height),
            "downscaling input image"
        );
        image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    };

    let mut bytes = Vec::new();
    encode_png(&rgb, &mut bytes)?;
    Ok(NormalizedImage {
        bytes,
        width,
        height,
    })
}

fn encode_png<W: Write>(img: &RgbImage, out: W) -> Result<(), JobError> {
    PngEncoder::new(out)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|e| JobError::Encode(format!("PNG: {e}")))
}
