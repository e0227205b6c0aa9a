//! Image normalization: decode whatever the caller sent, bound its longest
//! side and re-encode it as a JPEG data URL the vision model can read inline.

use crate::config::{Settings, JPEG_QUALITY, MAX_SIDE};
use base64::{engine::general_purpose, Engine as _};
use image::error::{EncodingError, ImageFormatHint};
use image::imageops::{self, FilterType};
use image::{ImageError, ImageFormat, ImageResult, RgbImage};
use jpeg_encoder::{ColorType as JpegColor, Encoder};
use std::fmt::Debug;

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Longest side of the output; larger images are shrunk, smaller ones
    /// are left as they are
    pub max_side: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            max_side: MAX_SIDE,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl From<&Settings> for NormalizeOptions {
    fn from(settings: &Settings) -> Self {
        NormalizeOptions {
            max_side: settings.max_side,
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// A re-encoded image, ready to be embedded in a chat message
pub struct NormalizedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,

    /// Size of the JPEG before base 64 encoding
    pub bytes: usize,
}

impl Debug for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NormalizedImage {{ data_url: <data>, {}x{} (from {}x{}), {} bytes }}",
            self.width, self.height, self.source_width, self.source_height, self.bytes
        )
    }
}

/// Dimensions after bounding the longest side to `max_side`, keeping the
/// aspect ratio. Never enlarges. Truncates like an integer cast and keeps at
/// least one pixel per side.
pub fn scaled_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side {
        return (width, height);
    }
    let scale = |side: u32| {
        let scaled = u64::from(side) * u64::from(max_side) / u64::from(longest);
        scaled.max(1) as u32
    };
    (scale(width), scale(height))
}

/// Decode `raw`, force it to RGB, shrink it if needed and re-encode it as a
/// JPEG data URL
pub fn normalize(raw: &[u8], opts: NormalizeOptions) -> ImageResult<NormalizedImage> {
    let source = image::load_from_memory(raw)?.to_rgb8();
    let (source_width, source_height) = source.dimensions();

    let (width, height) = scaled_dimensions(source_width, source_height, opts.max_side);
    let image = if (width, height) == (source_width, source_height) {
        source
    } else {
        imageops::resize(&source, width, height, FilterType::CatmullRom)
    };

    let jpeg = encode_jpeg(&image, opts.jpeg_quality)?;
    let data_url = format!(
        "{JPEG_DATA_URL_PREFIX}{}",
        general_purpose::STANDARD.encode(&jpeg)
    );

    Ok(NormalizedImage {
        data_url,
        width,
        height,
        source_width,
        source_height,
        bytes: jpeg.len(),
    })
}

/// Baseline JPEG with optimized Huffman tables
fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let width = u16::try_from(image.width()).map_err(jpeg_error)?;
    let height = u16::try_from(image.height()).map_err(jpeg_error)?;

    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, quality);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(image.as_raw(), width, height, JpegColor::Rgb)
        .map_err(jpeg_error)?;
    Ok(buf)
}

fn jpeg_error(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> ImageError {
    ImageError::Encoding(EncodingError::new(
        ImageFormatHint::Exact(ImageFormat::Jpeg),
        err,
    ))
}
