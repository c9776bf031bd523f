//! Frame source: decoding input bytes into an RGBA raster surface.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `ImageReader::with_guessed_format` (magic bytes, not file name) |
//! | Decode (PNG, JPEG) | `image` crate pure-Rust decoders |
//! | Render to target size | `image::imageops::resize` with `Lanczos3` |
//!
//! The decoder reads from an in-memory cursor owned by [`decode`]; it is
//! dropped before the function returns on every path.

use crate::error::ConversionError;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Formats accepted as conversion input.
const ACCEPTED_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Jpeg];

/// Decoded still image: RGBA, row-major, 4 bytes per pixel.
///
/// Immutable once constructed. `pixels().len() == width * height * 4` always
/// holds because the buffer is an [`RgbaImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    /// Wrap a raw RGBA buffer. Fails if the length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ConversionError> {
        let actual = pixels.len();
        let mismatch = || {
            ConversionError::Decode(format!(
                "RGBA buffer of {actual} bytes does not match {width}x{height}"
            ))
        };
        if actual as u64 != width as u64 * height as u64 * 4 {
            return Err(mismatch());
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(|image| Self { image })
            .ok_or_else(mismatch)
    }

    /// A surface filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Draw this surface once onto a fresh `width`x`height` surface.
    ///
    /// Same-size renders are a plain copy. An empty source yields a
    /// transparent surface of the requested size.
    pub fn render(&self, width: u32, height: u32) -> RasterSurface {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        if self.width() == 0 || self.height() == 0 {
            return Self::solid(width, height, [0, 0, 0, 0]);
        }
        Self {
            image: image::imageops::resize(&self.image, width, height, FilterType::Lanczos3),
        }
    }
}

/// Decode PNG or JPEG bytes into a [`RasterSurface`].
///
/// The format is sniffed from content, so a misnamed file still decodes and a
/// non-image named `*.png` fails with [`ConversionError::Decode`].
pub fn decode(bytes: &[u8]) -> Result<RasterSurface, ConversionError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ConversionError::Decode(format!("Failed to read image header: {e}")))?;

    match reader.format() {
        Some(format) if ACCEPTED_FORMATS.contains(&format) => {}
        Some(format) => {
            return Err(ConversionError::Decode(format!(
                "Unsupported input format: {format:?}"
            )));
        }
        None => {
            return Err(ConversionError::Decode(
                "Failed to load image: unrecognized data".into(),
            ));
        }
    }

    let decoded = reader
        .decode()
        .map_err(|e| ConversionError::Decode(format!("Failed to load image: {e}")))?;
    Ok(RasterSurface {
        image: decoded.to_rgba8(),
    })
}
