//! Palette pipeline: quantize a surface and write a minimal looping GIF.
//!
//! The target platform shows single-frame GIFs as static images, so the
//! output always carries exactly two identical frames:
//!
//! | | Frame 1 | Frame 2 |
//! |---|---|---|
//! | Pixels | indexed plane | same indexed plane |
//! | Palette | written as the global color table ahead of frame 1 | none (inherits) |
//! | Loop | NETSCAPE repeat-forever directive | none (global) |
//! | Delay | `frame_delay` | `frame_delay` |
//! | Disposal | restore to background | restore to background |
//!
//! Quantization uses an exact palette when the surface has no more distinct
//! colors than allowed, and NeuQuant (`color_quant`) otherwise. Pixel-to-index
//! mapping runs on the rayon pool.

use super::surface::RasterSurface;
use crate::error::ConversionError;
use crate::types::{EncodedContainer, GIF_MEDIA_TYPE};
use color_quant::NeuQuant;
use gif::{DisposalMethod, Encoder, Frame, Repeat};
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;

/// Number of frames in every palette artifact.
pub const PALETTE_FRAME_COUNT: u32 = 2;

/// Tuning for the palette pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteSettings {
    /// Upper bound on palette entries (2..=256).
    pub max_colors: usize,
    /// NeuQuant sampling factor (1 = best quality, 30 = fastest).
    pub sample_factor: i32,
    /// Per-frame delay in hundredths of a second.
    pub frame_delay: u16,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            max_colors: 256,
            sample_factor: 10,
            frame_delay: 10,
        }
    }
}

/// Ordered RGB color table, at most 256 entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<[u8; 3]>,
}

impl Palette {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    /// Flat `r, g, b, r, g, b, …` layout as GIF color tables expect.
    pub fn to_flat_rgb(&self) -> Vec<u8> {
        self.entries.iter().flatten().copied().collect()
    }
}

enum Mapper {
    Exact(HashMap<[u8; 3], u8>),
    Neural(NeuQuant),
}

/// A palette plus the means to map pixels onto it.
pub struct Quantized {
    palette: Palette,
    mapper: Mapper,
}

impl Quantized {
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Palette index for one RGBA pixel.
    pub fn index_of(&self, rgba: &[u8]) -> u8 {
        match &self.mapper {
            Mapper::Exact(lookup) => lookup
                .get(&[rgba[0], rgba[1], rgba[2]])
                .copied()
                .unwrap_or(0),
            Mapper::Neural(nq) => nq.index_of(rgba) as u8,
        }
    }
}

/// Reduce the surface's colors to at most `max_colors` entries.
///
/// Deterministic for identical input. Alpha is not preserved.
pub fn quantize(
    surface: &RasterSurface,
    max_colors: usize,
    sample_factor: i32,
) -> Result<Quantized, ConversionError> {
    if !(2..=256).contains(&max_colors) {
        return Err(ConversionError::Quantize(format!(
            "max_colors must be 2-256, got {max_colors}"
        )));
    }
    if !(1..=30).contains(&sample_factor) {
        return Err(ConversionError::Quantize(format!(
            "sample_factor must be 1-30, got {sample_factor}"
        )));
    }
    let pixels = surface.pixels();
    if pixels.is_empty() {
        return Err(ConversionError::Quantize("surface has no pixels".into()));
    }

    if let Some(exact) = exact_palette(pixels, max_colors) {
        return Ok(exact);
    }

    let nq = NeuQuant::new(sample_factor, max_colors, pixels);
    let entries = nq
        .color_map_rgb()
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();
    Ok(Quantized {
        palette: Palette { entries },
        mapper: Mapper::Neural(nq),
    })
}

/// Palette listing every distinct color in first-seen order, if they fit.
fn exact_palette(pixels: &[u8], max_colors: usize) -> Option<Quantized> {
    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut entries = Vec::new();
    for px in pixels.chunks_exact(4) {
        let key = [px[0], px[1], px[2]];
        if lookup.contains_key(&key) {
            continue;
        }
        if entries.len() == max_colors {
            return None;
        }
        lookup.insert(key, entries.len() as u8);
        entries.push(key);
    }
    Some(Quantized {
        palette: Palette { entries },
        mapper: Mapper::Exact(lookup),
    })
}

/// Map every pixel to its nearest palette index (row-major, one byte per pixel).
pub fn apply_palette(surface: &RasterSurface, quantized: &Quantized) -> Vec<u8> {
    surface
        .pixels()
        .par_chunks_exact(4)
        .map(|px| quantized.index_of(px))
        .collect()
}

/// Quantize `surface` and serialize the two-frame looping GIF.
pub fn encode_palette(
    surface: &RasterSurface,
    settings: &PaletteSettings,
) -> Result<EncodedContainer, ConversionError> {
    let (width, height) = surface.dimensions();
    let too_large = || {
        ConversionError::encode(
            format!("Failed to encode GIF. Canvas size: {width}x{height}"),
            "dimensions exceed 65535",
        )
    };
    let gif_width = u16::try_from(width).map_err(|_| too_large())?;
    let gif_height = u16::try_from(height).map_err(|_| too_large())?;

    let quantized = quantize(surface, settings.max_colors, settings.sample_factor)?;
    let indices = apply_palette(surface, &quantized);
    let palette = quantized.palette().to_flat_rgb();
    tracing::debug!(
        width,
        height,
        colors = quantized.palette().len(),
        "quantized surface"
    );

    let gif_err = |e: gif::EncodingError| {
        ConversionError::encode(
            format!("Failed to encode GIF. Canvas size: {width}x{height}"),
            e,
        )
    };

    let mut bytes = Vec::new();
    {
        let mut encoder = Encoder::new(&mut bytes, gif_width, gif_height, &palette).map_err(gif_err)?;
        encoder.set_repeat(Repeat::Infinite).map_err(gif_err)?;

        for _ in 0..PALETTE_FRAME_COUNT {
            let frame = Frame {
                width: gif_width,
                height: gif_height,
                buffer: Cow::Borrowed(indices.as_slice()),
                delay: settings.frame_delay,
                dispose: DisposalMethod::Background,
                palette: None,
                ..Frame::default()
            };
            encoder.write_frame(&frame).map_err(gif_err)?;
        }
        // Dropping the encoder writes the trailer.
    }

    Ok(EncodedContainer {
        bytes,
        media_type: GIF_MEDIA_TYPE,
        suffix: ".gif",
        frames: PALETTE_FRAME_COUNT,
        codec: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gif::{ColorOutput, DecodeOptions};
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> RasterSurface {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255]);
            }
        }
        RasterSurface::from_rgba(width, height, pixels).unwrap()
    }

    struct DecodedGif {
        global_palette: Option<Vec<u8>>,
        repeat: Repeat,
        frames: Vec<gif::Frame<'static>>,
    }

    fn decode_gif(bytes: &[u8]) -> DecodedGif {
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::Indexed);
        let mut decoder = options.read_info(Cursor::new(bytes)).unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            frames.push(frame.clone());
        }
        DecodedGif {
            global_palette: decoder.global_palette().map(|p| p.to_vec()),
            repeat: decoder.repeat(),
            frames,
        }
    }

    // =========================================================================
    // quantize / apply_palette
    // =========================================================================

    #[test]
    fn few_colors_get_an_exact_palette() {
        let mut pixels = Vec::new();
        for i in 0..16u8 {
            pixels.extend_from_slice(&[i * 10, 0, 0, 255]);
        }
        let surface = RasterSurface::from_rgba(4, 4, pixels).unwrap();
        let q = quantize(&surface, 256, 10).unwrap();
        assert_eq!(q.palette().len(), 16);
        let indices = apply_palette(&surface, &q);
        assert_eq!(indices, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn many_colors_are_bounded() {
        let surface = gradient(64, 64);
        let q = quantize(&surface, 256, 10).unwrap();
        assert!(q.palette().len() <= 256);
        assert!(!q.palette().is_empty());
        let indices = apply_palette(&surface, &q);
        assert_eq!(indices.len(), 64 * 64);
        assert!(indices.iter().all(|&i| (i as usize) < q.palette().len()));
    }

    #[test]
    fn smaller_color_budget_is_respected() {
        let surface = gradient(64, 64);
        let q = quantize(&surface, 16, 10).unwrap();
        assert!(q.palette().len() <= 16);
        assert!(apply_palette(&surface, &q).iter().all(|&i| i < 16));
    }

    #[test]
    fn quantize_is_deterministic() {
        let surface = gradient(40, 30);
        let a = quantize(&surface, 256, 10).unwrap();
        let b = quantize(&surface, 256, 10).unwrap();
        assert_eq!(a.palette(), b.palette());
        assert_eq!(apply_palette(&surface, &a), apply_palette(&surface, &b));
    }

    #[test]
    fn quantize_rejects_bad_settings() {
        let surface = gradient(4, 4);
        assert!(matches!(
            quantize(&surface, 1, 10),
            Err(ConversionError::Quantize(_))
        ));
        assert!(matches!(
            quantize(&surface, 300, 10),
            Err(ConversionError::Quantize(_))
        ));
        assert!(matches!(
            quantize(&surface, 256, 0),
            Err(ConversionError::Quantize(_))
        ));
    }

    #[test]
    fn quantize_rejects_empty_surface() {
        let surface = RasterSurface::solid(0, 0, [0, 0, 0, 0]);
        assert!(matches!(
            quantize(&surface, 256, 10),
            Err(ConversionError::Quantize(_))
        ));
    }

    // =========================================================================
    // encode_palette
    // =========================================================================

    #[test]
    fn gif_has_two_identical_looping_frames() {
        let surface = gradient(48, 32);
        let out = encode_palette(&surface, &PaletteSettings::default()).unwrap();
        assert_eq!(out.media_type, "image/gif");
        assert_eq!(out.suffix, ".gif");
        assert_eq!(out.frames, 2);

        let gif = decode_gif(&out.bytes);
        assert_eq!(gif.frames.len(), 2);
        assert_eq!(gif.repeat, Repeat::Infinite);
        assert!(gif.global_palette.is_some());

        let (first, second) = (&gif.frames[0], &gif.frames[1]);
        assert_eq!(first.buffer, second.buffer);
        assert_eq!((first.width, first.height), (48, 32));
        for frame in &gif.frames {
            assert!(frame.palette.is_none());
            assert_eq!(frame.delay, 10);
            assert_eq!(frame.dispose, DisposalMethod::Background);
        }
    }

    #[test]
    fn gif_pixels_match_the_palette_mapping() {
        let surface = RasterSurface::solid(8, 8, [10, 200, 30, 255]);
        let out = encode_palette(&surface, &PaletteSettings::default()).unwrap();
        let gif = decode_gif(&out.bytes);
        let palette = gif.global_palette.unwrap();
        assert_eq!(&palette[..3], &[10, 200, 30]);
        assert!(gif.frames[0].buffer.iter().all(|&i| i == 0));
    }

    #[test]
    fn gif_uses_configured_delay() {
        let settings = PaletteSettings {
            frame_delay: 50,
            ..PaletteSettings::default()
        };
        let out = encode_palette(&RasterSurface::solid(4, 4, [0, 0, 0, 255]), &settings).unwrap();
        let gif = decode_gif(&out.bytes);
        assert!(gif.frames.iter().all(|f| f.delay == 50));
    }

    #[test]
    fn gif_rejects_oversized_canvas() {
        let surface = RasterSurface::solid(70_000, 1, [0, 0, 0, 255]);
        let err = encode_palette(&surface, &PaletteSettings::default()).unwrap_err();
        assert!(matches!(err, ConversionError::Encode { .. }));
    }

    #[test]
    fn gif_quantize_failure_returns_no_output() {
        let settings = PaletteSettings {
            max_colors: 0,
            ..PaletteSettings::default()
        };
        let err = encode_palette(&gradient(4, 4), &settings).unwrap_err();
        assert!(matches!(err, ConversionError::Quantize(_)));
    }
}
