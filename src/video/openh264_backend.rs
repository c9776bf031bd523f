//! OpenH264 video backend. H.264 only, compiled from source.
//!
//! ## Capability mapping
//!
//! | Query | Answer |
//! |---|---|
//! | `avc1.*` probe | supported up to level 5.1 frame size (4096x2304) |
//! | `hev1.*` / `hvc1.*` probe | unsupported (no H.265 encoder compiled in) |
//! | Recorder containers | `video/mp4;codecs=avc1`, `video/mp4` |
//!
//! Frames arrive as RGBA and are converted to I420 (BT.601, studio range)
//! before encoding. Odd dimensions are padded by edge replication to the next
//! even size; the container still declares the true size.

use super::backend::{BackendError, EncodedFrame, EncoderSettings, FrameEncoder, VideoBackend};
use super::capture::RECORDER_CONTAINERS;
use super::codec::{CodecFamily, CodecId};
use crate::imaging::RasterSurface;
use openh264::OpenH264API;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType};
use openh264::formats::YUVSource;

/// Largest frame the encoder is asked to handle.
const MAX_WIDTH: u32 = 4096;
const MAX_HEIGHT: u32 = 2304;

/// Production backend built on the `openh264` crate.
pub struct OpenH264Backend;

impl OpenH264Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenH264Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoBackend for OpenH264Backend {
    fn name(&self) -> &str {
        "openh264"
    }

    fn probe(&self, codec: &CodecId, width: u32, height: u32) -> Result<bool, BackendError> {
        if codec.family != CodecFamily::Avc {
            return Ok(false);
        }
        Ok(width > 0 && height > 0 && width <= MAX_WIDTH && height <= MAX_HEIGHT)
    }

    fn supports_container(&self, container: &str) -> bool {
        RECORDER_CONTAINERS.contains(&container)
    }

    fn open_encoder(
        &self,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn FrameEncoder>, BackendError> {
        if settings.codec.family != CodecFamily::Avc {
            return Err(BackendError::Unsupported(format!(
                "{} cannot encode {}",
                self.name(),
                settings.codec
            )));
        }

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(settings.bitrate))
            .max_frame_rate(FrameRate::from_hz(settings.frame_rate as f32));
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| BackendError::Encoder(format!("Failed to create H.264 encoder: {e:?}")))?;

        Ok(Box::new(OpenH264Encoder {
            encoder,
            width: settings.width,
            height: settings.height,
            yuv: None,
        }))
    }
}

struct OpenH264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    /// Last converted frame, reused while the surface content is unchanged.
    yuv: Option<(Vec<u8>, I420Frame)>,
}

impl FrameEncoder for OpenH264Encoder {
    fn encode(
        &mut self,
        surface: &RasterSurface,
        force_keyframe: bool,
    ) -> Result<EncodedFrame, BackendError> {
        if surface.dimensions() != (self.width, self.height) {
            return Err(BackendError::Encoder(format!(
                "frame is {}x{}, encoder expects {}x{}",
                surface.width(),
                surface.height(),
                self.width,
                self.height
            )));
        }

        let cached = matches!(&self.yuv, Some((rgba, _)) if rgba.as_slice() == surface.pixels());
        if !cached {
            let frame = I420Frame::from_rgba(surface.pixels(), self.width, self.height);
            self.yuv = Some((surface.pixels().to_vec(), frame));
        }
        let Some((_, frame)) = &self.yuv else {
            return Err(BackendError::Encoder("no frame to encode".into()));
        };

        if force_keyframe {
            self.encoder.force_intra_frame();
        }
        let bitstream = self
            .encoder
            .encode(frame)
            .map_err(|e| BackendError::Encoder(format!("H.264 encode failed: {e:?}")))?;
        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            keyframe,
        })
    }
}

/// Planar I420 frame with even dimensions.
struct I420Frame {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    width: usize,
    height: usize,
}

impl I420Frame {
    /// Convert RGBA to I420 using BT.601 studio-range coefficients.
    ///
    /// The output is padded to even dimensions by repeating the last
    /// column/row; chroma is the average of each 2x2 block.
    fn from_rgba(rgba: &[u8], width: u32, height: u32) -> Self {
        let (src_w, src_h) = (width as usize, height as usize);
        let w = src_w + src_w % 2;
        let h = src_h + src_h % 2;

        let pixel = |x: usize, y: usize| -> [f32; 3] {
            let idx = (y.min(src_h - 1) * src_w + x.min(src_w - 1)) * 4;
            [rgba[idx] as f32, rgba[idx + 1] as f32, rgba[idx + 2] as f32]
        };

        let mut y_plane = vec![0u8; w * h];
        for row in 0..h {
            for col in 0..w {
                let [r, g, b] = pixel(col, row);
                let luma = 16.0 + 0.257 * r + 0.504 * g + 0.098 * b;
                y_plane[row * w + col] = luma.round().clamp(0.0, 255.0) as u8;
            }
        }

        let (cw, ch) = (w / 2, h / 2);
        let mut u_plane = vec![0u8; cw * ch];
        let mut v_plane = vec![0u8; cw * ch];
        for row in 0..ch {
            for col in 0..cw {
                let mut sum = [0.0f32; 3];
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let px = pixel(col * 2 + dx, row * 2 + dy);
                    for c in 0..3 {
                        sum[c] += px[c] / 4.0;
                    }
                }
                let [r, g, b] = sum;
                let cb = 128.0 - 0.148 * r - 0.291 * g + 0.439 * b;
                let cr = 128.0 + 0.439 * r - 0.368 * g - 0.071 * b;
                u_plane[row * cw + col] = cb.round().clamp(0.0, 255.0) as u8;
                v_plane[row * cw + col] = cr.round().clamp(0.0, 255.0) as u8;
            }
        }

        Self {
            y: y_plane,
            u: u_plane,
            v: v_plane,
            width: w,
            height: h,
        }
    }
}

impl YUVSource for I420Frame {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn strides(&self) -> (usize, usize, usize) {
        (self.width, self.width / 2, self.width / 2)
    }

    fn y(&self) -> &[u8] {
        &self.y
    }

    fn u(&self) -> &[u8] {
        &self.u
    }

    fn v(&self) -> &[u8] {
        &self.v
    }
}
