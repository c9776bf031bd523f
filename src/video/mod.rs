//! Video encoding: one still surface in, one short MP4 out.
//!
//! Two strategies share one contract ([`VideoPipeline::encode`]):
//!
//! | Strategy | Module | Timeline source | No codec probes as supported |
//! |---|---|---|---|
//! | [`VideoStrategy::DirectMux`] | [`direct`] | computed (`i / frame_rate`) | baseline H.264 (configurable) |
//! | [`VideoStrategy::CaptureRecord`] | [`capture`] | capture clock | `NoSupportedCodec` |
//!
//! Both negotiate a codec through [`codec`] against a [`VideoBackend`], write
//! through [`mux::TrackWriter`], and release every encoder and stream they
//! open before returning.

pub mod backend;
pub mod capture;
pub mod codec;
pub mod direct;
pub mod mux;
pub mod openh264_backend;

pub use backend::{BackendError, VideoBackend};
pub use codec::{CodecId, SupportCache, codec_candidates, is_video_supported};
pub use openh264_backend::OpenH264Backend;

use crate::error::ConversionError;
use crate::imaging::RasterSurface;
use crate::types::EncodedContainer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which strategy encodes the clip.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum VideoStrategy {
    /// Record a live capture stream for a wall-clock duration.
    #[serde(rename = "capture")]
    #[value(name = "capture")]
    CaptureRecord,
    /// Append frames straight into the muxer.
    #[default]
    #[serde(rename = "direct")]
    #[value(name = "direct")]
    DirectMux,
}

impl std::fmt::Display for VideoStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaptureRecord => f.write_str("capture"),
            Self::DirectMux => f.write_str("direct"),
        }
    }
}

/// Timing and rate parameters shared by both strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub frame_rate: u32,
    /// Target clip length.
    pub duration: Duration,
    /// Bits per second.
    pub bitrate: u32,
    /// Direct muxing assumes H.264 Baseline when no candidate probes as
    /// supported. Disable to fail with `NoSupportedCodec` instead.
    pub fallback_to_baseline: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            duration: Duration::from_millis(1000),
            bitrate: 2_500_000,
            fallback_to_baseline: true,
        }
    }
}

impl VideoSettings {
    /// `floor(frame_rate * duration)`.
    pub fn frame_count(&self) -> u32 {
        (self.frame_rate as f64 * self.duration.as_secs_f64()).floor() as u32
    }
}

/// A video strategy fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoPipeline {
    CaptureRecord(VideoSettings),
    DirectMux(VideoSettings),
}

impl VideoPipeline {
    pub fn new(strategy: VideoStrategy, settings: VideoSettings) -> Self {
        match strategy {
            VideoStrategy::CaptureRecord => Self::CaptureRecord(settings),
            VideoStrategy::DirectMux => Self::DirectMux(settings),
        }
    }

    pub fn strategy(&self) -> VideoStrategy {
        match self {
            Self::CaptureRecord(_) => VideoStrategy::CaptureRecord,
            Self::DirectMux(_) => VideoStrategy::DirectMux,
        }
    }

    pub fn settings(&self) -> &VideoSettings {
        match self {
            Self::CaptureRecord(s) | Self::DirectMux(s) => s,
        }
    }

    /// Encode `surface` into an MP4. The surface is already at its final size.
    pub async fn encode(
        &self,
        backend: Arc<dyn VideoBackend>,
        surface: Arc<RasterSurface>,
        cache: Option<Arc<SupportCache>>,
    ) -> Result<EncodedContainer, ConversionError> {
        match self {
            Self::CaptureRecord(settings) => {
                capture::encode_capture(backend.as_ref(), surface, settings, cache.as_deref()).await
            }
            Self::DirectMux(settings) => {
                let settings = settings.clone();
                tokio::task::spawn_blocking(move || {
                    direct::encode_direct(backend.as_ref(), &surface, &settings, cache.as_deref())
                })
                .await
                .map_err(|e| ConversionError::encode("Direct mux task failed", e))?
            }
        }
    }
}
