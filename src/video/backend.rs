//! Video backend trait and shared types.
//!
//! The [`VideoBackend`] trait is the seam to the encoding platform: it answers
//! capability probes, says which recorder container types it can produce, and
//! opens [`FrameEncoder`]s. Everything above it (negotiation, muxing, both
//! encoding strategies) is backend-agnostic.
//!
//! The production implementation is
//! [`OpenH264Backend`](super::openh264_backend::OpenH264Backend).

use super::codec::CodecId;
use crate::imaging::RasterSurface;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Encoder failed: {0}")]
    Encoder(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything an encoder needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// One encoded access unit as an Annex-B byte stream (start-code delimited).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub keyframe: bool,
}

/// Stateful encoder for one video track. Dropping it releases the encoder.
pub trait FrameEncoder: Send {
    /// Encode one frame. `force_keyframe` requests a self-contained frame.
    fn encode(
        &mut self,
        surface: &RasterSurface,
        force_keyframe: bool,
    ) -> Result<EncodedFrame, BackendError>;
}

/// Capability probe plus encoder factory.
pub trait VideoBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Can `codec` encode `width`x`height`? Errors are treated as "no".
    fn probe(&self, codec: &CodecId, width: u32, height: u32) -> Result<bool, BackendError>;

    /// Can a recorder be constructed for this container type,
    /// e.g. `video/mp4;codecs=avc1`?
    fn supports_container(&self, container: &str) -> bool;

    /// Open an encoder for one track.
    fn open_encoder(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameEncoder>, BackendError>;
}
