//! In-memory MP4 track writer.
//!
//! Wraps `mp4::Mp4Writer` over a `Cursor<Vec<u8>>`. Encoders hand us Annex-B
//! access units; MP4 samples are length-prefixed (AVCC) NAL units, so each
//! frame is re-framed on the way in.
//!
//! The video track is added lazily on the first sample: for H.264 the
//! `avcC` sample entry needs the SPS/PPS, which only exist once the encoder
//! has produced its first keyframe. Those parameter sets move into the
//! sample entry and are stripped from the samples. H.265 parameter sets stay
//! in-band (`mp4` only stores dimensions in `hvcC`).
//!
//! One sample is held back until the next arrives. A frame the encoder
//! skipped (no payload) lengthens the held sample, so the track duration
//! always matches the timeline the caller asked for.

use super::backend::EncodedFrame;
use super::codec::{CodecFamily, CodecId};
use crate::error::ConversionError;
use mp4::{
    AvcConfig, FourCC, HevcConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer, TrackConfig,
    TrackType,
};
use std::io::Cursor;

/// Track timescale (ticks per second). 90 kHz divides evenly by common frame rates.
pub const TRACK_TIMESCALE: u32 = 90_000;

/// Movie-header timescale.
const MOVIE_TIMESCALE: u32 = 1000;

const AVC_NAL_SPS: u8 = 7;
const AVC_NAL_PPS: u8 = 8;
const AVC_NAL_AUD: u8 = 9;

/// Convert a duration in seconds to track ticks.
pub fn seconds_to_ticks(seconds: f64) -> u64 {
    (seconds * TRACK_TIMESCALE as f64).round() as u64
}

/// Split an Annex-B byte stream into NAL units (start codes removed).
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                nals.push(trim_trailing_zeros(&data[s..i]));
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    match start {
        Some(s) => nals.push(&data[s..]),
        None if !data.is_empty() => nals.push(data),
        None => {}
    }
    nals.into_iter().filter(|n| !n.is_empty()).collect()
}

/// A NAL never ends in a zero byte, so trailing zeros belong to the next
/// 4-byte start code.
fn trim_trailing_zeros(nal: &[u8]) -> &[u8] {
    let end = nal.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &nal[..end]
}

fn avc_nal_type(nal: &[u8]) -> u8 {
    nal[0] & 0x1F
}

/// Length-prefix each NAL with a 4-byte big-endian size.
fn to_length_prefixed<'a>(nals: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// One video track written into an in-memory MP4.
///
/// Dropping an unfinished writer discards the buffer.
pub struct TrackWriter {
    writer: Mp4Writer<Cursor<Vec<u8>>>,
    codec: CodecId,
    width: u16,
    height: u16,
    track_id: Option<u32>,
    pending: Option<Mp4Sample>,
    samples: u32,
}

impl TrackWriter {
    /// Start a new MP4 in memory. Fails if the dimensions do not fit the
    /// sample entry (`u16`) or the header cannot be written.
    pub fn new(codec: &CodecId, width: u32, height: u32) -> Result<Self, ConversionError> {
        let dims_err = || {
            ConversionError::encode(
                format!("Failed to start MP4 track. Canvas size: {width}x{height}"),
                "dimensions exceed 65535",
            )
        };
        let width = u16::try_from(width).map_err(|_| dims_err())?;
        let height = u16::try_from(height).map_err(|_| dims_err())?;

        let brand = |s: &str| -> Result<FourCC, ConversionError> {
            s.parse()
                .map_err(|e: mp4::Error| ConversionError::encode("Invalid MP4 brand", e))
        };
        // The mp4 crate only writes `hev1` sample entries, so an `hvc1`
        // codec string is muxed as `hev1`.
        let family_brand = match codec.family {
            CodecFamily::Avc => "avc1",
            CodecFamily::Hevc => "hev1",
        };
        let config = Mp4Config {
            major_brand: brand("isom")?,
            minor_version: 512,
            compatible_brands: vec![
                brand("isom")?,
                brand("iso2")?,
                brand(family_brand)?,
                brand("mp41")?,
            ],
            timescale: MOVIE_TIMESCALE,
        };

        let writer = Mp4Writer::write_start(Cursor::new(Vec::new()), &config)
            .map_err(|e| ConversionError::encode("Failed to write MP4 header", e))?;

        Ok(Self {
            writer,
            codec: codec.clone(),
            width,
            height,
            track_id: None,
            pending: None,
            samples: 0,
        })
    }

    /// Number of samples written so far.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Append one encoded frame at `start` ticks lasting `duration` ticks.
    ///
    /// Frames with no payload return `Ok(false)`; their duration is added to
    /// the previous sample.
    pub fn append(
        &mut self,
        frame: &EncodedFrame,
        start: u64,
        duration: u32,
        is_sync: bool,
    ) -> Result<bool, ConversionError> {
        let nals = split_annex_b(&frame.data);
        if nals.is_empty() {
            self.extend_pending(duration);
            return Ok(false);
        }

        let track_id = match self.track_id {
            Some(id) => id,
            None => self.add_track(&nals)?,
        };

        let payload = match self.codec.family {
            CodecFamily::Avc => to_length_prefixed(
                nals.iter()
                    .copied()
                    .filter(|n| !matches!(avc_nal_type(n), AVC_NAL_SPS | AVC_NAL_PPS | AVC_NAL_AUD)),
            ),
            CodecFamily::Hevc => to_length_prefixed(nals.iter().copied()),
        };
        if payload.is_empty() {
            self.extend_pending(duration);
            return Ok(false);
        }

        self.flush_pending(track_id)?;
        self.pending = Some(Mp4Sample {
            start_time: start,
            duration,
            rendering_offset: 0,
            is_sync,
            bytes: bytes::Bytes::from(payload),
        });
        self.samples += 1;
        Ok(true)
    }

    fn extend_pending(&mut self, duration: u32) {
        if let Some(sample) = self.pending.as_mut() {
            sample.duration += duration;
        }
    }

    fn flush_pending(&mut self, track_id: u32) -> Result<(), ConversionError> {
        let Some(sample) = self.pending.take() else {
            return Ok(());
        };
        self.writer.write_sample(track_id, &sample).map_err(|e| {
            ConversionError::encode(format!("Failed to write sample at {}", sample.start_time), e)
        })
    }

    fn add_track(&mut self, nals: &[&[u8]]) -> Result<u32, ConversionError> {
        let media_conf = match self.codec.family {
            CodecFamily::Avc => {
                let find = |kind: u8| {
                    nals.iter()
                        .find(|n| avc_nal_type(n) == kind)
                        .map(|n| n.to_vec())
                };
                let (Some(sps), Some(pps)) = (find(AVC_NAL_SPS), find(AVC_NAL_PPS)) else {
                    return Err(ConversionError::encode(
                        "Failed to add H.264 track",
                        "first frame carries no SPS/PPS",
                    ));
                };
                if sps.len() < 4 {
                    return Err(ConversionError::encode(
                        "Failed to add H.264 track",
                        "SPS too short",
                    ));
                }
                MediaConfig::AvcConfig(AvcConfig {
                    width: self.width,
                    height: self.height,
                    seq_param_set: sps,
                    pic_param_set: pps,
                })
            }
            CodecFamily::Hevc => MediaConfig::HevcConfig(HevcConfig {
                width: self.width,
                height: self.height,
            }),
        };

        let track = TrackConfig {
            track_type: TrackType::Video,
            timescale: TRACK_TIMESCALE,
            language: "und".to_string(),
            media_conf,
        };
        self.writer
            .add_track(&track)
            .map_err(|e| ConversionError::encode("Failed to add video track", e))?;
        self.track_id = Some(1);
        Ok(1)
    }

    /// Write the `moov` box and hand back the finished file.
    pub fn finalize(mut self) -> Result<Vec<u8>, ConversionError> {
        let Some(track_id) = self.track_id.filter(|_| self.samples > 0) else {
            return Err(ConversionError::encode(
                "Failed to finalize MP4",
                "no samples were written",
            ));
        };
        self.flush_pending(track_id)?;
        self.writer
            .write_end()
            .map_err(|e| ConversionError::encode("Failed to finalize MP4", e))?;
        Ok(self.writer.into_writer().into_inner())
    }
}
