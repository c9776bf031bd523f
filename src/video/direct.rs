//! Direct frame-buffer muxing.
//!
//! Opens one encoder and one in-memory MP4 track, then feeds the same rendered
//! surface in as every frame of a fixed timeline:
//!
//! ```text
//! frames    = floor(frame_rate * duration)
//! start(i)  = i / frame_rate        (in 90 kHz ticks)
//! length(i) = start(i + 1) - start(i)
//! ```
//!
//! Only frame 0 is a forced keyframe and only frame 0 is marked sync.
//! Runs synchronously; callers on an async runtime wrap it in
//! `spawn_blocking`.

use super::VideoSettings;
use super::backend::{EncoderSettings, VideoBackend};
use super::codec::{SupportCache, codec_candidates, negotiate_with_fallback};
use super::mux::{TrackWriter, seconds_to_ticks};
use crate::error::ConversionError;
use crate::imaging::RasterSurface;
use crate::types::{EncodedContainer, MP4_MEDIA_TYPE, OutputFormat};

/// Start of frame `index` in track ticks.
fn frame_start(index: u32, frame_rate: u32) -> u64 {
    seconds_to_ticks(index as f64 / frame_rate as f64)
}

/// Encode `surface` as a fixed-length clip by appending it frame by frame.
pub fn encode_direct(
    backend: &dyn VideoBackend,
    surface: &RasterSurface,
    settings: &VideoSettings,
    cache: Option<&SupportCache>,
) -> Result<EncodedContainer, ConversionError> {
    let (width, height) = surface.dimensions();
    let negotiated = negotiate_with_fallback(
        backend,
        &codec_candidates(),
        width,
        height,
        cache,
        settings.fallback_to_baseline,
    )
    .ok_or_else(|| {
        ConversionError::NoSupportedCodec(format!(
            "{} supports no candidate codec at {width}x{height}",
            backend.name()
        ))
    })?;
    let codec = negotiated.codec;

    let mut encoder = backend
        .open_encoder(&EncoderSettings {
            codec: codec.clone(),
            width,
            height,
            frame_rate: settings.frame_rate,
            bitrate: settings.bitrate,
        })
        .map_err(|e| ConversionError::encode(format!("Failed to open {codec} encoder"), e))?;
    let mut writer = TrackWriter::new(&codec, width, height)?;

    let total = settings.frame_count();
    tracing::debug!(%codec, width, height, frames = total, "direct mux started");
    for index in 0..total {
        let start = frame_start(index, settings.frame_rate);
        let length = frame_start(index + 1, settings.frame_rate) - start;
        let keyframe = index == 0;

        let frame = encoder
            .encode(surface, keyframe)
            .map_err(|e| ConversionError::encode(format!("Failed to encode frame {index}"), e))?;
        writer.append(&frame, start, length as u32, keyframe)?;
    }
    drop(encoder);

    let frames = writer.samples();
    let bytes = writer.finalize()?;
    Ok(EncodedContainer {
        bytes,
        media_type: MP4_MEDIA_TYPE,
        suffix: OutputFormat::Video.suffix(),
        frames,
        codec: Some(codec.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::backend::tests::MockVideoBackend;
    use std::io::Cursor;

    fn surface() -> RasterSurface {
        RasterSurface::solid(320, 240, [40, 90, 200, 255])
    }

    fn track_of(bytes: &[u8]) -> (u16, u16, u32, f64) {
        let reader = mp4::Mp4Reader::read_header(Cursor::new(bytes), bytes.len() as u64).unwrap();
        let track = reader.tracks().values().next().unwrap();
        (
            track.width(),
            track.height(),
            track.sample_count(),
            track.duration().as_secs_f64(),
        )
    }

    #[test]
    fn frame_timeline_at_30fps() {
        assert_eq!(frame_start(0, 30), 0);
        assert_eq!(frame_start(1, 30), 3000);
        assert_eq!(frame_start(30, 30), 90_000);
    }

    #[test]
    fn writes_one_second_clip() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]);
        let out = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap();

        assert_eq!(out.media_type, "video/mp4");
        assert_eq!(out.suffix, ".mp4");
        assert_eq!(out.frames, 30);
        assert_eq!(out.codec.as_deref(), Some("avc1.42001E"));

        let (w, h, samples, secs) = track_of(&out.bytes);
        assert_eq!((w, h), (320, 240));
        assert_eq!(samples, 30);
        assert!((0.5..=1.5).contains(&secs), "duration {secs}");
    }

    #[test]
    fn frame_count_is_floored() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]);
        let settings = VideoSettings {
            frame_rate: 24,
            duration: std::time::Duration::from_millis(1020),
            ..VideoSettings::default()
        };
        let out = encode_direct(&backend, &surface(), &settings, None).unwrap();
        // 24 * 1.02 = 24.48
        assert_eq!(out.frames, 24);
        assert_eq!(backend.encoded_frames(), 24);
    }

    #[test]
    fn uses_negotiated_codec() {
        let backend = MockVideoBackend::supporting(&["hev1.1.6.L93.B0"]);
        let out = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap();
        assert_eq!(out.codec.as_deref(), Some("hev1.1.6.L93.B0"));
        assert_eq!(backend.opened()[0].codec.name, "hev1.1.6.L93.B0");
    }

    #[test]
    fn falls_back_to_baseline_when_nothing_probes() {
        let backend = MockVideoBackend::supporting(&[]);
        let out = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap();
        assert_eq!(out.codec.as_deref(), Some("avc1.42001E"));
    }

    #[test]
    fn fallback_disabled_reports_no_codec() {
        let backend = MockVideoBackend::supporting(&[]);
        let settings = VideoSettings {
            fallback_to_baseline: false,
            ..VideoSettings::default()
        };
        let err = encode_direct(&backend, &surface(), &settings, None).unwrap_err();
        assert!(matches!(err, ConversionError::NoSupportedCodec(_)));
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn passes_encoder_settings_through() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]);
        encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap();
        let opened = &backend.opened()[0];
        assert_eq!((opened.width, opened.height), (320, 240));
        assert_eq!(opened.frame_rate, 30);
        assert_eq!(opened.bitrate, 2_500_000);
    }

    // =========================================================================
    // Failure paths release the encoder
    // =========================================================================

    #[test]
    fn encode_failure_is_wrapped_and_releases_encoder() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]).failing_encode_at(7);
        let err = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap_err();
        match &err {
            ConversionError::Encode { context, .. } => assert!(context.contains("frame 7")),
            other => panic!("expected Encode, got {other:?}"),
        }
        assert_eq!(backend.live_encoders(), 0);
    }

    #[test]
    fn open_failure_is_wrapped() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]).failing_open();
        let err = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap_err();
        assert!(matches!(err, ConversionError::Encode { .. }));
    }

    #[test]
    fn empty_encoder_output_fails_at_finalize() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]).producing_empty_frames();
        let err = encode_direct(&backend, &surface(), &VideoSettings::default(), None).unwrap_err();
        assert!(matches!(err, ConversionError::Encode { .. }));
        assert_eq!(backend.live_encoders(), 0);
    }

    #[test]
    fn cache_is_consulted() {
        let backend = MockVideoBackend::supporting(&["avc1.42001E"]);
        let cache = SupportCache::new();
        encode_direct(&backend, &surface(), &VideoSettings::default(), Some(&cache)).unwrap();
        encode_direct(&backend, &surface(), &VideoSettings::default(), Some(&cache)).unwrap();
        assert_eq!(backend.probed().len(), 1);
    }
}
