//! Capture-and-record encoding.
//!
//! Models a live pipeline: a [`CaptureStream`] emits the rendered surface at a
//! fixed frame rate, a [`Recorder`] encodes whatever the stream delivers, and
//! a [`StopTimer`] ends the recording after a wall-clock duration. Frame
//! timestamps come from capture time, so the clip is as long as the recording
//! actually ran.
//!
//! ```text
//! CaptureStream ──frames──▶ Recorder ──▶ chunks ──▶ concatenated MP4
//!                             ▲
//! StopTimer ─────stop─────────┘
//! ```
//!
//! The stream's track is stopped on every exit path: the stream is a guard
//! that stops itself on drop. The stop timer is an explicit handle. Cancelling
//! it after the recorder stopped on its own is a no-op.
//!
//! Encoding runs on the blocking pool one frame at a time, so the scheduler
//! keeps servicing the stream ticker, the stop timer and other conversions
//! while a frame is in the encoder. Ticks that arrive meanwhile are skipped;
//! the held sample stretches to cover them.

use super::VideoSettings;
use super::backend::{EncodedFrame, EncoderSettings, FrameEncoder, VideoBackend};
use super::codec::{CodecFamily, CodecId, SupportCache, codec_candidates, negotiate};
use super::mux::{TrackWriter, seconds_to_ticks};
use crate::error::ConversionError;
use crate::imaging::RasterSurface;
use crate::types::{EncodedContainer, MP4_MEDIA_TYPE, OutputFormat};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Recorder container types, most specific first.
pub const RECORDER_CONTAINERS: &[&str] = &["video/mp4;codecs=avc1", "video/mp4"];

/// Frames buffered between the stream and the recorder.
const STREAM_BUFFER: usize = 2;

// ============================================================================
// Stop timer
// ============================================================================

/// One-shot deferred stop, cancellable through its handle.
///
/// Runs on tokio time, so tests with a paused clock control when it fires.
pub struct StopTimer {
    task: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

/// Receiving end of a [`StopTimer`].
pub struct StopSignal {
    rx: oneshot::Receiver<()>,
}

impl StopTimer {
    /// Arm a timer that fires once after `after`.
    pub fn arm(after: Duration) -> (Self, StopSignal) {
        let (tx, rx) = oneshot::channel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        });
        (Self { task, fired }, StopSignal { rx })
    }

    /// Cancel the pending stop. No effect once it has fired.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for StopTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl StopSignal {
    /// Resolves when the timer fires or its handle is cancelled or dropped.
    pub async fn wait(&mut self) {
        let _ = (&mut self.rx).await;
    }
}

// ============================================================================
// Capture stream
// ============================================================================

/// A frame delivered by the stream with its capture time.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub surface: Arc<RasterSurface>,
    pub captured_at: Instant,
}

/// Shared view of whether a stream's track is still live.
#[derive(Debug, Clone)]
pub struct TrackState(Arc<AtomicBool>);

impl TrackState {
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Continuous stream of one rendered surface at a fixed frame rate.
///
/// The surface is drawn once; every tick re-emits the same content.
pub struct CaptureStream {
    frames: mpsc::Receiver<CapturedFrame>,
    task: JoinHandle<()>,
    live: Arc<AtomicBool>,
    started_at: Instant,
}

impl CaptureStream {
    /// Start emitting `surface` at `frame_rate` frames per second.
    pub fn start(surface: Arc<RasterSurface>, frame_rate: u32) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let started_at = Instant::now();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let tick = ticker.tick().await;
                let frame = CapturedFrame {
                    surface: Arc::clone(&surface),
                    captured_at: tick,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Self {
            frames: rx,
            task,
            live: Arc::new(AtomicBool::new(true)),
            started_at,
        }
    }

    pub fn track(&self) -> TrackState {
        TrackState(Arc::clone(&self.live))
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Next captured frame, or `None` once the track is stopped.
    pub async fn next_frame(&mut self) -> Option<CapturedFrame> {
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        self.frames.recv().await
    }

    /// Stop the track. Idempotent.
    pub fn stop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.task.abort();
            self.frames.close();
            tracing::debug!("capture track stopped");
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Pick a recorder container and a codec it can carry.
///
/// `video/mp4;codecs=avc1` only accepts H.264 candidates; plain `video/mp4`
/// accepts any candidate.
pub fn negotiate_recorder(
    backend: &dyn VideoBackend,
    width: u32,
    height: u32,
    cache: Option<&SupportCache>,
) -> Result<(&'static str, CodecId), ConversionError> {
    for &container in RECORDER_CONTAINERS {
        if !backend.supports_container(container) {
            tracing::debug!(container, "recorder container unsupported");
            continue;
        }
        let candidates: Vec<CodecId> = codec_candidates()
            .into_iter()
            .filter(|c| !container.ends_with("codecs=avc1") || c.family == CodecFamily::Avc)
            .collect();
        if let Some(codec) = negotiate(backend, &candidates, width, height, cache) {
            return Ok((container, codec));
        }
    }
    Err(ConversionError::NoSupportedCodec(format!(
        "{} cannot record any of {} at {width}x{height}",
        backend.name(),
        RECORDER_CONTAINERS.join(", ")
    )))
}

/// Encodes captured frames into an MP4 as they arrive.
pub struct Recorder {
    /// Lent to the blocking pool while a frame is encoding.
    encoder: Option<Box<dyn FrameEncoder>>,
    writer: TrackWriter,
    codec: CodecId,
    origin: Instant,
    /// Encoded frame waiting for the next timestamp to learn its duration.
    held: Option<(EncodedFrame, u64)>,
    frame_ticks: u64,
    encoded: u32,
}

impl Recorder {
    /// Open an encoder and an MP4 track for `codec`.
    pub fn start(
        backend: &dyn VideoBackend,
        codec: &CodecId,
        width: u32,
        height: u32,
        settings: &VideoSettings,
        origin: Instant,
    ) -> Result<Self, ConversionError> {
        let encoder = backend
            .open_encoder(&EncoderSettings {
                codec: codec.clone(),
                width,
                height,
                frame_rate: settings.frame_rate,
                bitrate: settings.bitrate,
            })
            .map_err(|e| ConversionError::encode(format!("Failed to start {codec} recorder"), e))?;
        Ok(Self {
            encoder: Some(encoder),
            writer: TrackWriter::new(codec, width, height)?,
            codec: codec.clone(),
            origin,
            held: None,
            frame_ticks: seconds_to_ticks(1.0 / settings.frame_rate.max(1) as f64),
            encoded: 0,
        })
    }

    fn ticks_at(&self, at: Instant) -> u64 {
        seconds_to_ticks(at.saturating_duration_since(self.origin).as_secs_f64())
    }

    /// Encode one captured frame off the scheduler. The previous frame is
    /// written now that its duration is known.
    pub async fn push(&mut self, frame: &CapturedFrame) -> Result<(), ConversionError> {
        let ticks = self.ticks_at(frame.captured_at);
        let index = self.encoded;
        let mut encoder = self.encoder.take().ok_or_else(|| {
            ConversionError::encode(
                format!("Failed to record frame {index}"),
                "encoder lost by an earlier frame",
            )
        })?;
        let surface = Arc::clone(&frame.surface);
        let (encoder, result) = tokio::task::spawn_blocking(move || {
            let result = encoder.encode(&surface, index == 0);
            (encoder, result)
        })
        .await
        .map_err(|e| ConversionError::encode(format!("Failed to record frame {index}"), e))?;
        self.encoder = Some(encoder);
        let encoded = result
            .map_err(|e| ConversionError::encode(format!("Failed to record frame {index}"), e))?;
        self.encoded += 1;
        self.write_held(ticks)?;
        self.held = Some((encoded, ticks));
        Ok(())
    }

    fn write_held(&mut self, until: u64) -> Result<(), ConversionError> {
        if let Some((frame, start)) = self.held.take() {
            let duration = until.saturating_sub(start).max(1);
            let is_sync = frame.keyframe;
            self.writer.append(&frame, start, duration as u32, is_sync)?;
        }
        Ok(())
    }

    /// Stop at `at`, flush the last frame and return the recorded chunks
    /// with the number of frames they hold.
    ///
    /// A recording with no samples yields no chunks.
    pub fn stop(mut self, at: Instant) -> Result<(Vec<Vec<u8>>, u32), ConversionError> {
        let until = self
            .held
            .as_ref()
            .map(|(_, start)| (*start + self.frame_ticks).max(self.ticks_at(at)))
            .unwrap_or(0);
        self.write_held(until)?;
        let frames = self.writer.samples();
        if frames == 0 {
            return Ok((Vec::new(), 0));
        }
        let Self { encoder, writer, codec, .. } = self;
        drop(encoder);
        tracing::debug!(%codec, frames, "recorder stopped");
        Ok((vec![writer.finalize()?], frames))
    }
}

/// Record `stream` until `signal` fires or the stream ends on its own.
///
/// Consumes the stream; its track is stopped before this returns, whatever
/// the outcome.
pub async fn record(
    mut stream: CaptureStream,
    mut recorder: Recorder,
    mut signal: StopSignal,
) -> Result<(Vec<Vec<u8>>, u32), ConversionError> {
    let outcome = loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break Ok(()),
            frame = stream.next_frame() => match frame {
                Some(frame) => {
                    if let Err(e) = recorder.push(&frame).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };
    let stopped_at = Instant::now();
    stream.stop();
    outcome?;
    recorder.stop(stopped_at)
}

/// Render `surface` into a capture stream and record it for
/// `settings.duration`.
pub async fn encode_capture(
    backend: &dyn VideoBackend,
    surface: Arc<RasterSurface>,
    settings: &VideoSettings,
    cache: Option<&SupportCache>,
) -> Result<EncodedContainer, ConversionError> {
    let (width, height) = surface.dimensions();
    let (container, codec) = negotiate_recorder(backend, width, height, cache)?;
    tracing::debug!(container, %codec, width, height, "capture recording started");

    let stream = CaptureStream::start(surface, settings.frame_rate);
    let recorder = Recorder::start(backend, &codec, width, height, settings, stream.started_at())?;
    let (timer, signal) = StopTimer::arm(settings.duration);

    let recorded = record(stream, recorder, signal).await;
    timer.cancel();
    let (chunks, frames) = recorded?;

    let bytes = chunks.concat();
    if bytes.is_empty() {
        return Err(ConversionError::EmptyEncode { width, height });
    }
    Ok(EncodedContainer {
        bytes,
        media_type: MP4_MEDIA_TYPE,
        suffix: OutputFormat::Video.suffix(),
        frames,
        codec: Some(codec.name),
    })
}
