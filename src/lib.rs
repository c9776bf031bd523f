//! # stillloop
//!
//! Converts a still PNG or JPEG into the smallest looping artifact an
//! upload-constrained platform will animate: a two-frame GIF or a one-second
//! MP4.
//!
//! # Architecture: One-Way Pipeline
//!
//! ```text
//! bytes → decode → scale → render once → palette pipeline → .gif
//!                                      ↘ video pipeline   → .mp4
//! ```
//!
//! Every stage takes the previous stage's output and nothing else. The
//! [`convert::Converter`] depends on all of them; none depend on it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, dimension scaling, one-shot render, palette quantization, GIF writer |
//! | [`video`] | Codec negotiation, backend trait, OpenH264 backend, MP4 muxing, both video strategies |
//! | [`convert`] | Orchestrator: profile selection, stage scheduling, output naming, reports |
//! | [`config`] | `stillloop.toml` loading, validation and merging |
//! | [`naming`] | Input recognition and output file names |
//! | [`types`] | Output format enum and the encoded container type |
//! | [`error`] | [`error::ConversionError`] taxonomy |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two Identical Frames
//!
//! A single-frame GIF is shown as a static image, so the palette pipeline
//! always writes two frames with the same indices, a loop-forever directive
//! and restore-to-background disposal.
//!
//! ## Video Strategies Are a Tagged Variant
//!
//! [`video::VideoPipeline`] is an enum chosen at construction:
//! `DirectMux` appends a computed timeline straight into the muxer, while
//! `CaptureRecord` records a live capture stream against a cancellable stop
//! timer. They differ on what happens when nothing probes as supported:
//! direct muxing assumes H.264 Baseline (configurable, logged at WARN),
//! capture fails with `NoSupportedCodec`.
//!
//! ## Pluggable Encoding Backend
//!
//! Capability probes and encoders sit behind [`video::VideoBackend`]. The
//! shipped backend is OpenH264, compiled from source, muxed into MP4 by the
//! pure-Rust `mp4` crate. No FFmpeg, no system libraries.
//!
//! ## Explicit Support Cache
//!
//! Probe answers are memoized in a [`video::SupportCache`] owned by the
//! converter, with an explicit `invalidate()`. There is no global state; two
//! converters never share answers.

pub mod config;
pub mod convert;
pub mod error;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod types;
pub mod video;
