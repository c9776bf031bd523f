//! Conversion orchestration.
//!
//! Drives one input through every stage:
//!
//! ```text
//! bytes ──decode──▶ surface ──scale──▶ target size ──render once──▶ surface
//!                                                                     │
//!                         ┌─────────── palette ◀── format ──▶ video ──┘
//!                         ▼                                  ▼
//!                     .gif bytes                         .mp4 bytes ──▶ ConvertedFile
//! ```
//!
//! The format picks the constraint profile: the palette profile is a fixed
//! square envelope, the video profile caps width and picks a height cap from
//! the source orientation. The scaled surface is rendered exactly once and
//! every encoded frame reuses it.
//!
//! CPU-bound stages (decode, render, palette encode) run on tokio's blocking
//! pool; the video pipeline schedules its own work. Each call owns everything
//! it creates, so calls can run concurrently on one [`Converter`].

use crate::config::Config;
use crate::error::ConversionError;
use crate::imaging::{ScaleResult, decode, encode_palette, scale_dimensions};
use crate::naming::output_name;
use crate::types::{EncodedContainer, OutputFormat};
use crate::video::{OpenH264Backend, SupportCache, VideoBackend, VideoStrategy};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub source_name: String,
    pub output_name: String,
    pub format: OutputFormat,
    pub media_type: &'static str,
    pub source_width: u32,
    pub source_height: u32,
    pub width: u32,
    pub height: u32,
    /// Factor applied by the max-envelope pass.
    pub scale: f64,
    pub was_scaled: bool,
    pub frames: u32,
    /// Negotiated codec for video output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<VideoStrategy>,
    pub bytes: usize,
}

/// A finished artifact: bytes, file name and media type.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub bytes: Vec<u8>,
    pub name: String,
    pub media_type: &'static str,
    pub report: ConversionReport,
}

/// Converts still images with one configuration and one video backend.
///
/// Cheap to clone; clones share the backend and the codec support cache.
#[derive(Clone)]
pub struct Converter {
    config: Config,
    backend: Arc<dyn VideoBackend>,
    cache: Arc<SupportCache>,
}

impl Converter {
    pub fn new(config: Config, backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            config,
            backend,
            cache: Arc::new(SupportCache::new()),
        }
    }

    /// Converter backed by OpenH264.
    pub fn with_openh264(config: Config) -> Self {
        Self::new(config, Arc::new(OpenH264Backend::new()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn VideoBackend {
        self.backend.as_ref()
    }

    /// Codec probe answers remembered across calls.
    pub fn support_cache(&self) -> &SupportCache {
        &self.cache
    }

    /// Convert `bytes` (a PNG or JPEG named `name`) into `format`.
    pub async fn convert(
        &self,
        bytes: Vec<u8>,
        name: &str,
        format: OutputFormat,
    ) -> Result<ConvertedFile, ConversionError> {
        let source = blocking(move || decode(&bytes)).await?;
        let (source_width, source_height) = source.dimensions();

        let constraints = match format {
            OutputFormat::Gif => self.config.palette.constraints(),
            OutputFormat::Video => self.config.video.constraints_for(source_width, source_height),
        };
        let scaled = scale_dimensions(source_width, source_height, &constraints);
        warn_if_clamped(name, source_width, source_height, &scaled);
        debug!(
            input = name,
            from = %format_args!("{source_width}x{source_height}"),
            to = %format_args!("{}x{}", scaled.width, scaled.height),
            scale = scaled.scale,
            "scaled"
        );

        let (width, height) = (scaled.width, scaled.height);
        let surface = Arc::new(blocking(move || Ok(source.render(width, height))).await?);

        let (container, strategy) = match format {
            OutputFormat::Gif => {
                let settings = self.config.palette.settings();
                let surface = Arc::clone(&surface);
                (blocking(move || encode_palette(&surface, &settings)).await?, None)
            }
            OutputFormat::Video => {
                let pipeline = self.config.video.pipeline();
                let container = pipeline
                    .encode(
                        Arc::clone(&self.backend),
                        Arc::clone(&surface),
                        Some(Arc::clone(&self.cache)),
                    )
                    .await?;
                (container, Some(pipeline.strategy()))
            }
        };
        drop(surface);

        let EncodedContainer {
            bytes,
            media_type,
            frames,
            codec,
            ..
        } = container;
        let out_name = output_name(name, format);
        let report = ConversionReport {
            source_name: name.to_string(),
            output_name: out_name.clone(),
            format,
            media_type,
            source_width,
            source_height,
            width,
            height,
            scale: scaled.scale,
            was_scaled: scaled.was_scaled,
            frames,
            codec,
            strategy,
            bytes: bytes.len(),
        };
        info!(
            source = name,
            output = %out_name,
            width,
            height,
            frames,
            bytes = bytes.len(),
            "converted"
        );

        Ok(ConvertedFile {
            bytes,
            name: out_name,
            media_type,
            report,
        })
    }

    /// Read `path`, convert it and write the artifact into `out_dir`.
    ///
    /// Returns the path written and the conversion result.
    pub async fn convert_file(
        &self,
        path: &Path,
        out_dir: &Path,
        format: OutputFormat,
    ) -> Result<(PathBuf, ConvertedFile), ConversionError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = tokio::fs::read(path).await?;
        let converted = self.convert(bytes, &name, format).await?;

        tokio::fs::create_dir_all(out_dir).await?;
        let out_path = out_dir.join(&converted.name);
        tokio::fs::write(&out_path, &converted.bytes).await?;
        debug!(path = %out_path.display(), "written");
        Ok((out_path, converted))
    }
}

/// Run a CPU-bound stage on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConversionError::encode("Worker task failed", e))?
}

/// Fitted size before the minimum clamp, and whether the clamp skewed it.
///
/// Raising both axes in proportion (1x1 to 4x4) keeps the ratio and is not
/// a skew.
fn clamp_skew(width: u32, height: u32, scaled: &ScaleResult) -> Option<(u32, u32)> {
    let fitted_w = (width as f64 * scaled.scale).round() as u32;
    let fitted_h = (height as f64 * scaled.scale).round() as u32;
    let same_ratio =
        fitted_w as u64 * scaled.height as u64 == fitted_h as u64 * scaled.width as u64;
    if (fitted_w, fitted_h) == (scaled.width, scaled.height) || same_ratio {
        None
    } else {
        Some((fitted_w, fitted_h))
    }
}

/// The minimum clamp raises axes independently, which can skew the image.
fn warn_if_clamped(name: &str, width: u32, height: u32, scaled: &ScaleResult) {
    if let Some((fitted_w, fitted_h)) = clamp_skew(width, height, scaled) {
        warn!(
            input = name,
            fitted = %format_args!("{fitted_w}x{fitted_h}"),
            clamped = %format_args!("{}x{}", scaled.width, scaled.height),
            "minimum size clamp changed the aspect ratio"
        );
    }
}
