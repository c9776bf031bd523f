//! Converter configuration module.
//!
//! Handles loading, validating, and merging `stillloop.toml`. Stock defaults
//! are the base layer; a user file overrides any subset of keys.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! default_format = "gif"        # "gif" | "video"
//!
//! [palette]
//! max_width = 2048              # Palette profile envelope
//! max_height = 2048
//! min_width = 4
//! min_height = 4
//! max_colors = 256              # 2-256
//! sample_factor = 10            # NeuQuant sampling, 1 (best) to 30 (fastest)
//! frame_delay = 10              # Hundredths of a second per frame
//!
//! [video]
//! strategy = "direct"           # "direct" | "capture"
//! max_width = 1920
//! max_height_landscape = 1200   # Used when width > height
//! max_height_portrait = 1900    # Used otherwise
//! min_width = 4
//! min_height = 4
//! frame_rate = 30               # 1-60
//! duration_ms = 1000            # 500-1500
//! bitrate = 2500000             # Bits per second
//! fallback_to_baseline = true   # Direct strategy: assume H.264 Baseline if no probe succeeds
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! ```toml
//! # Only switch the default output to video
//! default_format = "video"
//! ```
//!
//! Unknown keys are rejected to catch typos early. Minimums are not checked
//! against maximums; a minimum above its maximum wins on that axis.

use crate::imaging::{Orientation, PaletteSettings, ScaleConstraints};
use crate::types::OutputFormat;
use crate::video::{VideoPipeline, VideoSettings, VideoStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "stillloop.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `stillloop.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output format used when the caller does not choose one.
    pub default_format: OutputFormat,
    /// Palette (GIF) profile and quantizer settings.
    pub palette: PaletteConfig,
    /// Video profile, strategy and encoder settings.
    pub video: VideoConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.palette;
        if p.max_width == 0 || p.max_height == 0 {
            return Err(ConfigError::Validation(
                "palette.max_width and palette.max_height must be non-zero".into(),
            ));
        }
        if !(2..=256).contains(&p.max_colors) {
            return Err(ConfigError::Validation(
                "palette.max_colors must be 2-256".into(),
            ));
        }
        if !(1..=30).contains(&p.sample_factor) {
            return Err(ConfigError::Validation(
                "palette.sample_factor must be 1-30".into(),
            ));
        }

        let v = &self.video;
        if v.max_width == 0 || v.max_height_landscape == 0 || v.max_height_portrait == 0 {
            return Err(ConfigError::Validation(
                "video max dimensions must be non-zero".into(),
            ));
        }
        if !(1..=60).contains(&v.frame_rate) {
            return Err(ConfigError::Validation(
                "video.frame_rate must be 1-60".into(),
            ));
        }
        if !(500..=1500).contains(&v.duration_ms) {
            return Err(ConfigError::Validation(
                "video.duration_ms must be 500-1500".into(),
            ));
        }
        if v.bitrate == 0 {
            return Err(ConfigError::Validation(
                "video.bitrate must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Palette profile: square envelope plus quantizer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaletteConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_colors: usize,
    pub sample_factor: i32,
    /// Hundredths of a second per frame.
    pub frame_delay: u16,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let settings = PaletteSettings::default();
        Self {
            max_width: 2048,
            max_height: 2048,
            min_width: 4,
            min_height: 4,
            max_colors: settings.max_colors,
            sample_factor: settings.sample_factor,
            frame_delay: settings.frame_delay,
        }
    }
}

impl PaletteConfig {
    pub fn constraints(&self) -> ScaleConstraints {
        ScaleConstraints::new(self.max_width, self.max_height)
            .with_min(self.min_width, self.min_height)
    }

    pub fn settings(&self) -> PaletteSettings {
        PaletteSettings {
            max_colors: self.max_colors,
            sample_factor: self.sample_factor,
            frame_delay: self.frame_delay,
        }
    }
}

/// Video profile: width cap, orientation-dependent height cap, encoder timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    pub strategy: VideoStrategy,
    pub max_width: u32,
    pub max_height_landscape: u32,
    pub max_height_portrait: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub frame_rate: u32,
    pub duration_ms: u64,
    pub bitrate: u32,
    pub fallback_to_baseline: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let settings = VideoSettings::default();
        Self {
            strategy: VideoStrategy::default(),
            max_width: 1920,
            max_height_landscape: 1200,
            max_height_portrait: 1900,
            min_width: 4,
            min_height: 4,
            frame_rate: settings.frame_rate,
            duration_ms: settings.duration.as_millis() as u64,
            bitrate: settings.bitrate,
            fallback_to_baseline: settings.fallback_to_baseline,
        }
    }
}

impl VideoConfig {
    /// Constraints for a source of `width`x`height`; the height cap follows
    /// the source orientation.
    pub fn constraints_for(&self, width: u32, height: u32) -> ScaleConstraints {
        let max_height = match Orientation::of(width, height) {
            Orientation::Landscape => self.max_height_landscape,
            Orientation::Portrait => self.max_height_portrait,
        };
        ScaleConstraints::new(self.max_width, max_height).with_min(self.min_width, self.min_height)
    }

    pub fn settings(&self) -> VideoSettings {
        VideoSettings {
            frame_rate: self.frame_rate,
            duration: Duration::from_millis(self.duration_ms),
            bitrate: self.bitrate,
            fallback_to_baseline: self.fallback_to_baseline,
        }
    }

    pub fn pipeline(&self) -> VideoPipeline {
        VideoPipeline::new(self.strategy, self.settings())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults if it is missing.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    if overlay.is_some() {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `stillloop.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# stillloop Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Output used when `convert` is run without --format: "gif" or "video".
default_format = "gif"

# ---------------------------------------------------------------------------
# Palette (GIF) output
# ---------------------------------------------------------------------------
[palette]
# Images larger than this envelope are scaled down, keeping aspect ratio.
max_width = 2048
max_height = 2048

# Axes smaller than this are raised to it independently.
min_width = 4
min_height = 4

# Palette size, 2-256.
max_colors = 256

# NeuQuant sampling factor: 1 = best quality, 30 = fastest.
sample_factor = 10

# Delay per frame in hundredths of a second.
frame_delay = 10

# ---------------------------------------------------------------------------
# Video (MP4) output
# ---------------------------------------------------------------------------
[video]
# "direct" appends frames straight into the muxer.
# "capture" records a live capture stream for `duration_ms`.
strategy = "direct"

# Width cap for every source.
max_width = 1920

# Height cap when the source is wider than tall.
max_height_landscape = 1200

# Height cap otherwise (portrait or square).
max_height_portrait = 1900

min_width = 4
min_height = 4

# Frames per second, 1-60.
frame_rate = 30

# Clip length in milliseconds, 500-1500.
duration_ms = 1000

# Target bitrate in bits per second.
bitrate = 2500000

# With the direct strategy, assume H.264 Baseline when no codec probes as
# supported. Set to false to fail instead.
fallback_to_baseline = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit for auto (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_profiles() {
        let config = Config::default();
        assert_eq!(config.default_format, OutputFormat::Gif);
        assert_eq!((config.palette.max_width, config.palette.max_height), (2048, 2048));
        assert_eq!((config.palette.min_width, config.palette.min_height), (4, 4));
        assert_eq!(config.video.max_width, 1920);
        assert_eq!(config.video.max_height_landscape, 1200);
        assert_eq!(config.video.max_height_portrait, 1900);
        assert_eq!(config.video.strategy, VideoStrategy::DirectMux);
    }

    #[test]
    fn default_video_timing() {
        let settings = Config::default().video.settings();
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.duration, Duration::from_secs(1));
        assert_eq!(settings.bitrate, 2_500_000);
        assert!(settings.fallback_to_baseline);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
default_format = "video"

[video]
strategy = "capture"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Video);
        assert_eq!(config.video.strategy, VideoStrategy::CaptureRecord);
        // Unspecified defaults preserved
        assert_eq!(config.video.frame_rate, 30);
        assert_eq!(config.palette.max_colors, 256);
    }

    // =========================================================================
    // Constraint profiles
    // =========================================================================

    #[test]
    fn palette_profile_is_square() {
        let c = Config::default().palette.constraints();
        assert_eq!((c.max_width, c.max_height), (2048, 2048));
        assert_eq!((c.min_width, c.min_height), (Some(4), Some(4)));
    }

    #[test]
    fn video_profile_follows_orientation() {
        let video = VideoConfig::default();
        assert_eq!(video.constraints_for(3000, 2000).max_height, 1200);
        assert_eq!(video.constraints_for(2000, 3000).max_height, 1900);
        assert_eq!(video.constraints_for(2000, 2000).max_height, 1900);
        assert_eq!(video.constraints_for(3000, 2000).max_width, 1920);
    }

    #[test]
    fn video_pipeline_uses_configured_strategy() {
        let video = VideoConfig {
            strategy: VideoStrategy::CaptureRecord,
            ..VideoConfig::default()
        };
        assert_eq!(video.pipeline().strategy(), VideoStrategy::CaptureRecord);
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn default_processing_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_processes, None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig { max_processes: None };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_never_zero() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[video]
frame_rate = 30
bitrate = 2500000
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[video]
frame_rate = 24
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["video"]["frame_rate"].as_integer(), Some(24));
        assert_eq!(merged["video"]["bitrate"].as_integer(), Some(2_500_000));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<Config, _> = toml::from_str("frame_rate = 30");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let result: Result<Config, _> = toml::from_str("[video]\nfps = 30");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        let result: Result<Config, _> = toml::from_str("[video]\nstrategy = \"webcodecs\"");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validate_duration_bounds() {
        let mut config = Config::default();
        config.video.duration_ms = 500;
        config.validate().unwrap();
        config.video.duration_ms = 499;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.video.duration_ms = 1501;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_frame_rate_bounds() {
        let mut config = Config::default();
        config.video.frame_rate = 0;
        assert!(config.validate().is_err());
        config.video.frame_rate = 61;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_palette_colors() {
        let mut config = Config::default();
        config.palette.max_colors = 1;
        assert!(config.validate().is_err());
        config.palette.max_colors = 257;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_max_dimension() {
        let mut config = Config::default();
        config.video.max_height_portrait = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_above_max_is_accepted() {
        let mut config = Config::default();
        config.palette.min_width = 4096;
        config.validate().unwrap();
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[video]\nframe_rate = 24\nduration_ms = 1200\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.video.frame_rate, 24);
        assert_eq!(config.video.duration_ms, 1200);
        assert_eq!(config.video.bitrate, 2_500_000);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[video]\nduration_ms = 100\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: Config = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value().unwrap();
        let table = value.as_table().unwrap();
        for key in ["default_format", "palette", "video", "processing"] {
            assert!(table.contains_key(key), "missing {key}");
        }
    }
}
