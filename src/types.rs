//! Types shared between the pipelines, the orchestrator and the CLI.

use serde::{Deserialize, Serialize};

pub const GIF_MEDIA_TYPE: &str = "image/gif";
pub const MP4_MEDIA_TYPE: &str = "video/mp4";

/// Output format preference. Closed set; the default is the palette image.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Looping palette-indexed image (GIF).
    #[default]
    Gif,
    /// Short MP4 clip.
    Video,
}

impl OutputFormat {
    /// File-name suffix (with leading dot) for artifacts of this format.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Gif => ".gif",
            Self::Video => ".mp4",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Gif => GIF_MEDIA_TYPE,
            Self::Video => MP4_MEDIA_TYPE,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gif => f.write_str("gif"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Terminal artifact of either pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedContainer {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    /// Suffix with leading dot, e.g. `.gif`.
    pub suffix: &'static str,
    /// Number of frames written to the container.
    pub frames: u32,
    /// Codec string the video was encoded with; `None` for palette images.
    pub codec: Option<String>,
}
