//! Failure taxonomy shared by every conversion stage.
//!
//! Each variant is terminal for the conversion call that raised it. Nothing
//! is retried and no partial artifact is ever returned alongside an error;
//! a caller that wants the other format tried must issue a second call.

use thiserror::Error;

/// Boxed underlying cause carried by [`ConversionError::Encode`].
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// Input bytes are not a decodable PNG/JPEG still image.
    #[error("Failed to decode image: {0}")]
    Decode(String),
    /// Color quantization could not produce a palette.
    #[error("Failed to quantize colors: {0}")]
    Quantize(String),
    /// The capture recorder could not be constructed with any candidate
    /// container, or negotiation was configured to fail instead of falling back.
    #[error("No supported codec: {0}")]
    NoSupportedCodec(String),
    /// Recording finished without producing a single byte.
    #[error(
        "Recorder produced no data. Canvas size: {width}x{height}. \
         This may be due to canvas size limitations or an unsupported codec."
    )]
    EmptyEncode { width: u32, height: u32 },
    /// Generic encode/finalize failure wrapping the underlying cause.
    #[error("{context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: BoxedCause,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Wrap any error as an [`Encode`](ConversionError::Encode) failure.
    pub fn encode(context: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Encode {
            context: context.into(),
            source: source.into(),
        }
    }
}
