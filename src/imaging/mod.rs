//! Still-image side of the pipeline, in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (PNG, JPEG), format sniffed from magic bytes |
//! | **Scale** | pure dimension math, see [`scale_dimensions`] |
//! | **Render** | Lanczos3 resize, once per conversion |
//! | **Quantize** | exact palette or NeuQuant (`color_quant`) |
//! | **GIF** | `gif` encoder, two identical frames, loop forever |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Surface**: [`RasterSurface`] plus [`decode`]
//! - **Palette**: quantization and the two-frame GIF writer

mod calculations;
pub mod palette;
pub mod surface;

pub use calculations::{Orientation, ScaleConstraints, ScaleResult, scale_dimensions};
pub use palette::{PaletteSettings, encode_palette};
pub use surface::{RasterSurface, decode};
