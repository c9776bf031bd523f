//! Pure dimension math for fitting a source image into a platform envelope.
//!
//! All functions here are pure and testable without any I/O or images.

/// Maximum (required) and minimum (optional, default 1) output dimensions.
///
/// `min <= max` per axis is the caller's responsibility and is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleConstraints {
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
}

impl ScaleConstraints {
    /// Constraints with only a maximum envelope; minimums default to 1.
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
            min_width: None,
            min_height: None,
        }
    }

    pub fn with_min(mut self, min_width: u32, min_height: u32) -> Self {
        self.min_width = Some(min_width);
        self.min_height = Some(min_height);
        self
    }
}

/// Outcome of [`scale_dimensions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleResult {
    pub width: u32,
    pub height: u32,
    /// Ratio applied by the max-constraint pass only. Minimum clamps never
    /// change it; `1.0` when the max pass did not fire.
    pub scale: f64,
    /// True if the max pass or either minimum clamp changed a dimension.
    pub was_scaled: bool,
}

/// Which way the source image leans. Square counts as portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    pub fn of(width: u32, height: u32) -> Self {
        if width > height {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

/// Fit `(width, height)` inside `constraints` while preserving aspect ratio.
///
/// 1. If either axis exceeds its maximum, both are multiplied by
///    `min(max_width / width, max_height / height)` and rounded half away
///    from zero.
/// 2. Each axis is then independently raised to its minimum.
///
/// Step 2 can break the aspect ratio when only one axis is under its minimum.
///
/// # Examples
/// ```
/// # use stillloop::imaging::{ScaleConstraints, scale_dimensions};
/// let r = scale_dimensions(2000, 1000, &ScaleConstraints::new(1920, 1200));
/// assert_eq!((r.width, r.height), (1920, 960));
/// assert!(r.was_scaled);
/// ```
pub fn scale_dimensions(width: u32, height: u32, constraints: &ScaleConstraints) -> ScaleResult {
    let mut new_width = width;
    let mut new_height = height;
    let mut scale = 1.0;
    let mut was_scaled = false;

    if new_width > constraints.max_width || new_height > constraints.max_height {
        let scale_w = constraints.max_width as f64 / new_width as f64;
        let scale_h = constraints.max_height as f64 / new_height as f64;
        scale = scale_w.min(scale_h);
        new_width = (new_width as f64 * scale).round() as u32;
        new_height = (new_height as f64 * scale).round() as u32;
        was_scaled = true;
    }

    let min_width = constraints.min_width.unwrap_or(1);
    let min_height = constraints.min_height.unwrap_or(1);

    if new_width < min_width {
        new_width = min_width;
        was_scaled = true;
    }
    if new_height < min_height {
        new_height = min_height;
        was_scaled = true;
    }

    ScaleResult {
        width: new_width,
        height: new_height,
        scale,
        was_scaled,
    }
}
