//! Input recognition and output file naming.
//!
//! A file is convertible if its name ends in a recognized image suffix or its
//! declared media type says PNG/JPEG:
//!
//! | Suffix (any case) | Media types |
//! |---|---|
//! | `.png` | `image/png` |
//! | `.jpg`, `.jpeg` | `image/jpeg`, `image/jpg` |
//!
//! Output names swap the recognized suffix for the target one:
//! - `photo.PNG` → `photo.gif`
//! - `scan.jpeg` → `scan.mp4`
//! - `notes` → `notes.gif` (no recognized suffix, appended)

use crate::types::OutputFormat;

const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg"];
const IMAGE_MEDIA_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg"];

/// Length of the recognized image suffix at the end of `name`, if any.
fn image_suffix_len(name: &str) -> Option<usize> {
    let lower = name.to_ascii_lowercase();
    IMAGE_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| suffix.len())
}

/// Whether a file with this name and optional media type can be converted.
pub fn is_png_or_jpg(name: &str, media_type: Option<&str>) -> bool {
    let by_type = media_type.is_some_and(|t| {
        IMAGE_MEDIA_TYPES
            .iter()
            .any(|known| t.trim().eq_ignore_ascii_case(known))
    });
    by_type || image_suffix_len(name).is_some()
}

/// Output file name for `input_name` converted to `format`.
pub fn output_name(input_name: &str, format: OutputFormat) -> String {
    let stem = match image_suffix_len(input_name) {
        Some(len) => &input_name[..input_name.len() - len],
        None => input_name,
    };
    format!("{stem}{}", format.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_by_suffix_any_case() {
        assert!(is_png_or_jpg("a.png", None));
        assert!(is_png_or_jpg("a.JPG", None));
        assert!(is_png_or_jpg("a.Jpeg", None));
        assert!(!is_png_or_jpg("a.gif", None));
        assert!(!is_png_or_jpg("png", None));
    }

    #[test]
    fn recognizes_by_media_type() {
        assert!(is_png_or_jpg("upload", Some("image/png")));
        assert!(is_png_or_jpg("upload", Some("IMAGE/JPEG")));
        assert!(is_png_or_jpg("upload", Some("image/jpg")));
        assert!(!is_png_or_jpg("upload", Some("image/webp")));
    }

    #[test]
    fn output_name_replaces_suffix() {
        assert_eq!(output_name("photo.png", OutputFormat::Gif), "photo.gif");
        assert_eq!(output_name("photo.PNG", OutputFormat::Video), "photo.mp4");
        assert_eq!(output_name("scan.jpeg", OutputFormat::Gif), "scan.gif");
        assert_eq!(output_name("my.trip.jpg", OutputFormat::Video), "my.trip.mp4");
    }

    #[test]
    fn output_name_appends_without_known_suffix() {
        assert_eq!(output_name("notes", OutputFormat::Gif), "notes.gif");
        assert_eq!(output_name("anim.webp", OutputFormat::Video), "anim.webp.mp4");
    }

    #[test]
    fn only_trailing_suffix_is_replaced() {
        assert_eq!(output_name("a.png.jpg", OutputFormat::Gif), "a.png.gif");
    }
}
