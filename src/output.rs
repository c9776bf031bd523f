//! CLI output formatting for conversions and codec probes.
//!
//! # Information-First Display
//!
//! Every converted input leads with its positional index and source name;
//! what was produced and how is shown on indented context lines. Failures
//! keep the same header so a batch reads as one inventory.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! 001 beach.jpg → beach.mp4
//!     Size: 3000x2000 → 1800x1200 (scale 0.600)
//!     Video: 30 frames, avc1.42001E, direct
//!     Written: out/beach.mp4 (412.3 KB)
//! 002 notes.png
//!     Error: Failed to decode image: ...
//!
//! Converted 1 file, 1 failed
//! ```
//!
//! ## Probe
//!
//! ```text
//! Backend: openh264 at 1920x1080
//! Codecs
//!     avc1.42001E: supported
//!     hev1.1.6.L93.B0: unsupported
//! Recorder containers
//!     video/mp4;codecs=avc1: supported
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::convert::ConversionReport;
use crate::types::OutputFormat;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_bytes(n: usize) -> String {
    match n {
        n if n >= 1024 * 1024 => format!("{:.1} MB", n as f64 / (1024.0 * 1024.0)),
        n if n >= 1024 => format!("{:.1} KB", n as f64 / 1024.0),
        n => format!("{n} B"),
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Convert output
// ============================================================================

/// Format one successful conversion.
pub fn format_conversion(index: usize, report: &ConversionReport, written: &Path) -> Vec<String> {
    let ctx = indent(1);
    let mut lines = vec![format!(
        "{} {} → {}",
        format_index(index),
        report.source_name,
        report.output_name
    )];

    if report.was_scaled {
        lines.push(format!(
            "{ctx}Size: {}x{} → {}x{} (scale {:.3})",
            report.source_width, report.source_height, report.width, report.height, report.scale
        ));
    } else {
        lines.push(format!("{ctx}Size: {}x{}", report.width, report.height));
    }

    match report.format {
        OutputFormat::Gif => lines.push(format!("{ctx}GIF: {} frames, loops forever", report.frames)),
        OutputFormat::Video => {
            let mut detail = vec![format!("{} frames", report.frames)];
            detail.extend(report.codec.clone());
            detail.extend(report.strategy.map(|s| s.to_string()));
            lines.push(format!("{ctx}Video: {}", detail.join(", ")));
        }
    }

    lines.push(format!(
        "{ctx}Written: {} ({})",
        written.display(),
        format_bytes(report.bytes)
    ));
    lines
}

pub fn print_conversion(index: usize, report: &ConversionReport, written: &Path) {
    for line in format_conversion(index, report, written) {
        println!("{}", line);
    }
}

/// Format one failed conversion.
pub fn format_conversion_error(index: usize, input: &Path, error: &dyn std::error::Error) -> Vec<String> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    vec![
        format!("{} {}", format_index(index), name),
        format!("{}Error: {}", indent(1), error),
    ]
}

pub fn print_conversion_error(index: usize, input: &Path, error: &dyn std::error::Error) {
    for line in format_conversion_error(index, input, error) {
        println!("{}", line);
    }
}

/// Batch summary line.
pub fn format_summary(converted: usize, failed: usize) -> String {
    let mut line = format!("Converted {}", plural(converted, "file"));
    if failed > 0 {
        line.push_str(&format!(", {failed} failed"));
    }
    line
}

pub fn print_summary(converted: usize, failed: usize) {
    println!();
    println!("{}", format_summary(converted, failed));
}

// ============================================================================
// Probe output
// ============================================================================

/// One probe answer: a codec string or container type and whether it works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeLine {
    pub name: String,
    pub supported: bool,
}

/// Format the capability table printed by `probe`.
pub fn format_probe_output(
    backend: &str,
    width: u32,
    height: u32,
    codecs: &[ProbeLine],
    containers: &[ProbeLine],
) -> Vec<String> {
    let status = |supported: bool| if supported { "supported" } else { "unsupported" };
    let mut lines = vec![format!("Backend: {backend} at {width}x{height}")];
    lines.push("Codecs".to_string());
    for c in codecs {
        lines.push(format!("{}{}: {}", indent(1), c.name, status(c.supported)));
    }
    lines.push("Recorder containers".to_string());
    for c in containers {
        lines.push(format!("{}{}: {}", indent(1), c.name, status(c.supported)));
    }
    if !codecs.iter().any(|c| c.supported) {
        lines.push(String::new());
        lines.push("Video output unavailable at this size".to_string());
    }
    lines
}

pub fn print_probe_output(
    backend: &str,
    width: u32,
    height: u32,
    codecs: &[ProbeLine],
    containers: &[ProbeLine],
) {
    for line in format_probe_output(backend, width, height, codecs, containers) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoStrategy;

    fn report(format: OutputFormat) -> ConversionReport {
        ConversionReport {
            source_name: "beach.jpg".into(),
            output_name: "beach.mp4".into(),
            format,
            media_type: format.media_type(),
            source_width: 3000,
            source_height: 2000,
            width: 1800,
            height: 1200,
            scale: 0.6,
            was_scaled: true,
            frames: 30,
            codec: Some("avc1.42001E".into()),
            strategy: Some(VideoStrategy::DirectMux),
            bytes: 2048,
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    // =========================================================================
    // Convert output
    // =========================================================================

    #[test]
    fn video_conversion_lines() {
        let lines = format_conversion(1, &report(OutputFormat::Video), Path::new("out/beach.mp4"));
        assert_eq!(lines[0], "001 beach.jpg → beach.mp4");
        assert_eq!(lines[1], "    Size: 3000x2000 → 1800x1200 (scale 0.600)");
        assert_eq!(lines[2], "    Video: 30 frames, avc1.42001E, direct");
        assert_eq!(lines[3], "    Written: out/beach.mp4 (2.0 KB)");
    }

    #[test]
    fn unscaled_gif_conversion_lines() {
        let mut r = report(OutputFormat::Gif);
        r.was_scaled = false;
        r.width = 3000;
        r.height = 2000;
        r.frames = 2;
        r.codec = None;
        r.strategy = None;
        let lines = format_conversion(2, &r, Path::new("beach.gif"));
        assert_eq!(lines[1], "    Size: 3000x2000");
        assert_eq!(lines[2], "    GIF: 2 frames, loops forever");
    }

    #[test]
    fn conversion_error_lines() {
        let err = std::io::Error::other("boom");
        let lines = format_conversion_error(3, Path::new("dir/bad.png"), &err);
        assert_eq!(lines, ["003 bad.png", "    Error: boom"]);
    }

    #[test]
    fn summary_pluralizes() {
        assert_eq!(format_summary(1, 0), "Converted 1 file");
        assert_eq!(format_summary(3, 2), "Converted 3 files, 2 failed");
    }

    // =========================================================================
    // Probe output
    // =========================================================================

    #[test]
    fn probe_lists_codecs_and_containers() {
        let codecs = [
            ProbeLine { name: "avc1.42001E".into(), supported: true },
            ProbeLine { name: "hev1.1.6.L93.B0".into(), supported: false },
        ];
        let containers = [ProbeLine { name: "video/mp4".into(), supported: true }];
        let lines = format_probe_output("openh264", 1920, 1080, &codecs, &containers);
        assert_eq!(lines[0], "Backend: openh264 at 1920x1080");
        assert!(lines.contains(&"    avc1.42001E: supported".to_string()));
        assert!(lines.contains(&"    hev1.1.6.L93.B0: unsupported".to_string()));
        assert!(lines.contains(&"    video/mp4: supported".to_string()));
        assert!(!lines.iter().any(|l| l.contains("unavailable")));
    }

    #[test]
    fn probe_flags_missing_video_support() {
        let codecs = [ProbeLine { name: "avc1.42001E".into(), supported: false }];
        let lines = format_probe_output("mock", 64, 64, &codecs, &[]);
        assert_eq!(lines.last().unwrap(), "Video output unavailable at this size");
    }
}
