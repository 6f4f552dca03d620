//! Utility functions for wikilite
//!
//! This module provides common utility functions used throughout the project.

use crate::error::Result;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::time::Duration;

/// Compress text with raw deflate
pub fn deflate_text(text: &str) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Decompress raw-deflate bytes back into text
pub fn inflate_text(data: &[u8]) -> Result<String> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

/// Calculate progress percentage
pub fn calculate_progress(current: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (current as f64 / total as f64) * 100.0
    }
}

/// Estimate remaining time from elapsed time and completed fraction
pub fn estimate_remaining(elapsed: Duration, progress_percent: f64) -> Option<Duration> {
    if progress_percent <= 0.0 {
        return None;
    }
    let total = elapsed.as_secs_f64() / (progress_percent / 100.0);
    let remaining = total - elapsed.as_secs_f64();
    if remaining.is_finite() && remaining >= 0.0 {
        Some(Duration::from_secs(remaining as u64))
    } else {
        None
    }
}

/// Format a duration as h/m/s for progress lines
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_roundtrip() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let compressed = deflate_text(&text).unwrap();
        assert!(compressed.len() < text.len());
        assert_eq!(inflate_text(&compressed).unwrap(), text);
    }

    #[test]
    fn test_deflate_empty() {
        let compressed = deflate_text("").unwrap();
        assert_eq!(inflate_text(&compressed).unwrap(), "");
    }

    #[test]
    fn test_calculate_progress() {
        assert_eq!(calculate_progress(0, 0), 0.0);
        assert_eq!(calculate_progress(50, 100), 50.0);
        assert_eq!(calculate_progress(100, 100), 100.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h02m05s");
    }
}
