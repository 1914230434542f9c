//! Photo compression pipeline.
//!
//! Captured pit photos are scaled down and re-encoded to a compact lossy
//! format before upload. The contract is the output size and quality, not
//! the codec; this implementation decodes with the `image` crate and
//! encodes JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::io::Cursor;
use thiserror::Error;
use uuid::Uuid;

/// Longest output dimension in pixels.
pub const MAX_DIMENSION: u32 = 1600;

/// Default encode quality (0.0 - 1.0).
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Photo pipeline errors.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),
}

/// Compress an image payload: scale the longer dimension down to at most
/// `max_dimension` preserving aspect ratio (never upscales), then encode
/// lossy at `quality` (0.0 - 1.0). Returns the encoded bytes.
pub fn compress(bytes: &[u8], max_dimension: u32, quality: f32) -> Result<Vec<u8>, PhotoError> {
    let img = image::load_from_memory(bytes).map_err(|e| PhotoError::DecodeFailed(e.to_string()))?;

    let longer = img.width().max(img.height());
    let img = if longer > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        img
    };

    let q = (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8;
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), q);
    rgb.write_with_encoder(encoder)
        .map_err(|e| PhotoError::EncodeFailed(e.to_string()))?;
    Ok(out)
}

/// Compress with the default dimension cap and quality.
pub fn compress_default(bytes: &[u8]) -> Result<Vec<u8>, PhotoError> {
    compress(bytes, MAX_DIMENSION, DEFAULT_QUALITY)
}

/// Deterministic-unique upload filename:
/// `<event>_<team>_<timestamp>_<random-suffix>.jpg`, event sanitized to
/// lowercase `[a-z0-9_-]`.
pub fn photo_filename(event_key: &str, team_number: u32, timestamp_ms: i64) -> String {
    let safe_event: String = event_key
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let suffix = rand_suffix();
    format!("{safe_event}_{team_number}_{timestamp_ms}_{suffix}.jpg")
}

fn rand_suffix() -> String {
    let id = Uuid::new_v4();
    id.simple().to_string()[..8].to_string()
}
