//! Base64 encoding and decoding of raster payloads

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::Failure;

/// Encode binary data to a base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base64 payload received from a backend.
///
/// Accepts bare base64 as well as `data:image/png;base64,...` URLs, which
/// some txt2img servers return.
pub fn decode(encoded: &str) -> Result<Vec<u8>, Failure> {
    let data = match encoded.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| Failure::protocol(format!("Invalid base64 image data: {}", e)))
}
