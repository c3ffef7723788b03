//! Response handling module - generated images and the response envelope

pub mod base64;
pub mod png;

use chrono::Utc;

use crate::error::Failure;

/// Content type of every image the gateway returns
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// One generated image, base64-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Base64 of the PNG bytes
    pub encoded_bytes: String,
    pub content_type: &'static str,
}

impl GeneratedImage {
    pub fn from_png(png: &[u8]) -> Self {
        Self {
            encoded_bytes: base64::encode(png),
            content_type: PNG_CONTENT_TYPE,
        }
    }

    /// Recover the raster bytes
    pub fn decode(&self) -> Result<Vec<u8>, Failure> {
        base64::decode(&self.encoded_bytes)
    }
}

/// Result of a fulfilled generation request
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Unix seconds, taken when the response was assembled
    pub created_at: i64,
    pub images: Vec<GeneratedImage>,
}

impl GenerationResponse {
    /// Stamp a finished batch with the current time
    pub fn assemble(images: Vec<GeneratedImage>) -> Self {
        Self {
            created_at: Utc::now().timestamp(),
            images,
        }
    }
}
