//! Validated request types shared by the boundary and the core
//!
//! Constructors here are the only way to build a request, so anything that
//! reaches the orchestrator or the generation engine has already passed the
//! field constraints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Failure;

/// Longest accepted prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 4096;

/// Most images a single request may ask for
pub const MAX_IMAGES_PER_REQUEST: u32 = 4;

/// Supported square output sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "256x256")]
    S256,
    #[default]
    #[serde(rename = "512x512")]
    S512,
    #[serde(rename = "768x768")]
    S768,
    #[serde(rename = "1024x1024")]
    S1024,
}

impl ImageSize {
    pub const ALL: [ImageSize; 4] = [
        ImageSize::S256,
        ImageSize::S512,
        ImageSize::S768,
        ImageSize::S1024,
    ];

    /// `(width, height)` in pixels
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ImageSize::S256 => (256, 256),
            ImageSize::S512 => (512, 512),
            ImageSize::S768 => (768, 768),
            ImageSize::S1024 => (1024, 1024),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::S256 => "256x256",
            ImageSize::S512 => "512x512",
            ImageSize::S768 => "768x768",
            ImageSize::S1024 => "1024x1024",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = Failure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageSize::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| {
                Failure::validation(format!(
                    "Unsupported size '{}'. Supported sizes: 256x256, 512x512, 768x768, 1024x1024.",
                    s
                ))
            })
    }
}

/// Check the prompt constraints shared by both endpoints
pub fn validate_prompt(prompt: &str) -> Result<(), Failure> {
    let length = prompt.chars().count();
    if length == 0 {
        return Err(Failure::validation("The prompt must not be empty."));
    }
    if length > MAX_PROMPT_CHARS {
        return Err(Failure::validation(format!(
            "The prompt must be at most {} characters, got {}.",
            MAX_PROMPT_CHARS, length
        )));
    }
    if prompt.trim().is_empty() {
        return Err(Failure::validation(
            "The prompt must contain at least one non-whitespace character.",
        ));
    }
    Ok(())
}

/// A prompt to be rewritten by the language model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementRequest {
    prompt: String,
}

impl EnhancementRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self, Failure> {
        let prompt = prompt.into();
        validate_prompt(&prompt)?;
        Ok(Self { prompt })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// The language model's rewrite of a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementResult {
    pub enhanced_prompt: String,
}

/// A validated image generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    use_enhancer: bool,
    count: u32,
    size: ImageSize,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        use_enhancer: bool,
        count: u32,
        size: ImageSize,
    ) -> Result<Self, Failure> {
        let prompt = prompt.into();
        validate_prompt(&prompt)?;
        if !(1..=MAX_IMAGES_PER_REQUEST).contains(&count) {
            return Err(Failure::validation(format!(
                "n must be between 1 and {}, got {}.",
                MAX_IMAGES_PER_REQUEST, count
            )));
        }

        Ok(Self {
            prompt,
            use_enhancer,
            count,
            size,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn use_enhancer(&self) -> bool {
        self.use_enhancer
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }
}
