//! Wire types for the HTTP API

use serde::{Deserialize, Serialize};

use crate::error::Failure;
use crate::gateway::EngineStats;
use crate::metrics::MetricsSnapshot;
use crate::response::{GeneratedImage, GenerationResponse};
use crate::types::{GenerationRequest, ImageSize, MAX_IMAGES_PER_REQUEST};

/// `POST /v1/prompts/enhance` request body
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnhancePromptBody {
    pub prompt: String,
}

/// `POST /v1/prompts/enhance` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancePromptReply {
    pub enhanced_prompt: String,
}

/// `POST /v1/images/generations` request body
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageGenerationBody {
    pub prompt: String,
    #[serde(default)]
    pub use_enhancer: bool,
    #[serde(default = "default_n")]
    pub n: i64,
    #[serde(default = "default_size")]
    pub size: String,
}

fn default_n() -> i64 {
    1
}

fn default_size() -> String {
    ImageSize::default().as_str().to_string()
}

impl ImageGenerationBody {
    /// Validate the body into a request the orchestrator accepts
    pub fn into_request(self) -> Result<GenerationRequest, Failure> {
        let count = u32::try_from(self.n).map_err(|_| {
            Failure::validation(format!(
                "n must be between 1 and {}, got {}",
                MAX_IMAGES_PER_REQUEST, self.n
            ))
        })?;
        let size: ImageSize = self.size.parse()?;

        GenerationRequest::new(self.prompt, self.use_enhancer, count, size)
    }
}

/// One image in a generation reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub base64_encoded_image: String,
    pub content_type: String,
}

impl From<GeneratedImage> for ImageData {
    fn from(image: GeneratedImage) -> Self {
        Self {
            base64_encoded_image: image.encoded_bytes,
            content_type: image.content_type.to_string(),
        }
    }
}

/// `POST /v1/images/generations` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationReply {
    pub created_at_unix_timestamp: i64,
    pub data: Vec<ImageData>,
}

impl From<GenerationResponse> for ImageGenerationReply {
    fn from(response: GenerationResponse) -> Self {
        Self {
            created_at_unix_timestamp: response.created_at,
            data: response.images.into_iter().map(ImageData::from).collect(),
        }
    }
}

/// `GET /health` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
}

/// `GET /metrics` body: request metrics plus generation engine counters
#[derive(Debug, Serialize)]
pub struct MetricsReply {
    #[serde(flatten)]
    pub requests: MetricsSnapshot,
    pub engine: EngineStats,
}
