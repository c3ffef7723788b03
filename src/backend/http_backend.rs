//! HTTP image generation backend
//!
//! Delegates each pass to an AUTOMATIC1111-compatible `txt2img` server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error};

use crate::backend::traits::{ImageBackend, RenderRequest};
use crate::config::GenerationConfig;
use crate::error::{AppError, Failure, Result};
use crate::response::{base64, png};

const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";

/// Image generation delegated to an external service
pub struct HttpBackend {
    name: String,
    client: Client,
    base_url: String,
    steps: u32,
    cfg_scale: f32,
    sampler: String,
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    batch_size: u32,
    n_iter: u32,
    steps: u32,
    cfg_scale: f32,
    sampler_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

impl HttpBackend {
    /// Create a new HTTP backend from configuration.
    ///
    /// Only the connect phase is bounded; a pass runs as long as the
    /// server needs.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            name: config.model_id.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            steps: config.inference_steps,
            cfg_scale: config.guidance_scale,
            sampler: config.sampler.clone(),
        })
    }
}

#[async_trait]
impl ImageBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        "http"
    }

    async fn render(&self, request: &RenderRequest) -> std::result::Result<Vec<u8>, Failure> {
        let (width, height) = request.size.dimensions();
        let url = format!("{}{}", self.base_url, TXT2IMG_PATH);
        let started = Instant::now();

        debug!(
            backend = %self.name,
            url = %url,
            index = request.index,
            size = %request.size,
            "Sending txt2img request"
        );

        let body = Txt2ImgRequest {
            prompt: &request.prompt,
            width,
            height,
            batch_size: 1,
            n_iter: 1,
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            sampler_name: &self.sampler,
        };

        // Only the connect phase is bounded; any send error means the server
        // was not reached
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(
                    backend = %self.name,
                    url = %url,
                    error = %e,
                    "Image generation request failed"
                );
                Failure::backend_unavailable("Cannot connect to the image generation server.")
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                backend = %self.name,
                status = status.as_u16(),
                "Image generation server returned an error status"
            );
            return Err(Failure::backend_unavailable(format!(
                "The image generation server returned HTTP status {}.",
                status.as_u16()
            )));
        }

        let raw = response.bytes().await.map_err(|e| {
            error!(backend = %self.name, error = %e, "Reading txt2img response failed");
            Failure::backend_unavailable(
                "The connection to the image generation server was lost.",
            )
        })?;

        let parsed: Txt2ImgResponse = serde_json::from_slice(&raw).map_err(|e| {
            error!(backend = %self.name, error = %e, "Unparseable txt2img response");
            Failure::protocol(
                "The image generation server returned an unexpected response structure.",
            )
        })?;

        let encoded = parsed.images.into_iter().next().ok_or_else(|| {
            Failure::protocol("The image generation server returned no images in its response.")
        })?;

        let bytes = base64::decode(&encoded)?;
        let actual = png::dimensions(&bytes)?;
        if actual != (width, height) {
            return Err(Failure::protocol(format!(
                "The image generation server returned a {}x{} image for a {} request.",
                actual.0, actual.1, request.size
            )));
        }

        debug!(
            backend = %self.name,
            index = request.index,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "txt2img pass completed"
        );

        Ok(bytes)
    }
}
