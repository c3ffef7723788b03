//! Chat-completion client used for prompt enhancement
//!
//! Talks to any server exposing an OpenAI-style `/v1/chat/completions`
//! endpoint (llama.cpp in server mode, vLLM, ...). One request per call, no
//! conversation state, no retries.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::backend::traits::PromptEnhancer;
use crate::config::EnhancerConfig;
use crate::error::{AppError, Failure, Result};
use crate::types::EnhancementResult;

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Pooled HTTP client for the language-model backend
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: Option<String>,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    max_response_bytes: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    /// Create the client and its connection pool. Called once at startup.
    pub fn new(config: &EnhancerConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), COMPLETIONS_PATH),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_response_bytes: config.max_response_bytes,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> Failure {
        if e.is_timeout() {
            error!(endpoint = %self.endpoint, error = %e, "Language model request timed out");
            Failure::backend_timeout("The request to the language model server timed out.")
        } else {
            error!(endpoint = %self.endpoint, error = %e, "Language model request failed");
            Failure::backend_unavailable(
                "The language model server is not reachable. \
                 Ensure it is running in OpenAI-compatible mode.",
            )
        }
    }

    /// Read the body, refusing anything over the configured limit
    async fn read_limited(
        &self,
        mut response: reqwest::Response,
    ) -> std::result::Result<Vec<u8>, Failure> {
        let too_large = || {
            Failure::protocol(format!(
                "The language model response exceeded {} bytes.",
                self.max_response_bytes
            ))
        };

        if let Some(length) = response.content_length() {
            if length > self.max_response_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_transport_error(e))?
        {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl PromptEnhancer for ChatCompletionClient {
    fn name(&self) -> &str {
        "chat_completion"
    }

    async fn enhance(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> std::result::Result<EnhancementResult, Failure> {
        let started = Instant::now();
        info!(prompt_chars = prompt.chars().count(), "Prompt enhancement started");

        let request = ChatRequest {
            model: self.model.as_deref(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            error!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                "Language model returned an error status"
            );
            return Err(Failure::backend_unavailable(format!(
                "The language model server returned HTTP status {}.",
                status.as_u16()
            )));
        }

        let body = self.read_limited(response).await?;
        let parsed: ChatResponse = serde_json::from_slice(&body).map_err(|e| {
            error!(error = %e, "Unparseable language model response");
            Failure::protocol("The language model returned an unexpected response structure.")
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                Failure::protocol("The language model returned an unexpected response structure.")
            })?;

        let enhanced_prompt = content.trim();
        if enhanced_prompt.is_empty() {
            return Err(Failure::protocol(
                "The language model returned an empty enhanced prompt.",
            ));
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            enhanced_chars = enhanced_prompt.chars().count(),
            "Prompt enhancement completed"
        );

        Ok(EnhancementResult {
            enhanced_prompt: enhanced_prompt.to_string(),
        })
    }
}
