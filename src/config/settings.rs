//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix; sections are separated with `__`,
/// e.g. `TEXT_TO_IMAGE_ENHANCER__BASE_URL`.
pub const ENV_PREFIX: &str = "TEXT_TO_IMAGE";

/// Overrides the configuration file location
pub const CONFIG_PATH_VAR: &str = "TEXT_TO_IMAGE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub enhancer: EnhancerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Empty disables CORS
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_request_bytes() -> usize {
    1_048_576
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_bytes: default_max_request_bytes(),
            cors_allowed_origins: vec![],
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Chat-completion backend used for prompt enhancement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnhancerConfig {
    #[serde(default = "default_enhancer_url")]
    pub base_url: String,
    /// Sent as `model` when set; llama.cpp ignores it
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_enhancer_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_pool_size")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_enhancer_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_enhancer_timeout() -> u64 {
    120_000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    512
}

fn default_system_prompt() -> String {
    "You are an expert prompt engineer specialising in text-to-image generation. \
     Rewrite the user's prompt as a single, richly detailed image description. \
     Add details about lighting, composition, style, colour palette and mood. \
     Return only the enhanced prompt text with no preamble, explanation or quotation marks."
        .to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_max_response_bytes() -> usize {
    1_048_576
}

impl EnhancerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            base_url: default_enhancer_url(),
            model: None,
            timeout_ms: default_enhancer_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            pool_max_idle_per_host: default_pool_size(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// Where the generation backend lives. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    InProcess,
    Http,
}

/// Device requested for the in-process pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

/// Image generation backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub device: DeviceSelection,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Only used by the `http` transport
    #[serde(default = "default_generation_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_inference_steps")]
    pub inference_steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_sampler")]
    pub sampler: String,
    /// Upper bound on in-process passes occupying blocking threads at once
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_model_id() -> String {
    "procedural".to_string()
}

fn default_generation_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_inference_steps() -> u32 {
    20
}

fn default_guidance_scale() -> f32 {
    7.0
}

fn default_sampler() -> String {
    "Euler a".to_string()
}

fn default_worker_threads() -> usize {
    2
}

impl GenerationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            device: DeviceSelection::default(),
            model_id: default_model_id(),
            base_url: default_generation_url(),
            connect_timeout_ms: default_connect_timeout(),
            inference_steps: default_inference_steps(),
            guidance_scale: default_guidance_scale(),
            sampler: default_sampler(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file and environment variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            // A missing file is fine; every field has a default
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_allowed_origins")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }
        if self.server.max_request_bytes == 0 {
            return Err(invalid("server.max_request_bytes must be at least 1"));
        }

        validate_url("enhancer.base_url", &self.enhancer.base_url)?;
        if self.enhancer.timeout_ms == 0 {
            return Err(invalid("enhancer.timeout_ms must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.enhancer.temperature) {
            return Err(invalid(format!(
                "enhancer.temperature must be within 0.0..=2.0, got {}",
                self.enhancer.temperature
            )));
        }
        if self.enhancer.max_tokens == 0 {
            return Err(invalid("enhancer.max_tokens must be at least 1"));
        }
        if self.enhancer.system_prompt.trim().is_empty() {
            return Err(invalid("enhancer.system_prompt cannot be empty"));
        }
        if self.enhancer.max_response_bytes == 0 {
            return Err(invalid("enhancer.max_response_bytes must be at least 1"));
        }

        if self.generation.transport == Transport::Http {
            validate_url("generation.base_url", &self.generation.base_url)?;
        }
        if self.generation.model_id.trim().is_empty() {
            return Err(invalid("generation.model_id cannot be empty"));
        }
        if self.generation.inference_steps == 0 {
            return Err(invalid("generation.inference_steps must be at least 1"));
        }
        if self.generation.guidance_scale < 0.0 {
            return Err(invalid("generation.guidance_scale cannot be negative"));
        }
        if self.generation.worker_threads == 0 {
            return Err(invalid("generation.worker_threads must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidSettings(message.into())
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} cannot be empty", field)));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(invalid(format!(
            "{} must be an http(s) URL, got '{}'",
            field, value
        )));
    }
    Ok(())
}
