//! Prompt Image Gateway
//!
//! Accepts a text prompt, optionally rewrites it through a chat-completion
//! backend, and generates images on a single shared generation backend that
//! is accessed one batch at a time.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod types;

pub use error::{AppError, Failure, FailureKind, Result};

use std::sync::Arc;
use tracing::info;

use backend::chat_backend::ChatCompletionClient;
use gateway::{GenerationEngine, Orchestrator};
use metrics::RequestMetrics;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<RequestMetrics>,
}

impl AppState {
    /// Construct every component from settings. Loads the generation
    /// backend, so this runs once at startup.
    pub async fn build(settings: config::Settings) -> Result<Arc<Self>> {
        let enhancer = Arc::new(ChatCompletionClient::new(&settings.enhancer)?);
        let backend = backend::build_image_backend(&settings.generation).await?;
        let engine = Arc::new(GenerationEngine::new(backend));

        info!(
            enhancer = %settings.enhancer.base_url,
            generation = %engine.backend_name(),
            protocol = %engine.protocol(),
            "Components initialized"
        );

        let orchestrator = Arc::new(Orchestrator::new(
            enhancer,
            engine,
            settings.enhancer.timeout(),
        ));

        Ok(Arc::new(Self {
            settings: Arc::new(settings),
            orchestrator,
            metrics: Arc::new(RequestMetrics::new()),
        }))
    }
}
