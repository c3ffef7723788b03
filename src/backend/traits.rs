//! Common traits and types for the enhancement and generation backends

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Failure;
use crate::types::{EnhancementResult, ImageSize};

/// Rewrites a prompt through a language-model backend
#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Issue one enhancement call bounded by `timeout`. Never retried.
    async fn enhance(&self, prompt: &str, timeout: Duration) -> Result<EnhancementResult, Failure>;
}

/// One inference pass: one prompt in, one image out
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub prompt: String,
    pub size: ImageSize,
    /// Position of this pass within its batch
    pub index: u32,
}

/// A loaded image generation backend.
///
/// Implementations are not required to tolerate concurrent calls; the
/// generation engine only ever calls `render` while holding its gate.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Get the backend transport (`in_process` or `http`)
    fn protocol(&self) -> &str;

    /// Run a single pass and return PNG bytes of exactly `request.size`
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, Failure>;
}
