//! Request orchestration: optionally enhance, then generate

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::traits::PromptEnhancer;
use crate::error::Failure;
use crate::gateway::engine::GenerationEngine;
use crate::response::GenerationResponse;
use crate::types::{EnhancementRequest, EnhancementResult, GenerationRequest};

/// Where a generation request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    EnhancingPrompt,
    Generating,
    Assembled,
    Failed,
}

/// Sequences the enhancement client and the generation engine for one
/// request at a time. Holds no resources of its own.
pub struct Orchestrator {
    enhancer: Arc<dyn PromptEnhancer>,
    engine: Arc<GenerationEngine>,
    enhancement_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        enhancer: Arc<dyn PromptEnhancer>,
        engine: Arc<GenerationEngine>,
        enhancement_timeout: Duration,
    ) -> Self {
        Self {
            enhancer,
            engine,
            enhancement_timeout,
        }
    }

    pub fn engine(&self) -> &GenerationEngine {
        &self.engine
    }

    /// Standalone enhancement
    pub async fn enhance(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, Failure> {
        self.enhancer
            .enhance(request.prompt(), self.enhancement_timeout)
            .await
    }

    /// Fulfil a generation request. Failures from either backend are
    /// returned exactly as the backend produced them.
    pub async fn fulfil(&self, request: GenerationRequest) -> Result<GenerationResponse, Failure> {
        let mut phase = RequestPhase::Received;
        let outcome = self.run(&request, &mut phase).await;

        match &outcome {
            Ok(response) => {
                advance(&mut phase, RequestPhase::Assembled);
                info!(images = response.images.len(), "Generation request fulfilled");
            }
            Err(failure) => {
                warn!(phase = ?phase, kind = %failure.kind, "Generation request failed");
                advance(&mut phase, RequestPhase::Failed);
            }
        }

        outcome
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        phase: &mut RequestPhase,
    ) -> Result<GenerationResponse, Failure> {
        let mut prompt = request.prompt().to_string();

        if request.use_enhancer() {
            advance(phase, RequestPhase::EnhancingPrompt);
            let enhanced = self
                .enhancer
                .enhance(request.prompt(), self.enhancement_timeout)
                .await?;

            // Logged so the rewrite is recoverable if generation fails
            info!(
                original_prompt = %request.prompt(),
                enhanced_prompt = %enhanced.enhanced_prompt,
                "Enhanced prompt for generation"
            );
            prompt = enhanced.enhanced_prompt;
        }

        advance(phase, RequestPhase::Generating);
        let images = self
            .engine
            .generate(&prompt, request.count(), request.size())
            .await?;

        Ok(GenerationResponse::assemble(images))
    }
}

fn advance(phase: &mut RequestPhase, next: RequestPhase) {
    debug!(from = ?*phase, to = ?next, "Request phase");
    *phase = next;
}
