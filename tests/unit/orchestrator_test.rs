//! Unit tests for request orchestration

use async_trait::async_trait;
use prompt_image_gateway::backend::local_backend::{load_pipeline, LocalBackend};
use prompt_image_gateway::backend::traits::{ImageBackend, PromptEnhancer, RenderRequest};
use prompt_image_gateway::config::GenerationConfig;
use prompt_image_gateway::gateway::{GenerationEngine, Orchestrator};
use prompt_image_gateway::response::png;
use prompt_image_gateway::types::{EnhancementResult, GenerationRequest, ImageSize};
use prompt_image_gateway::{Failure, FailureKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Enhancer that counts calls and answers with a fixed outcome
struct StubEnhancer {
    calls: AtomicUsize,
    outcome: Result<String, Failure>,
}

impl StubEnhancer {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(text.to_string()),
        })
    }

    fn failing(failure: Failure) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Err(failure),
        })
    }
}

#[async_trait]
impl PromptEnhancer for StubEnhancer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn enhance(
        &self,
        _prompt: &str,
        _timeout: Duration,
    ) -> Result<EnhancementResult, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map(|enhanced_prompt| EnhancementResult { enhanced_prompt })
    }
}

struct BrokenBackend;

#[async_trait]
impl ImageBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn protocol(&self) -> &str {
        "http"
    }

    async fn render(&self, _request: &RenderRequest) -> Result<Vec<u8>, Failure> {
        Err(Failure::protocol("The image generation server returned no images in its response."))
    }
}

fn procedural_engine() -> Arc<GenerationEngine> {
    let pipeline = load_pipeline(&GenerationConfig::default()).unwrap();
    Arc::new(GenerationEngine::new(Box::new(LocalBackend::new(pipeline, 1))))
}

#[tokio::test]
async fn test_single_image_at_default_size() {
    let enhancer = StubEnhancer::answering("unused");
    let orchestrator =
        Orchestrator::new(enhancer.clone(), procedural_engine(), Duration::from_secs(5));

    let request = GenerationRequest::new("a cat", false, 1, ImageSize::S512).unwrap();
    let response = orchestrator.fulfil(request).await.unwrap();

    assert_eq!(response.images.len(), 1);
    let bytes = response.images[0].decode().unwrap();
    assert_eq!(png::dimensions(&bytes).unwrap(), (512, 512));

    let now = chrono::Utc::now().timestamp();
    assert!((now - response.created_at).abs() <= 1);
}

#[tokio::test]
async fn test_enhancer_skipped_when_not_requested() {
    let enhancer = StubEnhancer::answering("a cat, oil painting");
    let engine = procedural_engine();
    let orchestrator =
        Orchestrator::new(enhancer.clone(), Arc::clone(&engine), Duration::from_secs(5));

    let request = GenerationRequest::new("a cat", false, 2, ImageSize::S256).unwrap();
    orchestrator.fulfil(request).await.unwrap();

    assert_eq!(enhancer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.stats().inference_passes, 2);
}

#[tokio::test]
async fn test_enhancer_timeout_never_reaches_engine() {
    let failure = Failure::backend_timeout("The request to the language model server timed out.");
    let enhancer = StubEnhancer::failing(failure.clone());
    let engine = procedural_engine();
    let orchestrator =
        Orchestrator::new(enhancer.clone(), Arc::clone(&engine), Duration::from_secs(5));

    let request = GenerationRequest::new("a cat", true, 1, ImageSize::S256).unwrap();
    let err = orchestrator.fulfil(request).await.unwrap_err();

    assert_eq!(err, failure);
    assert_eq!(err.kind, FailureKind::BackendTimeout);
    assert_eq!(enhancer.calls.load(Ordering::SeqCst), 1);

    let stats = engine.stats();
    assert_eq!(stats.gate_acquisitions, 0);
    assert_eq!(stats.inference_passes, 0);
}

#[tokio::test]
async fn test_generation_failure_passes_through_unchanged() {
    let enhancer = StubEnhancer::answering("a cat, watercolour");
    let engine = Arc::new(GenerationEngine::new(Box::new(BrokenBackend)));
    let orchestrator = Orchestrator::new(enhancer, engine, Duration::from_secs(5));

    let request = GenerationRequest::new("a cat", true, 3, ImageSize::S768).unwrap();
    let err = orchestrator.fulfil(request).await.unwrap_err();

    assert_eq!(
        err,
        Failure::protocol("The image generation server returned no images in its response.")
    );
}
