//! Unit tests for the generation engine

use async_trait::async_trait;
use parking_lot::Mutex;
use prompt_image_gateway::backend::local_backend::{
    load_pipeline, InferencePipeline, LocalBackend, ProceduralPipeline,
};
use prompt_image_gateway::backend::traits::{ImageBackend, RenderRequest};
use prompt_image_gateway::config::GenerationConfig;
use prompt_image_gateway::gateway::GenerationEngine;
use prompt_image_gateway::response::png;
use prompt_image_gateway::types::ImageSize;
use prompt_image_gateway::Failure;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records when each pass starts and ends and how many run at once
struct InstrumentedBackend {
    active: AtomicUsize,
    peak: AtomicUsize,
    passes: Arc<Mutex<Vec<(Instant, Instant)>>>,
    pass_time: Duration,
}

impl InstrumentedBackend {
    fn new(pass_time: Duration, passes: Arc<Mutex<Vec<(Instant, Instant)>>>) -> Self {
        Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            passes,
            pass_time,
        }
    }
}

#[async_trait]
impl ImageBackend for InstrumentedBackend {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn protocol(&self) -> &str {
        "in_process"
    }

    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, Failure> {
        let entered = Instant::now();
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.pass_time).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.passes.lock().push((entered, Instant::now()));
        Ok(vec![request.index as u8])
    }
}

fn procedural_engine() -> GenerationEngine {
    let pipeline = load_pipeline(&GenerationConfig::default()).unwrap();
    GenerationEngine::new(Box::new(LocalBackend::new(pipeline, 1)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generations_never_overlap() {
    let passes = Arc::new(Mutex::new(Vec::new()));
    let backend = InstrumentedBackend::new(Duration::from_millis(5), Arc::clone(&passes));
    let engine = Arc::new(GenerationEngine::new(Box::new(backend)));

    let calls = (0..8u32).map(|i| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let count = i % 3 + 1;
            let images = engine
                .generate(&format!("prompt {}", i), count, ImageSize::S256)
                .await
                .unwrap();
            assert_eq!(images.len(), count as usize);
        })
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let mut passes = passes.lock().clone();
    // 8 calls with counts 1,2,3,1,2,3,1,2
    assert_eq!(passes.len(), 15);
    passes.sort_by_key(|(entered, _)| *entered);
    for pair in passes.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "passes overlapped");
    }

    let stats = engine.stats();
    assert_eq!(stats.gate_acquisitions, 8);
    assert_eq!(stats.inference_passes, 15);
}

#[tokio::test]
async fn test_two_images_share_one_gate_acquisition() {
    let engine = procedural_engine();
    let images = engine.generate("a cat", 2, ImageSize::S256).await.unwrap();

    assert_eq!(images.len(), 2);
    for image in &images {
        assert_eq!(image.content_type, "image/png");
        assert_eq!(png::dimensions(&image.decode().unwrap()).unwrap(), (256, 256));
    }

    let stats = engine.stats();
    assert_eq!(stats.inference_passes, 2);
    assert_eq!(stats.gate_acquisitions, 1);
}

#[tokio::test]
async fn test_images_follow_request_order() {
    let engine = procedural_engine();
    let mut reference = ProceduralPipeline::load(&GenerationConfig::default()).unwrap();

    for count in 1..=4u32 {
        let images = engine.generate("a red fox", count, ImageSize::S256).await.unwrap();
        assert_eq!(images.len(), count as usize);

        for (index, image) in images.iter().enumerate() {
            let expected = reference.run("a red fox", 256, 256, index as u32).unwrap();
            let actual = image::load_from_memory(&image.decode().unwrap())
                .unwrap()
                .to_rgb8();
            assert_eq!(actual, expected, "image {} of {}", index, count);
        }
    }
}

#[tokio::test]
async fn test_waiting_caller_can_leave() {
    let passes = Arc::new(Mutex::new(Vec::new()));
    let backend = InstrumentedBackend::new(Duration::from_millis(100), Arc::clone(&passes));
    let engine = Arc::new(GenerationEngine::new(Box::new(backend)));

    let holder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate("first", 1, ImageSize::S256).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waited = tokio::time::timeout(
        Duration::from_millis(20),
        engine.generate("second", 1, ImageSize::S256),
    )
    .await;
    assert!(waited.is_err());

    assert_eq!(holder.await.unwrap().unwrap().len(), 1);

    // Give the abandoned batch a moment to observe its closed channel
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stats = engine.stats();
    assert_eq!(stats.gate_acquisitions, 1);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(passes.lock().len(), 1);
}
