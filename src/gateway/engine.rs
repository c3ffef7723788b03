//! Generation engine: single-flight access to the image backend
//!
//! The backend lives inside a `tokio::sync::Mutex` (the gate). Each
//! `generate` call hands its batch to a spawned task that acquires the gate,
//! runs the passes in order and answers over a oneshot channel. The caller
//! only awaits the answer, so dropping the caller never interrupts a pass
//! mid-flight: the task notices the closed channel at the next pass boundary,
//! stops, and the gate guard is released when the task returns.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::backend::traits::{ImageBackend, RenderRequest};
use crate::error::Failure;
use crate::response::GeneratedImage;
use crate::types::{ImageSize, MAX_IMAGES_PER_REQUEST};

type BatchResult = Result<Vec<GeneratedImage>, Failure>;

#[derive(Default)]
struct Counters {
    gate_acquisitions: AtomicU64,
    inference_passes: AtomicU64,
    abandoned: AtomicU64,
    waiting: AtomicU64,
}

/// Engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    /// Batches that acquired the gate
    pub gate_acquisitions: u64,
    /// Passes handed to the backend
    pub inference_passes: u64,
    /// Batches dropped because their caller went away
    pub abandoned: u64,
    /// Batches currently waiting for the gate
    pub waiting: u64,
}

/// Owns the generation backend and serializes access to it
pub struct GenerationEngine {
    gate: Arc<Mutex<Box<dyn ImageBackend>>>,
    backend_name: String,
    protocol: String,
    counters: Arc<Counters>,
}

impl GenerationEngine {
    pub fn new(backend: Box<dyn ImageBackend>) -> Self {
        let backend_name = backend.name().to_string();
        let protocol = backend.protocol().to_string();
        info!(backend = %backend_name, protocol = %protocol, "Generation engine ready");

        Self {
            gate: Arc::new(Mutex::new(backend)),
            backend_name,
            protocol,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            gate_acquisitions: self.counters.gate_acquisitions.load(Ordering::Relaxed),
            inference_passes: self.counters.inference_passes.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            waiting: self.counters.waiting.load(Ordering::Relaxed),
        }
    }

    /// Generate `count` images of `size` for `prompt`, in order.
    ///
    /// `count` and `size` must already be validated. Either every pass
    /// succeeds or the first failure is returned and no images are.
    pub async fn generate(&self, prompt: &str, count: u32, size: ImageSize) -> BatchResult {
        debug_assert!((1..=MAX_IMAGES_PER_REQUEST).contains(&count));

        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(run_batch(
            Arc::clone(&self.gate),
            Arc::clone(&self.counters),
            prompt.to_string(),
            count,
            size,
            result_tx,
        ));

        result_rx.await.map_err(|_| {
            Failure::internal("The generation task ended without producing a result.")
        })?
    }
}

async fn run_batch(
    gate: Arc<Mutex<Box<dyn ImageBackend>>>,
    counters: Arc<Counters>,
    prompt: String,
    count: u32,
    size: ImageSize,
    mut result_tx: oneshot::Sender<BatchResult>,
) {
    let queued_at = Instant::now();
    counters.waiting.fetch_add(1, Ordering::Relaxed);

    let acquired = tokio::select! {
        guard = gate.lock_owned() => Some(guard),
        _ = result_tx.closed() => None,
    };
    counters.waiting.fetch_sub(1, Ordering::Relaxed);

    let Some(backend) = acquired else {
        counters.abandoned.fetch_add(1, Ordering::Relaxed);
        debug!("Caller went away while waiting for the generation gate");
        return;
    };

    counters.gate_acquisitions.fetch_add(1, Ordering::Relaxed);
    debug!(
        count,
        size = %size,
        waited_ms = queued_at.elapsed().as_millis() as u64,
        "Generation gate acquired"
    );

    let mut images = Vec::with_capacity(count as usize);
    for index in 0..count {
        if result_tx.is_closed() {
            counters.abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(completed = index, count, "Caller went away; batch stopped at pass boundary");
            return;
        }

        let request = RenderRequest {
            prompt: prompt.clone(),
            size,
            index,
        };
        counters.inference_passes.fetch_add(1, Ordering::Relaxed);

        match backend.render(&request).await {
            Ok(png) => images.push(GeneratedImage::from_png(&png)),
            Err(failure) => {
                warn!(
                    backend = %backend.name(),
                    index,
                    count,
                    kind = %failure.kind,
                    "Inference pass failed; discarding batch"
                );
                drop(backend);
                let _ = result_tx.send(Err(failure));
                return;
            }
        }
    }

    drop(backend);
    debug!(
        count,
        elapsed_ms = queued_at.elapsed().as_millis() as u64,
        "Generation batch completed"
    );
    let _ = result_tx.send(Ok(images));
}
