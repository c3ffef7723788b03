//! In-process image generation backend
//!
//! Wraps a loaded [`InferencePipeline`] and runs each pass on tokio's
//! blocking pool so the request-handling threads keep serving while a pass
//! is computed. The number of passes occupying blocking threads is bounded by
//! a semaphore owned by the backend; the pool itself is left unbounded
//! because the HTTP clients resolve hostnames on it.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::backend::traits::{ImageBackend, RenderRequest};
use crate::config::{DeviceSelection, GenerationConfig};
use crate::error::{AppError, Failure, Result};
use crate::response::png;

/// Model id of the built-in pipeline
pub const PROCEDURAL_MODEL_ID: &str = "procedural";

/// Device a pipeline is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Accelerator => f.write_str("accelerator"),
        }
    }
}

/// Resolve the configured device against what the pipeline can use
pub fn resolve_device(requested: DeviceSelection, accelerator_available: bool) -> Result<Device> {
    match (requested, accelerator_available) {
        (DeviceSelection::Cpu, _) => Ok(Device::Cpu),
        (DeviceSelection::Auto, true) | (DeviceSelection::Accelerator, true) => {
            Ok(Device::Accelerator)
        }
        (DeviceSelection::Auto, false) => Ok(Device::Cpu),
        (DeviceSelection::Accelerator, false) => Err(AppError::Device(
            "an accelerator was requested but none is available".to_string(),
        )),
    }
}

/// Runtime failure inside a pipeline pass
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A loaded text-to-image model.
///
/// `run` blocks for the whole pass and is only ever called from the
/// blocking pool, one pass at a time.
pub trait InferencePipeline: Send {
    fn model_id(&self) -> &str;

    fn device(&self) -> Device;

    /// Produce one `width` x `height` raster for `prompt`
    fn run(
        &mut self,
        prompt: &str,
        width: u32,
        height: u32,
        index: u32,
    ) -> std::result::Result<RgbImage, PipelineError>;
}

/// Deterministic CPU pipeline.
///
/// Renders a prompt-seeded gradient field refined over `steps` iterations.
/// Useful where no model weights are deployed; same prompt and batch
/// position always yield the same image.
pub struct ProceduralPipeline {
    device: Device,
    steps: u32,
}

impl ProceduralPipeline {
    pub fn load(config: &GenerationConfig) -> Result<Self> {
        let device = resolve_device(config.device, false)?;
        Ok(Self {
            device,
            steps: config.inference_steps,
        })
    }
}

/// FNV-1a; stable across processes, unlike `DefaultHasher`
fn prompt_seed(prompt: &str, index: u32) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in prompt.as_bytes().iter().chain(index.to_le_bytes().iter()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl InferencePipeline for ProceduralPipeline {
    fn model_id(&self) -> &str {
        PROCEDURAL_MODEL_ID
    }

    fn device(&self) -> Device {
        self.device
    }

    fn run(
        &mut self,
        prompt: &str,
        width: u32,
        height: u32,
        index: u32,
    ) -> std::result::Result<RgbImage, PipelineError> {
        let mut rng = StdRng::seed_from_u64(prompt_seed(prompt, index));
        let from: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];
        let to: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];

        // Each step adds one soft blob; more steps, more structure
        let blobs: Vec<(f32, f32, f32, [f32; 3])> = (0..self.steps.min(64))
            .map(|_| {
                (
                    rng.gen::<f32>() * width as f32,
                    rng.gen::<f32>() * height as f32,
                    rng.gen_range(0.05..0.35) * width.max(height) as f32,
                    [rng.gen(), rng.gen(), rng.gen()],
                )
            })
            .collect();

        let span = (width + height).max(1) as f32;
        let raster = RgbImage::from_fn(width, height, |x, y| {
            let t = (x + y) as f32 / span;
            let mut pixel = [0f32; 3];
            for (c, value) in pixel.iter_mut().enumerate() {
                *value = from[c] * (1.0 - t) + to[c] * t;
            }
            for (bx, by, radius, colour) in &blobs {
                let dx = x as f32 - bx;
                let dy = y as f32 - by;
                let weight = (-(dx * dx + dy * dy) / (radius * radius)).exp() * 0.5;
                for (c, value) in pixel.iter_mut().enumerate() {
                    *value = *value * (1.0 - weight) + colour[c] * weight;
                }
            }
            Rgb(pixel.map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8))
        });

        Ok(raster)
    }
}

/// Load the in-process pipeline named by `model_id`
pub fn load_pipeline(config: &GenerationConfig) -> Result<Box<dyn InferencePipeline>> {
    match config.model_id.as_str() {
        PROCEDURAL_MODEL_ID => Ok(Box::new(ProceduralPipeline::load(config)?)),
        other => Err(AppError::PipelineLoad(format!(
            "no in-process pipeline is registered for model '{}'",
            other
        ))),
    }
}

/// Image generation against a pipeline owned by this process
pub struct LocalBackend {
    name: String,
    device: Device,
    pipeline: Arc<Mutex<Box<dyn InferencePipeline>>>,
    pass_permits: Arc<Semaphore>,
}

impl LocalBackend {
    /// `max_passes` bounds how many passes may hold a blocking thread at once
    pub fn new(pipeline: Box<dyn InferencePipeline>, max_passes: usize) -> Self {
        let name = pipeline.model_id().to_string();
        let device = pipeline.device();
        info!(model = %name, device = %device, max_passes, "In-process pipeline ready");

        Self {
            name,
            device,
            pipeline: Arc::new(Mutex::new(pipeline)),
            pass_permits: Arc::new(Semaphore::new(max_passes.max(1))),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

#[async_trait]
impl ImageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        "in_process"
    }

    async fn render(&self, request: &RenderRequest) -> std::result::Result<Vec<u8>, Failure> {
        let pipeline = Arc::clone(&self.pipeline);
        let prompt = request.prompt.clone();
        let index = request.index;
        let (width, height) = request.size.dimensions();
        let started = Instant::now();

        let permit = Arc::clone(&self.pass_permits)
            .acquire_owned()
            .await
            .map_err(|_| Failure::internal("The in-process pipeline is shutting down."))?;

        let outcome = tokio::task::spawn_blocking(move || {
            // Held until the pass ends, even if the caller stops waiting
            let _permit = permit;
            let mut pipeline = pipeline.lock();
            let raster = pipeline.run(&prompt, width, height, index)?;
            if raster.dimensions() != (width, height) {
                return Err(PipelineError::Runtime(format!(
                    "pipeline produced {:?} for a {}x{} pass",
                    raster.dimensions(),
                    width,
                    height
                )));
            }
            Ok(png::encode_rgb(&raster)?)
        })
        .await;

        match outcome {
            Ok(Ok(bytes)) => {
                debug!(
                    backend = %self.name,
                    index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Inference pass completed"
                );
                Ok(bytes)
            }
            Ok(Err(e)) => {
                error!(backend = %self.name, index, error = %e, "Inference pass failed");
                Err(Failure::internal(
                    "Image generation failed in the in-process pipeline.",
                ))
            }
            Err(join_error) => {
                error!(
                    backend = %self.name,
                    index,
                    error = %join_error,
                    "Inference pass aborted"
                );
                Err(Failure::internal(
                    "Image generation was aborted in the in-process pipeline.",
                ))
            }
        }
    }
}
