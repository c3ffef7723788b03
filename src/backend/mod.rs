//! Backend module - enhancement client, generation transports, and their traits

pub mod chat_backend;
pub mod http_backend;
pub mod local_backend;
pub mod traits;

use tracing::info;

use crate::config::{GenerationConfig, Transport};
use crate::error::{AppError, Result};
use traits::ImageBackend;

/// Build the generation backend selected by configuration.
///
/// Called once at startup; loading a pipeline may block for a long time, so
/// it runs on the blocking pool.
pub async fn build_image_backend(config: &GenerationConfig) -> Result<Box<dyn ImageBackend>> {
    info!(transport = ?config.transport, model = %config.model_id, "Loading generation backend");

    match config.transport {
        Transport::Http => Ok(Box::new(http_backend::HttpBackend::new(config)?)),
        Transport::InProcess => {
            let max_passes = config.worker_threads;
            let config = config.clone();
            let pipeline = tokio::task::spawn_blocking(move || {
                local_backend::load_pipeline(&config)
            })
            .await
            .map_err(|e| AppError::PipelineLoad(format!("pipeline loader aborted: {}", e)))??;

            Ok(Box::new(local_backend::LocalBackend::new(pipeline, max_passes)))
        }
    }
}
