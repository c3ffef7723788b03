//! Request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::models::{
    EnhancePromptBody, EnhancePromptReply, HealthReply, ImageGenerationBody, ImageGenerationReply,
    MetricsReply,
};
use crate::error::Failure;
use crate::types::EnhancementRequest;
use crate::AppState;

const NO_STORE: [(header::HeaderName, &str); 1] = [(header::CACHE_CONTROL, "no-store")];

/// Liveness check
pub async fn health() -> Json<HealthReply> {
    Json(HealthReply {
        status: "healthy".to_string(),
    })
}

/// Request metrics and engine counters
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        NO_STORE,
        Json(MetricsReply {
            requests: state.metrics.snapshot(),
            engine: state.orchestrator.engine().stats(),
        }),
    )
}

/// `POST /v1/prompts/enhance`
pub async fn enhance_prompt(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EnhancePromptBody>, JsonRejection>,
) -> Result<impl IntoResponse, Failure> {
    let Json(body) = body.map_err(rejection_to_failure)?;
    let request = EnhancementRequest::new(body.prompt)?;

    debug!(prompt_chars = request.prompt().chars().count(), "Enhancement request");
    let result = state.orchestrator.enhance(&request).await?;

    Ok((
        NO_STORE,
        Json(EnhancePromptReply {
            enhanced_prompt: result.enhanced_prompt,
        }),
    ))
}

/// `POST /v1/images/generations`
pub async fn generate_images(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ImageGenerationBody>, JsonRejection>,
) -> Result<impl IntoResponse, Failure> {
    let Json(body) = body.map_err(rejection_to_failure)?;
    let request = body.into_request()?;

    info!(
        n = request.count(),
        size = %request.size(),
        use_enhancer = request.use_enhancer(),
        "Image generation request"
    );
    let response = state.orchestrator.fulfil(request).await?;

    Ok((NO_STORE, Json(ImageGenerationReply::from(response))))
}

/// Body extraction failures are all client errors
pub fn rejection_to_failure(rejection: JsonRejection) -> Failure {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Failure::validation("The request body is too large.");
    }

    match rejection {
        JsonRejection::JsonSyntaxError(_) => {
            Failure::validation("The request body is not valid JSON.")
        }
        JsonRejection::MissingJsonContentType(_) => {
            Failure::validation("Expected a request with `Content-Type: application/json`.")
        }
        JsonRejection::JsonDataError(e) => {
            Failure::validation(format!("Invalid request body: {}", e.body_text()))
        }
        other => Failure::validation(format!("Invalid request body: {}", other.body_text())),
    }
}
