//! Functional tests for the chat-completion enhancement client

use image::RgbImage;
use prompt_image_gateway::backend::chat_backend::ChatCompletionClient;
use prompt_image_gateway::backend::local_backend::{
    Device, InferencePipeline, LocalBackend, PipelineError,
};
use prompt_image_gateway::backend::traits::PromptEnhancer;
use prompt_image_gateway::config::EnhancerConfig;
use prompt_image_gateway::gateway::GenerationEngine;
use prompt_image_gateway::types::ImageSize;
use prompt_image_gateway::FailureKind;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn client_for(base_url: &str) -> ChatCompletionClient {
    ChatCompletionClient::new(&EnhancerConfig {
        base_url: base_url.to_string(),
        ..EnhancerConfig::default()
    })
    .unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_enhance_returns_trimmed_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "stream": false,
            "messages": [{ "role": "system" }, { "role": "user", "content": "a cat" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "\n  A tabby cat on a sunlit windowsill, soft morning light  \n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server.uri()).enhance("a cat", TIMEOUT).await.unwrap();
    assert_eq!(
        result.enhanced_prompt,
        "A tabby cat on a sunlit windowsill, soft morning light"
    );
}

#[tokio::test]
async fn test_slow_backend_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server.uri())
        .enhance("a cat", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::BackendTimeout);
}

#[tokio::test]
async fn test_error_status_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed at layer 12"))
        .mount(&server)
        .await;

    let err = client_for(&server.uri()).enhance("a cat", TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::BackendUnavailable);
    assert!(err.message.contains("500"));
    assert!(!err.message.contains("layer 12"));
}

#[tokio::test]
async fn test_connection_refused_is_unavailable() {
    // Bind then release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = client_for(&format!("http://127.0.0.1:{}", port))
        .enhance("a cat", TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::BackendUnavailable);
    assert_eq!(err.status_code().as_u16(), 502);
}

#[tokio::test]
async fn test_malformed_bodies_are_protocol_errors() {
    let bodies = [
        ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
        ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })),
        ResponseTemplate::new(200)
            .set_body_json(json!({ "choices": [{ "message": { "role": "assistant" } }] })),
        ResponseTemplate::new(200).set_body_json(completion("   \n\t ")),
    ];

    for template in bodies {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(template).mount(&server).await;

        let err = client_for(&server.uri()).enhance("a cat", TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::BackendProtocolError);
    }
}

#[tokio::test]
async fn test_oversized_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&"x".repeat(4096))))
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&EnhancerConfig {
        base_url: server.uri(),
        max_response_bytes: 1024,
        ..EnhancerConfig::default()
    })
    .unwrap();

    let err = client.enhance("a cat", TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::BackendProtocolError);
}

#[tokio::test]
async fn test_configured_model_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "llama-3-8b", "max_tokens": 128 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("a cat, film grain")))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&EnhancerConfig {
        base_url: server.uri(),
        model: Some("llama-3-8b".to_string()),
        max_tokens: 128,
        ..EnhancerConfig::default()
    })
    .unwrap();

    client.enhance("a cat", TIMEOUT).await.unwrap();
}

/// Holds its blocking thread for a fixed time per pass
struct SlowPipeline(Duration);

impl InferencePipeline for SlowPipeline {
    fn model_id(&self) -> &str {
        "slow"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn run(
        &mut self,
        _prompt: &str,
        width: u32,
        height: u32,
        _index: u32,
    ) -> Result<RgbImage, PipelineError> {
        std::thread::sleep(self.0);
        Ok(RgbImage::new(width, height))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enhance_progresses_during_inference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("enhanced")))
        .mount(&server)
        .await;

    let engine = Arc::new(GenerationEngine::new(Box::new(LocalBackend::new(
        Box::new(SlowPipeline(Duration::from_millis(1500))),
        1,
    ))));
    let generation = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate("a cat", 1, ImageSize::S256).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A hostname, not an IP, so the call needs the resolver as well
    let client = client_for(&format!("http://localhost:{}", server.address().port()));
    let started = Instant::now();
    let result = client.enhance("a cat", Duration::from_millis(500)).await.unwrap();

    assert_eq!(result.enhanced_prompt, "enhanced");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!generation.is_finished());

    assert_eq!(generation.await.unwrap().unwrap().len(), 1);
}
