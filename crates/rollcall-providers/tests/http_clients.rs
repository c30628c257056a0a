use std::time::Duration;

use rollcall_core::{ProviderConfig, ProviderError};
use rollcall_providers::{
    ChatMessage, CompletionClient, CompletionRequest, EmbeddingClient, EmbeddingProvider,
    TextProvider,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        name: "mock".into(),
        model: "test-model".into(),
        base_url: format!("{}/v1", server.uri()),
        api_key: Some("sk-test".into()),
        api_key_env: None,
    }
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system("extract entities"),
        ChatMessage::user("python developers in chennai"),
    ])
}

#[tokio::test]
async fn completion_returns_message_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"intent\":\"find_peers\"}" } }],
            "usage": { "prompt_tokens": 42, "completion_tokens": 7 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(&provider(&server), Duration::from_secs(5)).unwrap();
    let completion = client.generate(&request()).await.unwrap();
    assert_eq!(completion.text, "{\"intent\":\"find_peers\"}");
    let usage = completion.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 42);
    assert_eq!(usage.completion_tokens, 7);
}

#[tokio::test]
async fn completion_maps_rate_limit_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let client = CompletionClient::new(&provider(&server), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();
    match err {
        ProviderError::RateLimited {
            provider,
            retry_after,
        } => {
            assert_eq!(provider, "mock");
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
        }
        other => panic!("expected rate limit, got {other}"),
    }
}

#[tokio::test]
async fn completion_maps_auth_and_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = CompletionClient::new(&provider(&server), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("invalid api key"));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    let client = CompletionClient::new(&provider(&server), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 503, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn completion_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = CompletionClient::new(&provider(&server), Duration::from_millis(50)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn completion_rejects_unexpected_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = CompletionClient::new(&provider(&server), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse { .. }));
}

#[tokio::test]
async fn embeddings_are_ordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                { "index": 0, "embedding": [1.0, 0.0, 0.0] }
            ]
        })))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&provider(&server), 3, Duration::from_secs(5)).unwrap();
    let vectors = client
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn embeddings_enforce_dimensions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{ "index": 0, "embedding": [0.5, 0.5] }]
        })))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&provider(&server), 3, Duration::from_secs(5)).unwrap();
    let err = client.embed(&["text".to_string()]).await.unwrap_err();
    match err {
        ProviderError::DimensionMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, 3);
            assert_eq!(actual, 2);
        }
        other => panic!("expected dimension mismatch, got {other}"),
    }
}

#[tokio::test]
async fn embeddings_split_into_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0] },
                { "index": 1, "embedding": [1.0] }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&provider(&server), 1, Duration::from_secs(5))
        .unwrap()
        .with_batch_size(2);
    let texts: Vec<String> = (0..4).map(|i| format!("text {i}")).collect();
    let vectors = client.embed(&texts).await.unwrap();
    assert_eq!(vectors.len(), 4);
}
