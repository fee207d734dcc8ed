//! Wire-level tests for the provider clients against wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::providers::{CompletionProvider, GeminiClient, OpenAiCompatClient, UpstreamResponse};
use mimir::types::{CompletionRequest, RequestTemplate};
use mimir::MimirError;

fn request(model: &str) -> CompletionRequest {
    RequestTemplate::new("Return JSON.", 200)
        .temperature(0.5)
        .request(model, "Some resume text.")
}

fn openai(server: &MockServer) -> OpenAiCompatClient {
    OpenAiCompatClient::with_base_url("test", "sk-test", server.uri(), Duration::from_secs(5))
        .unwrap()
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::with_base_url("g-test", server.uri(), Duration::from_secs(5)).unwrap()
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

#[tokio::test]
async fn openai_sends_chat_completion_and_normalizes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "Return JSON."},
                {"role": "user", "content": "Some resume text."}
            ],
            "max_tokens": 200,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{\"score\": 72}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai(&server).complete(&request("gpt-4o-mini")).await.unwrap();
    let usage = response.usage().unwrap();
    assert_eq!(usage.prompt_tokens, 30);
    assert_eq!(usage.completion_tokens, 5);
    assert_eq!(response.normalize().unwrap(), "{\"score\": 72}");
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&request("m")).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn payload_too_large_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(413).set_body_string("too big"))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::PayloadTooLarge(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn server_error_body_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "upstream exploded", "code": 500}
        })))
        .mount(&server)
        .await;

    match openai(&server).complete(&request("m")).await.unwrap_err() {
        MimirError::Api { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::Api { status: 502, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn error_object_in_ok_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "Rate limit exceeded", "code": 429}
        })))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::RateLimited { .. }));
}

#[tokio::test]
async fn empty_choices_normalize_to_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let response = openai(&server).complete(&request("m")).await.unwrap();
    let err = response.normalize().unwrap_err();
    assert!(matches!(err, MimirError::MalformedResponse(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unexpected_envelope_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "?"})))
        .mount(&server)
        .await;

    let err = openai(&server).complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::MalformedResponse(_)));
}

#[test]
fn empty_api_key_is_rejected() {
    let err = OpenAiCompatClient::with_base_url("x", "  ", "http://localhost", Duration::from_secs(1))
        .err()
        .unwrap();
    assert!(matches!(err, MimirError::Configuration(_)));
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn gemini_sends_generate_content_and_joins_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Return JSON."}]},
            "contents": [{"role": "user", "parts": [{"text": "Some resume text."}]}],
            "generationConfig": {
                "maxOutputTokens": 200,
                "responseMimeType": "application/json"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"score\":"}, {"text": " 64}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = gemini(&server).complete(&request("gemini-2.0-flash")).await.unwrap();
    assert!(matches!(response, UpstreamResponse::Candidates(_)));
    assert_eq!(response.usage().unwrap().prompt_tokens, 40);
    assert_eq!(response.normalize().unwrap(), "{\"score\": 64}");
}

#[tokio::test]
async fn gemini_resource_exhausted_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let err = gemini(&server).complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::RateLimited { .. }));
}

#[tokio::test]
async fn gemini_blocked_prompt_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let response = gemini(&server).complete(&request("m")).await.unwrap();
    match response.normalize().unwrap_err() {
        MimirError::MalformedResponse(msg) => assert!(msg.contains("SAFETY")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn connection_failure_is_transient_network() {
    let client = OpenAiCompatClient::with_base_url(
        "x",
        "k",
        "http://127.0.0.1:1",
        Duration::from_secs(2),
    )
    .unwrap();
    let err = client.complete(&request("m")).await.unwrap_err();
    assert!(matches!(err, MimirError::TransientNetwork(_)));
}
