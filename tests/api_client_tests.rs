//! Integration tests for the HTTP clients against a mock backend

use glimpse::api::{
    ApiError, CompletionClient, CompletionOptions, ImageSearchClient, DEFAULT_MODEL,
};
use glimpse::onboarding::{OnboardingClient, OnboardingForm};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": chunk}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn completion_json(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"content": content}}]})
}

#[tokio::test]
async fn test_streamed_completion_delivers_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["Hel", "lo"]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = CompletionClient::new(format!("{}/chat", server.uri()), "test-key");
    let options = CompletionOptions::chat(DEFAULT_MODEL);
    let turns = vec![json!({"role": "user", "content": "hi"})];

    let mut seen: Vec<String> = Vec::new();
    let mut collect = |chunk: &str| seen.push(chunk.to_string());
    let full = client
        .send(&options, &turns, Some(&mut collect))
        .await
        .unwrap();

    assert_eq!(seen, vec!["Hel", "lo"]);
    assert_eq!(full, "Hello");
}

#[tokio::test]
async fn test_unavailable_model_falls_back_to_next() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({"model": DEFAULT_MODEL})))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": {"message": "No endpoints found"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({"model": "anthropic/claude-3-haiku"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("fallback reply")))
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(format!("{}/chat", server.uri()), "test-key");
    let options = CompletionOptions::internal(DEFAULT_MODEL, 100);
    let turns = vec![json!({"role": "user", "content": "hi"})];

    let reply = client.send(&options, &turns, None).await.unwrap();
    assert_eq!(reply, "fallback reply");
}

#[tokio::test]
async fn test_non_provider_error_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "bad request"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(format!("{}/chat", server.uri()), "test-key");
    let options = CompletionOptions::internal(DEFAULT_MODEL, 100);
    let turns = vec![json!({"role": "user", "content": "hi"})];

    let err = client.send(&options, &turns, None).await.unwrap_err();
    assert!(err.to_string().contains("bad request"));
}

#[tokio::test]
async fn test_image_search_sends_query_and_clamps_per_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images"))
        .and(header("authorization", "px-key"))
        .and(query_param("query", "cats"))
        .and(query_param("per_page", "6"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"photos": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ImageSearchClient::new(format!("{}/images", server.uri()), "px-key");
    // 40 exceeds the backend maximum and must be clamped
    let photos = client.search("cats", 40, 2).await.unwrap();
    assert!(photos.is_empty());
}

#[tokio::test]
async fn test_image_search_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = ImageSearchClient::new(format!("{}/images", server.uri()), "px-key");
    let err = client.search("cats", 3, 1).await.unwrap_err();
    match err {
        ApiError::Status { status, .. } => assert_eq!(status, 429),
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_onboarding_posts_form_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/welcome"))
        .and(body_partial_json(json!({
            "name": "Dana",
            "country": "Jordan",
            "email": "dana@example.com",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = OnboardingClient::new(Some(format!("{}/welcome", server.uri())));
    let form = OnboardingForm {
        name: "Dana".to_string(),
        country: "Jordan".to_string(),
        email: "dana@example.com".to_string(),
    };
    client.submit(&form).await.unwrap();
}

#[tokio::test]
async fn test_onboarding_rejection_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/welcome"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = OnboardingClient::new(Some(format!("{}/welcome", server.uri())));
    let form = OnboardingForm {
        name: "Dana".to_string(),
        country: "Jordan".to_string(),
        email: "dana@example.com".to_string(),
    };
    let err = client.submit(&form).await.unwrap_err();
    match err {
        ApiError::Status { status, .. } => assert_eq!(status, 503),
        other => panic!("expected status error, got {:?}", other),
    }
}
