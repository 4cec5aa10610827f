//! Gemini client behavior against a wiremock backend.

use futures::StreamExt;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_session::mocks::MockHttpTransport;
use chat_session::{
    ChatConfig, ChatError, Capability, GeminiChatHandle, GeminiClient, ModelClient, Turn,
};

fn config(server: &MockServer, streaming: bool) -> ChatConfig {
    ChatConfig::builder()
        .api_key(SecretString::new("test-key".into()))
        .model("gemini-2.0-pro")
        .streaming(streaming)
        .base_url(&server.uri())
        .unwrap()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn scripted_config(streaming: bool) -> ChatConfig {
    ChatConfig::builder()
        .api_key(SecretString::new("test-key".into()))
        .model("gemini-2.0-pro")
        .streaming(streaming)
        .build()
        .unwrap()
}

fn reply_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_generate_sends_expected_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-pro:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Capital of France?"}]}],
            "systemInstruction": {"parts": [{"text": "Be terse."}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Paris.")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, false)).unwrap();
    let history = vec![Turn::system("Be terse."), Turn::user("Capital of France?")];
    let reply = client.generate(&history).await.unwrap();
    assert_eq!(reply, "Paris.");
}

#[tokio::test]
async fn test_streaming_yields_ordered_fragments() {
    let server = MockServer::start().await;

    let body = concat!(
        r#"[{"candidates": [{"content": {"parts": [{"text": "The weather "}]}}]},"#,
        r#"{"candidates": [{"content": {"parts": [{"text": "is "}]}}]},"#,
        r#"{"candidates": [{"content": {"parts": [{"text": "sunny."}]}}]}]"#,
    );
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-pro:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, true)).unwrap();
    assert_eq!(client.capability(), Capability::Streaming);

    let mut stream = client.generate_stream(&[Turn::user("Weather?")]).await.unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }

    let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(joined, "The weather is sunny.");
    assert!(fragments.last().unwrap().is_last);
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "API key not valid", "code": 401}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, false)).unwrap();
    let err = client.generate(&[Turn::user("hi")]).await.unwrap_err();
    match err {
        ChatError::Authentication { message } => assert_eq!(message, "API key not valid"),
        other => panic!("expected authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(json!({"error": {"message": "Quota exceeded"}})),
        )
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, false)).unwrap();
    let err = client.generate(&[Turn::user("hi")]).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_missing_model_maps_to_model_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "model not found"}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, false)).unwrap();
    let err = client.generate(&[Turn::user("hi")]).await.unwrap_err();
    match err {
        ChatError::ModelUnavailable { model, .. } => assert_eq!(model, "gemini-2.0-pro"),
        other => panic!("expected model unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_body_maps_to_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(config(&server, false)).unwrap();
    let err = client.generate(&[Turn::user("hi")]).await.unwrap_err();
    assert!(matches!(err, ChatError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_chat_handle_sends_only_new_message_with_mirror() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Blue.")))
        .mount(&server)
        .await;

    let handle = GeminiChatHandle::new(config(&server, false)).unwrap();
    let mut history = vec![Turn::system("Be terse."), Turn::user("Sky color?")];
    handle.generate(&history).await.unwrap();

    history.push(Turn::assistant("Blue."));
    history.push(Turn::user("And grass?"));
    handle.generate(&history).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let contents = second["contents"].as_array().unwrap();
    // user, model (handle's own mirror), user; the caller's full history is
    // not replayed verbatim.
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "And grass?");
}

#[tokio::test]
async fn test_chat_handle_streams_against_its_mirror() {
    let transport = Arc::new(MockHttpTransport::new());
    let first = concat!(
        r#"[{"candidates": [{"content": {"parts": [{"text": "Blue "}]}}]},"#,
        r#"{"candidates": [{"content": {"parts": [{"text": "mostly."}]}}]}]"#,
    );
    transport.push_stream(200, &[first.as_bytes()]);
    let second = r#"[{"candidates": [{"content": {"parts": [{"text": "Green."}]}}]}]"#;
    transport.push_stream(200, &[second.as_bytes()]);

    let handle = GeminiChatHandle::with_transport(scripted_config(true), transport.clone());
    assert_eq!(handle.capability(), Capability::Streaming);

    let mut history = vec![Turn::system("Be terse."), Turn::user("Sky color?")];
    let mut stream = handle.generate_stream(&history).await.unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(joined, "Blue mostly.");
    assert!(fragments.last().unwrap().is_last);

    history.push(Turn::assistant("Blue mostly."));
    history.push(Turn::user("And grass?"));
    let mut stream = handle.generate_stream(&history).await.unwrap();
    while let Some(item) = stream.next().await {
        item.unwrap();
    }

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].path.ends_with(":streamGenerateContent"));
    let body: serde_json::Value =
        serde_json::from_slice(requests[1].body.as_ref().unwrap()).unwrap();
    let contents = body["contents"].as_array().unwrap();
    // user, model (assembled from the first stream), user.
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Blue mostly.");
    assert_eq!(contents[2]["parts"][0]["text"], "And grass?");
}

#[tokio::test]
async fn test_fragment_split_mid_code_point_reassembles_exactly() {
    let transport = Arc::new(MockHttpTransport::new());
    let body = r#"[{"candidates": [{"content": {"parts": [{"text": "héllo"}]}}]}]"#.as_bytes();
    // Split between the two bytes of 'é'.
    let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
    transport.push_stream(200, &[&body[..split], &body[split..]]);

    let client = GeminiClient::with_transport(scripted_config(true), transport);
    let mut stream = client.generate_stream(&[Turn::user("hi")]).await.unwrap();
    let mut joined = String::new();
    while let Some(item) = stream.next().await {
        joined.push_str(&item.unwrap().text);
    }
    assert_eq!(joined, "héllo");
}
