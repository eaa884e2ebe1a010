//! `OpenAiClient` against a local HTTP server.

use mockito::{Matcher, Server};
use relay_core::{
    config::LlmConfig,
    errors::Error,
    model::{client::CompletionClient, types::ChatMessage},
};
use relay_openai::OpenAiClient;
use serde_json::json;

fn client_for(base_url: String) -> OpenAiClient {
    let mut cfg = LlmConfig::new("test-key");
    cfg.base_url = base_url;
    OpenAiClient::new(cfg).unwrap()
}

fn question() -> Vec<ChatMessage> {
    vec![ChatMessage::system("be brief"), ChatMessage::user("hi")]
}

#[tokio::test]
async fn success_returns_first_choice() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
            ],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#)
        .create_async()
        .await;

    let reply = client_for(server.url()).complete(&question()).await.unwrap();

    assert_eq!(reply, "Hello!");
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limited_and_server_errors_are_unavailable() {
    for status in [429, 500, 503] {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(status)
            .with_body("try later")
            .create_async()
            .await;

        let err = client_for(server.url())
            .complete(&question())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ModelUnavailable(_)), "{status}: {err}");
    }
}

#[tokio::test]
async fn client_errors_are_model_errors() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(400)
        .with_body(r#"{"error":{"message":"bad model"}}"#)
        .create_async()
        .await;

    let err = client_for(server.url())
        .complete(&question())
        .await
        .unwrap_err();

    match err {
        Error::ModelError(msg) => assert!(msg.contains("bad model"), "{msg}"),
        other => panic!("expected ModelError, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_success_body_is_a_model_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{\"choices\": [")
        .create_async()
        .await;

    let err = client_for(server.url())
        .complete(&question())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ModelError(_)), "{err}");
}

#[tokio::test]
async fn connection_refused_is_unavailable() {
    // Nothing listens on port 1.
    let err = client_for("http://127.0.0.1:1".to_string())
        .complete(&question())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ModelUnavailable(_)), "{err}");
}
