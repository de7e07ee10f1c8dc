//! Agent gateway contract tests.
//!
//! These verify the exact HTTP boundary with the agent service: request
//! shapes for both submission paths, response decoding including absent
//! optionals, and fail-closed behavior on bad statuses and bodies.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use seva::config::GatewayConfig;
use seva::error::VoiceError;
use seva::gateway::{AgentGateway, HttpAgentGateway};
use seva::Utterance;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> HttpAgentGateway {
    HttpAgentGateway::new(&GatewayConfig {
        base_url: server.uri(),
        timeout_secs: 5,
    })
    .expect("gateway should build")
}

fn audio_utterance() -> Utterance {
    Utterance::Audio {
        bytes: Bytes::from_static(b"RIFF-not-really-wav"),
        mime: "audio/wav".to_owned(),
    }
}

#[tokio::test]
async fn voice_submission_is_multipart_with_one_binary_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-voice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_text": "hello",
            "agent_text": "hi",
            "agent_audio": "",
            "trace": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = gateway_for(&server).send(audio_utterance()).await.unwrap();
    assert_eq!(reply.reply_text, "hi");
    assert_eq!(reply.transcript.as_deref(), Some("hello"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let content_type = requests[0]
        .headers
        .get("content-type")
        .expect("content-type header")
        .to_str()
        .unwrap()
        .to_owned();
    assert!(
        content_type.starts_with("multipart/form-data"),
        "unexpected content type: {content_type}"
    );
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"recording.wav\""));
}

#[tokio::test]
async fn text_submission_sends_one_structured_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-text"))
        .and(body_json(json!({ "text": "renew my licence" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_text": "Certainly.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = gateway_for(&server)
        .send(Utterance::Text("renew my licence".to_owned()))
        .await
        .unwrap();
    assert_eq!(reply.reply_text, "Certainly.");
}

#[tokio::test]
async fn reply_audio_and_trace_are_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-voice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_text": "what documents do I need",
            "agent_text": "Here is your answer",
            "agent_audio": BASE64.encode(b"fake-mp3-payload"),
            "trace": ["Calling Tool: search", "Tool Result: ok", "Final Answer: ..."],
        })))
        .mount(&server)
        .await;

    let reply = gateway_for(&server).send(audio_utterance()).await.unwrap();

    let audio = reply.reply_audio.expect("audio expected");
    assert_eq!(audio.bytes.as_ref(), b"fake-mp3-payload");
    assert_eq!(audio.mime, "audio/mpeg");
    assert_eq!(reply.trace.len(), 3);
    assert_eq!(reply.trace[0], "Calling Tool: search");
}

#[tokio::test]
async fn missing_optionals_are_not_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_text": "",
        })))
        .mount(&server)
        .await;

    let reply = gateway_for(&server)
        .send(Utterance::Text("hello".to_owned()))
        .await
        .unwrap();
    assert_eq!(reply.reply_text, "");
    assert!(reply.reply_audio.is_none());
    assert!(reply.transcript.is_none());
    assert!(reply.trace.is_empty());
}

#[tokio::test]
async fn non_success_status_fails_closed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-voice"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "transcription failed",
        })))
        .mount(&server)
        .await;

    let result = gateway_for(&server).send(audio_utterance()).await;
    assert!(matches!(result, Err(VoiceError::Gateway { .. })));
}

#[tokio::test]
async fn malformed_body_fails_closed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway?</html>"))
        .mount(&server)
        .await;

    let result = gateway_for(&server)
        .send(Utterance::Text("hello".to_owned()))
        .await;
    assert!(matches!(result, Err(VoiceError::Gateway { .. })));
}

#[tokio::test]
async fn missing_required_reply_text_fails_closed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process-text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trace": ["Final Answer: missing text"],
        })))
        .mount(&server)
        .await;

    let result = gateway_for(&server)
        .send(Utterance::Text("hello".to_owned()))
        .await;
    assert!(matches!(result, Err(VoiceError::Gateway { .. })));
}

#[tokio::test]
async fn unreachable_agent_fails_closed() {
    // Bind-and-drop to get a port nothing is listening on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let gateway = HttpAgentGateway::new(&GatewayConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        timeout_secs: 2,
    })
    .unwrap();

    let result = gateway.send(Utterance::Text("hello".to_owned())).await;
    assert!(matches!(result, Err(VoiceError::Gateway { .. })));
}
