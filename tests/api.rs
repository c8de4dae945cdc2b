//! End-to-end tests for the gateway routes, with upstream providers stubbed
//! by wiremock and an in-memory record store.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use koby_gateway::build_router;
use koby_gateway::rate_limit::RateLimiter;
use koby_gateway::state::AppState;
use koby_gateway::store::RecordStore;
use koby_gateway::upstream::{ElevenLabsClient, GeminiClient};
use koby_gateway::webhook::sign;

const WEBHOOK_SECRET: &str = "whsec_integration";
const TOOL_SECRET: &str = "tool-secret";

struct Harness {
    app: Router,
    state: Arc<AppState>,
}

async fn harness(gemini: Option<&MockServer>, elevenlabs: Option<&MockServer>) -> Harness {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let store = RecordStore::connect("sqlite::memory:").await.unwrap();

    let state = Arc::new(AppState {
        gemini: gemini.map(|s| GeminiClient::new(client.clone(), "gemini-key", "test-model", s.uri())),
        elevenlabs: elevenlabs.map(|s| ElevenLabsClient::new(client.clone(), "xi-key", s.uri())),
        store,
        limiter: Arc::new(RateLimiter::new(20, Duration::from_secs(60))),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        tool_secret: Some(TOOL_SECRET.to_string()),
        default_agent_id: None,
        default_voice_id: "voice_default".to_string(),
    });
    let app = build_router(state.clone(), &["https://koby.ai".to_string()]);
    Harness { app, state }
}

async fn gemini_replying(text: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })))
        .mount(&server)
        .await;
    server
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn chat_request(ip: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/demo-chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/elevenlabs")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header("ElevenLabs-Signature", sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed(body: &str) -> String {
    let t = Utc::now().timestamp();
    format!("t={},v0={}", t, sign(WEBHOOK_SECRET, t, body.as_bytes()).unwrap())
}

fn post_call_body(conversation_id: &str, summary: &str) -> String {
    json!({
        "type": "post_call_transcription",
        "event_timestamp": 1_739_537_297,
        "data": {
            "agent_id": "agent_midvalley",
            "conversation_id": conversation_id,
            "status": "done",
            "transcript": [
                { "role": "agent", "message": "Midvalley Plumbing, how can I help?" },
                { "role": "user", "message": "My boiler is leaking." }
            ],
            "metadata": { "call_duration_secs": 63 },
            "analysis": { "transcript_summary": summary, "call_successful": "success" }
        }
    })
    .to_string()
}

#[tokio::test]
async fn demo_chat_first_call_succeeds_with_quota_header() {
    let gemini = gemini_replying("We're open 9am to 5pm, Monday to Friday.").await;
    let h = harness(Some(&gemini), None).await;

    let (status, headers, body) = send(
        &h.app,
        chat_request("203.0.113.10", json!({ "message": "What are your hours?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-ratelimit-remaining"], "19");
    let body = json_body(&body);
    assert!(!body["response"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn demo_chat_21st_call_is_rate_limited() {
    let gemini = gemini_replying("Sure.").await;
    let h = harness(Some(&gemini), None).await;

    for n in 1..=20u32 {
        let (status, headers, _) =
            send(&h.app, chat_request("198.51.100.7", json!({ "message": "hi" }))).await;
        assert_eq!(status, StatusCode::OK, "call {n}");
        assert_eq!(headers["x-ratelimit-remaining"], (20 - n).to_string().as_str());
    }

    let (status, headers, body) =
        send(&h.app, chat_request("198.51.100.7", json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "60");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert!(json_body(&body)["error"].is_string());

    // another client still has its own quota
    let (status, _, _) =
        send(&h.app, chat_request("198.51.100.8", json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn demo_chat_without_api_key_is_unavailable() {
    let h = harness(None, None).await;

    let (status, headers, body) =
        send(&h.app, chat_request("203.0.113.11", json!({ "message": "hello" }))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(headers["x-ratelimit-remaining"], "19");
    assert_eq!(json_body(&body)["error"], "Service temporarily unavailable");
}

#[tokio::test]
async fn demo_chat_rejects_bad_input() {
    let gemini = gemini_replying("unused").await;
    let h = harness(Some(&gemini), None).await;

    let cases = [
        json!({ "message": "   " }),
        json!({ "message": "a".repeat(2001) }),
        json!({ "message": "hi", "mode": "sales" }),
        json!({ "mode": "chat" }),
        json!({ "message": 42 }),
    ];
    for case in cases {
        let (status, _, body) = send(&h.app, chat_request("203.0.113.12", case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {case}");
        assert!(json_body(&body)["error"].is_string());
    }

    assert!(gemini.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn demo_chat_accepts_each_mode() {
    let gemini = gemini_replying("ok").await;
    let h = harness(Some(&gemini), None).await;

    for mode in ["chat", "voice", "pannudental", "invoice"] {
        let (status, _, _) = send(
            &h.app,
            chat_request("203.0.113.13", json!({ "message": "hi", "mode": mode })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "mode {mode}");
    }
}

#[tokio::test]
async fn demo_chat_upstream_failure_is_bad_gateway() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exhausted for key AIza-secret"))
        .mount(&gemini)
        .await;
    let h = harness(Some(&gemini), None).await;

    let (status, _, body) =
        send(&h.app, chat_request("203.0.113.14", json!({ "message": "hi" }))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains("AIza-secret"));
}

#[tokio::test]
async fn demo_chat_malformed_upstream_is_internal_error() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&gemini)
        .await;
    let h = harness(Some(&gemini), None).await;

    let (status, _, _) =
        send(&h.app, chat_request("203.0.113.15", json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn webhook_tampered_signature_is_rejected() {
    let h = harness(None, None).await;
    let body = post_call_body("conv_tampered", "Leak reported");
    let t = Utc::now().timestamp();
    let forged = format!("t={},v0={}", t, "0".repeat(64));

    let (status, _, resp) = send(&h.app, webhook_request(&body, Some(forged))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&resp), json!({ "error": "Signature mismatch" }));
    assert_eq!(h.state.store.count_calls().await.unwrap(), 0);
}

#[tokio::test]
async fn webhook_body_changed_after_signing_is_rejected() {
    let h = harness(None, None).await;
    let body = post_call_body("conv_1", "Leak reported");
    let signature = signed(&body);
    let altered = body.replace("Leak reported", "Leak reported!");

    let (status, _, resp) = send(&h.app, webhook_request(&altered, Some(signature))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&resp)["error"], "Signature mismatch");
}

#[tokio::test]
async fn webhook_missing_signature_is_rejected() {
    let h = harness(None, None).await;
    let body = post_call_body("conv_1", "x");

    let (status, _, resp) = send(&h.app, webhook_request(&body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&resp)["error"], "Missing signature header");
}

#[tokio::test]
async fn webhook_stale_signature_is_rejected() {
    let h = harness(None, None).await;
    let body = post_call_body("conv_1", "x");
    let t = Utc::now().timestamp() - 31 * 60;
    let stale = format!("t={},v0={}", t, sign(WEBHOOK_SECRET, t, body.as_bytes()).unwrap());

    let (status, _, resp) = send(&h.app, webhook_request(&body, Some(stale))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&resp)["error"], "Timestamp outside tolerance");
}

#[tokio::test]
async fn webhook_other_event_type_is_ignored() {
    let h = harness(None, None).await;
    let body = json!({
        "type": "post_call_audio",
        "data": { "conversation_id": "conv_audio" }
    })
    .to_string();

    let (status, _, resp) = send(&h.app, webhook_request(&body, Some(signed(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    let resp = json_body(&resp);
    assert_eq!(resp["status"], "ignored");
    assert_eq!(resp["type"], "post_call_audio");
    assert_eq!(h.state.store.count_calls().await.unwrap(), 0);
}

#[tokio::test]
async fn webhook_redelivery_keeps_one_record() {
    let h = harness(None, None).await;

    let first = post_call_body("conv_42", "Boiler leak, visit booked");
    let (status, _, resp) = send(&h.app, webhook_request(&first, Some(signed(&first)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&resp), json!({ "status": "stored", "conversation_id": "conv_42" }));

    let second = post_call_body("conv_42", "Boiler leak, visit moved to Friday");
    let (status, _, _) = send(&h.app, webhook_request(&second, Some(signed(&second)))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(h.state.store.count_calls().await.unwrap(), 1);
    let stored = h.state.store.get_call("conv_42").await.unwrap().unwrap();
    assert_eq!(stored.summary.as_deref(), Some("Boiler leak, visit moved to Friday"));
    assert_eq!(stored.duration_secs, Some(63));
    assert_eq!(stored.agent_id.as_deref(), Some("agent_midvalley"));
}

#[tokio::test]
async fn webhook_without_secret_is_unavailable() {
    let store = RecordStore::connect("sqlite::memory:").await.unwrap();
    let state = Arc::new(AppState {
        gemini: None,
        elevenlabs: None,
        store,
        limiter: Arc::new(RateLimiter::new(20, Duration::from_secs(60))),
        webhook_secret: None,
        tool_secret: None,
        default_agent_id: None,
        default_voice_id: "voice_default".to_string(),
    });
    let app = build_router(state, &[]);
    let body = post_call_body("conv_1", "x");

    let (status, _, _) = send(&app, webhook_request(&body, Some(signed(&body)))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn signed_url_is_relayed() {
    let elevenlabs = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/convai/conversation/get-signed-url"))
        .and(query_param("agent_id", "agent_demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signed_url": "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_demo&token=t"
        })))
        .mount(&elevenlabs)
        .await;
    let h = harness(None, Some(&elevenlabs)).await;

    let req = Request::builder()
        .uri("/api/signed-url?agent_id=agent_demo")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json_body(&body)["signed_url"].as_str().unwrap().starts_with("wss://"));
}

#[tokio::test]
async fn signed_url_requires_agent_and_key() {
    let h = harness(None, None).await;

    let req = Request::builder().uri("/api/signed-url").body(Body::empty()).unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .uri("/api/signed-url?agent_id=agent_demo")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn tts_returns_audio() {
    let elevenlabs = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/text-to-speech/voice_default$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0x49, 0x44, 0x33]),
        )
        .mount(&elevenlabs)
        .await;
    let h = harness(None, Some(&elevenlabs)).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/tts")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-real-ip", "192.0.2.50")
        .body(Body::from(json!({ "text": "Welcome to Koby AI" }).to_string()))
        .unwrap();
    let (status, headers, body) = send(&h.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers["x-ratelimit-remaining"], "19");
    assert_eq!(body, vec![0x49, 0x44, 0x33]);
}

#[tokio::test]
async fn service_request_requires_bearer_token() {
    let h = harness(None, None).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/tools/service-request")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::from(
            json!({ "customer_name": "Jane", "phone": "5550102030", "service_type": "repair" })
                .to_string(),
        ))
        .unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn service_request_is_stored_with_ticket() {
    let h = harness(None, None).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/tools/service-request")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOOL_SECRET}"))
        .body(Body::from(
            json!({
                "customer_name": " Sam  Patel ",
                "phone": "(555) 010-7788",
                "service_type": "Water Heater",
                "email": "Sam@Example.com",
                "preferred_time": "Thursday afternoon"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["success"], true);
    let ticket = body["ticket_id"].as_str().unwrap();
    assert!(ticket.starts_with("MV-"));
    assert!(body["message"].as_str().unwrap().contains("Sam"));

    let session = h.state.store.get_session(ticket).await.unwrap().unwrap();
    assert_eq!(session.customer_name, "Sam Patel");
    assert_eq!(session.phone, "5550107788");
    assert_eq!(session.service_type, "water_heater");
    assert_eq!(session.email.as_deref(), Some("sam@example.com"));
}

#[tokio::test]
async fn health_and_metrics() {
    let h = harness(None, None).await;

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "healthy");

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("koby_requests_total"));
}

#[tokio::test]
async fn metrics_track_rate_limit_entries_between_sweeps() {
    let h = harness(None, None).await;
    send(&h.app, chat_request("192.0.2.77", json!({ "message": "hi" }))).await;
    assert_eq!(h.state.limiter.len(), 1);

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (_, _, body) = send(&h.app, req).await;
    let text = String::from_utf8(body).unwrap();
    let value: f64 = text
        .lines()
        .find_map(|line| line.strip_prefix("koby_rate_limit_entries "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(value >= 1.0);
}

#[tokio::test]
async fn cors_allows_configured_origin_only() {
    let h = harness(None, None).await;

    let preflight = |origin: &str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/demo-chat")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let (_, headers, _) = send(&h.app, preflight("https://koby.ai")).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://koby.ai");

    let (_, headers, _) = send(&h.app, preflight("https://evil.example")).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
