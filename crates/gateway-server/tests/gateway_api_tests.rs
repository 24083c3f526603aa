use actix_web::{test, web, App};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway_core::Role;
use gateway_server::config::{GatewayConfig, UpstreamConfig};
use gateway_server::server::configure;
use gateway_server::state::AppState;

const STREAM_PATH: &str = "/models/gemini-test:streamGenerateContent";

const HELLO_BODY: &str = concat!(
    r#"[{"candidates":[{"content":{"parts":[{"text":"Hel"#,
    r#"lo"}],"role":"model"}}],"usageMetadata":{"totalTokenCount":12}}]"#,
);

fn config_for(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        health_check_interval_ms: 0,
        upstream: UpstreamConfig {
            base_url: server.uri(),
            model: "gemini-test".to_string(),
            api_key: Some("test-key".to_string()),
        },
        ..GatewayConfig::default()
    }
}

fn sse_events(body: &[u8]) -> Vec<Value> {
    std::str::from_utf8(body)
        .unwrap()
        .split("\n\n")
        .filter_map(|block| block.strip_prefix("data: "))
        .map(|json| serde_json::from_str(json).unwrap())
        .collect()
}

macro_rules! gateway_app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state.clone()).configure(configure)).await
    };
}

#[actix_web::test]
async fn streams_text_and_records_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HELLO_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "Say hello", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-cache");

    let body = test::read_body(resp).await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], json!({ "id": 1, "type": "text", "data": "Hello" }));
    assert_eq!(events[1]["id"], "done");
    assert_eq!(events[1]["data"]["tokens"], 12);
    assert_eq!(events[1]["data"]["budget"]["tokens"], 12);

    assert_eq!(state.ledger.session_stats("s1").tokens, 12);
    assert_eq!(state.ledger.global_stats().tokens, 12);

    let context = state.context.get_context("s1");
    assert_eq!(context.len(), 2);
    assert_eq!(context[0].role, Role::User);
    assert_eq!(context[0].content, "Say hello");
    assert_eq!(context[1].role, Role::Assistant);
    assert_eq!(context[1].content, "Hello");
}

#[actix_web::test]
async fn follow_up_request_carries_rolling_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(HELLO_BODY))
        .expect(2)
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    for message in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/gateway")
            .set_json(json!({ "message": message, "sessionId": "s2" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        test::read_body(resp).await;
    }

    let requests: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == STREAM_PATH)
        .collect();
    assert_eq!(requests.len(), 2);
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let contents = second["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "second");
    assert_eq!(state.ledger.session_stats("s2").tokens, 24);
}

#[actix_web::test]
async fn missing_session_id_gets_generated_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(HELLO_BODY))
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    test::read_body(resp).await;

    assert_eq!(state.ledger.session_count(), 1);
    assert_eq!(state.ledger.global_stats().tokens, 12);
}

#[actix_web::test]
async fn missing_message_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(state.ledger.session_count(), 0);
}

#[actix_web::test]
async fn unconfigured_upstream_emits_error_event() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.upstream.api_key = None;

    let state = web::Data::new(AppState::new(config));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body = test::read_body(resp).await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(events[0]["details"]["kind"], "unconfigured");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[actix_web::test]
async fn over_budget_request_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(HELLO_BODY))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.session_token_limit = 2;
    let state = web::Data::new(AppState::new(config));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "this message is far beyond two tokens", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 429);
    let body = test::read_body(resp).await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(events[0]["details"]["kind"], "budget_exceeded");
    assert_eq!(events[0]["details"]["session"]["limit"], 2);
    assert_eq!(events[0]["details"]["global"]["tokens"], 0);
    assert!(state.context.get_context("s1").is_empty());
}

#[actix_web::test]
async fn breaker_opens_after_repeated_upstream_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(5)
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    for _ in 0..5 {
        let req = test::TestRequest::post()
            .uri("/api/v1/gateway")
            .set_json(json!({ "message": "hi", "sessionId": "s1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);
        test::read_body(resp).await;
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 503);
    let body = test::read_body(resp).await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["details"]["kind"], "circuit_open");
    assert_eq!(events[0]["details"]["circuitBreaker"]["state"], "open");
    assert!(events[0]["details"]["retryAfterMs"].as_u64().unwrap() > 0);

    // The sixth call never reached the upstream.
    server.verify().await;
}

#[actix_web::test]
async fn repeated_error_objects_in_body_open_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}]"#,
        ))
        .expect(5)
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    for _ in 0..5 {
        let req = test::TestRequest::post()
            .uri("/api/v1/gateway")
            .set_json(json!({ "message": "hi", "sessionId": "s1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        test::read_body(resp).await;
    }
    assert_eq!(state.breaker.stats().consecutive_failures, 5);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 503);
    test::read_body(resp).await;
    server.verify().await;
}

#[actix_web::test]
async fn upstream_error_object_mid_stream_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"error":{"code":503,"message":"The model is overloaded","status":"UNAVAILABLE"}}]"#,
        ))
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(state.breaker.stats().total_failures, 1);
    // The user turn survives the failed generation.
    assert_eq!(state.context.get_context("s1").len(), 1);
}

#[actix_web::test]
async fn preflight_has_no_body() {
    let server = MockServer::start().await;
    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/v1/gateway")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
async fn monitoring_snapshot_reports_components() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(HELLO_BODY))
        .mount(&server)
        .await;

    let state = web::Data::new(AppState::new(config_for(&server)));
    let app = gateway_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/gateway")
        .set_json(json!({ "message": "hi", "sessionId": "s1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    test::read_body(resp).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/gateway?sessionId=s1")
        .to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;

    for key in ["timestamp", "health", "circuitBreaker", "context", "budget", "uptime"] {
        assert!(snapshot.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(snapshot["circuitBreaker"]["state"], "closed");
    assert_eq!(snapshot["budget"]["global"]["tokens"], 12);
    assert_eq!(snapshot["budget"]["sessionCount"], 1);
    assert_eq!(snapshot["budget"]["session"]["tokens"], 12);
    assert_eq!(snapshot["context"]["entries"], 2);

    let req = test::TestRequest::get()
        .uri("/api/v1/gateway?sessionId=unknown")
        .to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert!(snapshot["budget"]["session"].is_null());
    assert_eq!(state.ledger.session_count(), 1);
}

#[actix_web::test]
async fn delete_clears_session_context() {
    let server = MockServer::start().await;
    let state = web::Data::new(AppState::new(config_for(&server)));
    state
        .context
        .add_to_context("s1", gateway_core::ContextEntry::user("remember me"));
    let app = gateway_app!(state);

    let req = test::TestRequest::delete()
        .uri("/api/v1/gateway/sessions/s1/context")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 204);
    assert!(state.context.get_context("s1").is_empty());
}
