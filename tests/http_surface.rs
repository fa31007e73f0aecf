//! End-to-end tests for the HTTP surface, driven through the router with
//! tower's `oneshot`. The catalog API is mocked with wiremock; no real
//! network or port binding is involved.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolbridge::{app, AppState, SessionRegistry};

fn state_for(base: &str) -> (AppState, Arc<SessionRegistry>) {
    let registry = Arc::new(SessionRegistry::new());
    let state = AppState::new(
        registry.clone(),
        reqwest::Client::new(),
        Url::parse(base).expect("base url"),
    );
    (state, registry)
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body should be utf8")
}

/// Read one SSE event (terminated by a blank line) from a streaming body.
async fn next_event(body: &mut Body, buffer: &mut String) -> String {
    loop {
        if let Some(pos) = buffer.find("\n\n") {
            let event = buffer[..pos].to_string();
            buffer.drain(..pos + 2);
            return event;
        }
        let frame = tokio::time::timeout(Duration::from_secs(10), body.frame())
            .await
            .expect("timed out waiting for SSE event")
            .expect("SSE stream ended unexpectedly")
            .expect("SSE stream errored");
        if let Some(data) = frame.data_ref() {
            buffer.push_str(std::str::from_utf8(data).expect("SSE frames are utf8"));
        }
    }
}

/// Extract the `data:` payload of an SSE event. The space after the colon
/// is optional in the SSE format and emitters differ on it.
fn event_data(event: &str) -> String {
    event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect::<Vec<_>>()
        .join("\n")
}

fn event_json(event: &str) -> Value {
    serde_json::from_str(&event_data(event)).expect("event data should be JSON")
}

/// Mount a one-connection CRM catalog: two actions, one of which fails
/// when run. Listings require the bearer token the tests connect with.
async fn mount_crm_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "conn-1", "integration": {"id": "int-1"}}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/integrations/int-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "int-1", "key": "crm", "name": "CRM"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actions"))
        .and(query_param("integrationId", "int-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"key": "ok", "name": "Works"},
                {"key": "boom", "name": "Fails"}
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/crm/actions/ok/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": {"id": 7}})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/crm/actions/boom/run"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"message": "boom"})))
        .mount(server)
        .await;
}

async fn post_message(state: &AppState, session_id: &str, message: Value) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/messages?sessionId={}", session_id))
        .header("content-type", "application/json")
        .body(Body::from(message.to_string()))
        .expect("request");
    app(state.clone()).oneshot(request).await.expect("response").status()
}

#[tokio::test]
async fn status_endpoint_reports_running() {
    let (state, _) = state_for("http://127.0.0.1:9");
    let response = app(state)
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    assert!(body.contains("MCP Server is running"));
}

#[tokio::test]
async fn sse_without_token_is_rejected_and_creates_no_session() {
    let (state, registry) = state_for("http://127.0.0.1:9");
    let response = app(state)
        .oneshot(Request::get("/sse").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&read_body(response).await).expect("json body");
    assert_eq!(body, json!({"error": "Token is required"}));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn sse_fails_when_the_catalog_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (state, registry) = state_for(&server.uri());
    let response = app(state)
        .oneshot(Request::get("/sse?token=secret").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn message_for_unknown_session_is_rejected() {
    let (state, _) = state_for("http://127.0.0.1:9");
    let status = post_message(&state, "does-not-exist", json!({"jsonrpc": "2.0"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/messages?sessionId=does-not-exist")
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(read_body(response).await, "No transport found for sessionId");
}

#[tokio::test]
async fn mcp_without_token_is_rejected() {
    let (state, _) = state_for("http://127.0.0.1:9");
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&read_body(response).await).expect("json body");
    assert_eq!(body, json!({"error": "Token is required"}));
}

/// Full legacy-transport session: connect, initialize, list tools, call a
/// tool successfully, see an invocation failure surfaced as a protocol
/// error without dropping the connection, then disconnect and observe the
/// session disappear from the registry.
#[tokio::test]
async fn sse_session_round_trip() {
    let server = MockServer::start().await;
    mount_crm_catalog(&server).await;

    let (state, registry) = state_for(&server.uri());
    let response = app(state.clone())
        .oneshot(Request::get("/sse?token=secret").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.len(), 1);

    let mut body = response.into_body();
    let mut buffer = String::new();

    // First event announces the message endpoint with our session id
    let endpoint = next_event(&mut body, &mut buffer).await;
    assert!(endpoint.contains("event: endpoint"));
    let session_id = event_data(&endpoint)
        .rsplit("sessionId=")
        .next()
        .expect("endpoint event carries a session id")
        .to_string();

    // MCP handshake
    let status = post_message(
        &state,
        &session_id,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let init = event_json(&next_event(&mut body, &mut buffer).await);
    assert_eq!(
        init["result"]["serverInfo"]["name"],
        json!("Integration App MCP Server")
    );

    let status = post_message(
        &state,
        &session_id,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Tools carry the slug-prefixed keys
    post_message(
        &state,
        &session_id,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}}),
    )
    .await;
    let tools = event_json(&next_event(&mut body, &mut buffer).await);
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, ["crm-ok", "crm-boom"]);

    // Successful call wraps the serialized output
    post_message(
        &state,
        &session_id,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "crm-ok", "arguments": {}}
        }),
    )
    .await;
    let call = event_json(&next_event(&mut body, &mut buffer).await);
    assert_eq!(
        call["result"]["content"][0]["text"],
        json!(r#"Output: {"id":7}"#)
    );

    // Failed call surfaces the remote message without killing the session
    post_message(
        &state,
        &session_id,
        json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "crm-boom", "arguments": {}}
        }),
    )
    .await;
    let failure = event_json(&next_event(&mut body, &mut buffer).await);
    let message = failure["error"]["message"].as_str().expect("error message");
    assert!(message.contains("Failed to execute action"));
    assert!(message.contains("boom"));
    assert_eq!(registry.len(), 1);

    // Disconnect: dropping the stream deregisters the session
    drop(body);
    assert!(registry.is_empty());
    let status = post_message(&state, &session_id, json!({"jsonrpc": "2.0"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// POST to `/mcp` with the headers the streamable HTTP transport requires,
/// each through its own router instance; session continuity has to come
/// from the shared state, not the service handle.
async fn mcp_post(
    state: &AppState,
    session_id: Option<&str>,
    message: Value,
) -> axum::response::Response {
    let mut request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("authorization", "Bearer secret")
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream");
    if let Some(id) = session_id {
        request = request.header("mcp-session-id", id);
    }
    app(state.clone())
        .oneshot(request.body(Body::from(message.to_string())).expect("request"))
        .await
        .expect("response")
}

/// Full streamable-transport session: initialize opens a session, the
/// first tools/list triggers tool discovery for the session's token, calls
/// execute, and DELETE ends the session. The legacy registry stays empty
/// throughout; the streamable path has its own session state.
#[tokio::test]
async fn streamable_http_round_trip() {
    let server = MockServer::start().await;
    mount_crm_catalog(&server).await;

    let (state, registry) = state_for(&server.uri());

    let response = mcp_post(
        &state,
        None,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .expect("initialize response carries a session id")
        .to_string();

    let mut body = response.into_body();
    let mut buffer = String::new();
    let init = event_json(&next_event(&mut body, &mut buffer).await);
    assert_eq!(
        init["result"]["serverInfo"]["name"],
        json!("Integration App MCP Server")
    );
    drop(body);

    let response = mcp_post(
        &state,
        Some(&session_id),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Tool discovery runs on first use, against this session's token
    let response = mcp_post(
        &state,
        Some(&session_id),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    let mut buffer = String::new();
    let tools = event_json(&next_event(&mut body, &mut buffer).await);
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, ["crm-ok", "crm-boom"]);
    drop(body);

    let response = mcp_post(
        &state,
        Some(&session_id),
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "crm-ok", "arguments": {}}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    let mut buffer = String::new();
    let call = event_json(&next_event(&mut body, &mut buffer).await);
    assert_eq!(
        call["result"]["content"][0]["text"],
        json!(r#"Output: {"id":7}"#)
    );
    drop(body);

    assert!(registry.is_empty());

    // DELETE terminates the session; its id stops being honored
    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("authorization", "Bearer secret")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .expect("request");
    let response = app(state.clone()).oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = mcp_post(
        &state,
        Some(&session_id),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list", "params": {}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
