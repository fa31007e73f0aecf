//! HTTP surface and session multiplexing
//!
//! Two transport styles share one router:
//!
//! - legacy SSE: `GET /sse` opens a long-lived stream and `POST /messages`
//!   delivers client messages into the matching session;
//! - streamable HTTP: `ALL /mcp` is delegated to rmcp's
//!   `StreamableHttpService` over one shared session manager.
//!
//! Each accepted connection gets its own freshly populated MCP server.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use rmcp::model::ClientJsonRpcMessage;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt as _;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceExt as _;
use tower_http::cors::CorsLayer;
use url::Url;
use uuid::Uuid;

use crate::bridge::ToolBridge;
use crate::catalog::CatalogClient;
use crate::session::{SessionRegistry, SessionTransport};

const STATUS_MESSAGE: &str = "MCP Server is running. Use /sse endpoint for SSE connections.";
const NO_TRANSPORT_MESSAGE: &str = "No transport found for sessionId";

type McpService = StreamableHttpService<ToolBridge, LocalSessionManager>;

/// Shared router state. The session registry (legacy transport) and rmcp's
/// session manager (streamable transport) are the only cross-request
/// mutable state; nothing here is keyed by token, so an unauthenticated
/// caller cannot grow it.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
    http: reqwest::Client,
    api_base: Url,
    mcp_sessions: Arc<LocalSessionManager>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, http: reqwest::Client, api_base: Url) -> Self {
        Self {
            registry,
            http,
            api_base,
            mcp_sessions: Arc::new(LocalSessionManager::default()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn catalog_for(&self, token: &str) -> CatalogClient {
        CatalogClient::new(self.http.clone(), self.api_base.clone(), token)
    }

    /// Streamable HTTP service view for one request. The service itself is
    /// a cheap handle dropped with the request; all session state lives in
    /// the shared session manager, and the factory only runs when a session
    /// is created, binding each new session's `ToolBridge` to the token
    /// presented on its initialize request.
    fn mcp_service_for(&self, token: &str) -> McpService {
        let catalog = self.catalog_for(token);
        StreamableHttpService::new(
            move || Ok(ToolBridge::new(catalog.clone())),
            self.mcp_sessions.clone(),
            StreamableHttpServerConfig::default(),
        )
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/sse", get(sse_handler))
        .route("/messages", post(messages_handler))
        .route("/mcp", any(mcp_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status_handler() -> &'static str {
    STATUS_MESSAGE
}

fn token_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Token is required"})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SseParams {
    token: Option<String>,
}

/// Removes the session when the SSE response stream is dropped. Removal is
/// idempotent with the serve task's own cleanup.
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        tracing::info!(session_id = %self.session_id, "SSE connection closed");
        self.registry.remove(&self.session_id);
    }
}

/// Legacy SSE endpoint. Builds a fully populated server for the caller's
/// token, registers the session, then streams server messages out.
///
/// The tool set is populated before the session exists, so a failed
/// catalog pass surfaces as a plain 500 and never registers anything; the
/// cost is that the endpoint event is not sent until registration
/// finishes.
async fn sse_handler(State(state): State<AppState>, Query(params): Query<SseParams>) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        tracing::info!("SSE request missing token");
        return token_required();
    };

    let bridge = ToolBridge::new(state.catalog_for(&token));
    if let Err(error) = bridge.ensure_ready().await {
        tracing::error!(%error, "error building server for SSE connection");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let (transport, inbound_tx, outbound_rx) = SessionTransport::channel();
    let session_id = Uuid::new_v4().to_string();
    state.registry.insert(session_id.clone(), inbound_tx);
    tracing::info!(session_id = %session_id, "SSE session established");

    {
        let registry = state.registry.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            match bridge.serve(transport).await {
                Ok(running) => {
                    let _ = running.waiting().await;
                }
                Err(error) => {
                    tracing::error!(session_id = %session_id, %error, "MCP server failed on session");
                }
            }
            registry.remove(&session_id);
        });
    }

    let endpoint_data = format!("/messages?sessionId={}", session_id);
    let endpoint = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint_data))
    });

    let guard = SessionGuard {
        registry: state.registry.clone(),
        session_id,
    };
    let messages = ReceiverStream::new(outbound_rx).map(move |message| {
        let _hold = &guard;
        Ok(Event::default()
            .event("message")
            .data(serde_json::to_string(&message).unwrap_or_default()))
    });

    Sse::new(endpoint.chain(messages))
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Legacy message endpoint: routes one posted protocol message into the
/// session named by the client.
async fn messages_handler(
    State(state): State<AppState>,
    Query(params): Query<MessageParams>,
    body: Bytes,
) -> Response {
    let sender = params
        .session_id
        .as_deref()
        .and_then(|id| state.registry.sender(id));
    let Some(sender) = sender else {
        tracing::info!(session_id = ?params.session_id, "no transport found for session");
        return (StatusCode::BAD_REQUEST, NO_TRANSPORT_MESSAGE).into_response();
    };

    let message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(error) => {
            tracing::info!(%error, "rejecting malformed message body");
            return (StatusCode::BAD_REQUEST, "Invalid message body").into_response();
        }
    };

    // The session may close while the message is in flight
    if sender.send(message).await.is_err() {
        return (StatusCode::BAD_REQUEST, NO_TRANSPORT_MESSAGE).into_response();
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Streamable HTTP endpoint. Token-gated like the SSE path; everything
/// session-related past that point is owned by rmcp's transport layer.
async fn mcp_handler(State(state): State<AppState>, request: Request) -> Response {
    let Some(token) = request_token(&request) else {
        tracing::info!("streamable HTTP request missing token");
        return token_required();
    };

    let service = state.mcp_service_for(&token);
    match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(infallible) => match infallible {},
    }
}

/// Bearer token from the Authorization header, falling back to a `token`
/// query parameter for parity with the SSE endpoint.
fn request_token(request: &Request) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    request.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == "token")
            .map(|(_, value)| value.into_owned())
            .filter(|token| !token.is_empty())
    })
}
