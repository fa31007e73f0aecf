use std::net::SocketAddr;
use std::sync::Arc;

use toolbridge::{app, AppState, SessionRegistry};
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.integration.app";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    // Initialize tracing with filtering, hiding noisy lower-level crates
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "toolbridge=info,rmcp=info,hyper=off,tokio=off,tower=off,h2=off,rustls=off",
        )
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_base: Url = std::env::var("INTEGRATION_API_URL")
        .unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
        .parse()?;

    let registry = Arc::new(SessionRegistry::new());
    let state = AppState::new(registry, reqwest::Client::new(), api_base.clone());

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server is running on port {}", port);
    tracing::info!("  catalog API: {}", api_base);
    tracing::info!("  legacy SSE endpoint: /sse");
    tracing::info!("  streamable HTTP endpoint: /mcp");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
