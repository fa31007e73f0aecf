//! HTTP client for the catalog API

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::types::{Action, Connection, Integration, Page, RunOutcome};

/// Errors surfaced by catalog operations. Non-success responses carry only
/// the remote message text; the remote error structure stops here.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (status {status})")]
    Api { status: StatusCode, message: String },
    #[error("invalid catalog url: {0}")]
    Url(#[from] url::ParseError),
}

/// Client for one authenticated caller. The bearer token decides which
/// connections and actions are visible; construction is cheap, so one client
/// exists per protocol server instance.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, mut base_url: Url, token: impl Into<String>) -> Self {
        // A trailing slash keeps Url::join from eating the last path segment
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    /// List the caller's connections. Single page.
    pub async fn list_connections(&self) -> Result<Vec<Connection>, CatalogError> {
        let url = self.base_url.join("connections")?;
        let page: Page<Connection> = self.get(url).await?;
        Ok(page.items)
    }

    /// Fetch an integration's full definition by id or key.
    pub async fn get_integration(&self, id: &str) -> Result<Integration, CatalogError> {
        let url = self.base_url.join(&format!("integrations/{}", id))?;
        self.get(url).await
    }

    /// List an integration's actions. Single page; integrations with more
    /// actions than one page lose the remainder.
    pub async fn list_actions(&self, integration_id: &str) -> Result<Vec<Action>, CatalogError> {
        let mut url = self.base_url.join("actions")?;
        url.query_pairs_mut()
            .append_pair("integrationId", integration_id);
        let page: Page<Action> = self.get(url).await?;
        Ok(page.items)
    }

    /// Run an action instance with the given arguments, auto-creating the
    /// instance on first use. The remote service owns the instance lifecycle.
    pub async fn run_action(
        &self,
        integration_key: &str,
        action_key: &str,
        input: &rmcp::model::JsonObject,
    ) -> Result<RunOutcome, CatalogError> {
        let mut url = self
            .base_url
            .join(&format!("integrations/{}/actions/{}/run", integration_key, action_key))?;
        url.query_pairs_mut().append_pair("autoCreate", "true");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status,
                message: api_message(&body),
            });
        }
        Ok(response.json().await?)
    }
}

/// Pull a human-readable message out of an error body. The catalog responds
/// with `{"message": ...}` on failures, but not reliably.
fn api_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "request failed with empty response".to_string()
    } else {
        trimmed.to_string()
    }
}
