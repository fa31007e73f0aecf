//! MCP server handler bridging tool calls to catalog actions
//!
//! One `ToolBridge` exists per client session, holding that caller's own
//! tool set; nothing is shared across sessions, so one caller can never see
//! another's integrations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::catalog::{CatalogClient, CatalogError};
use crate::registry::{build_tool_set, ToolSet};

const SERVER_NAME: &str = "Integration App MCP Server";
const SERVER_DESCRIPTION: &str = "MCP server for all Integration App connections";

/// MCP handler for one authenticated caller.
#[derive(Clone)]
pub struct ToolBridge {
    catalog: Arc<CatalogClient>,
    tools: Arc<OnceCell<ToolSet>>,
}

impl ToolBridge {
    pub fn new(catalog: CatalogClient) -> Self {
        Self {
            catalog: Arc::new(catalog),
            tools: Arc::new(OnceCell::new()),
        }
    }

    /// Run the registration pass once and reuse the result for the life of
    /// this server instance. The SSE path awaits this before attaching the
    /// transport; the streamable HTTP path reaches it on first use.
    pub async fn ensure_ready(&self) -> Result<&ToolSet, CatalogError> {
        self.tools
            .get_or_try_init(|| async { build_tool_set(&self.catalog).await })
            .await
    }

    async fn tools_or_error(&self) -> Result<&ToolSet, McpError> {
        self.ensure_ready()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}

/// Render an action run result as the tool's text content.
fn render_output(output: Option<&Value>) -> String {
    match output {
        Some(value) if !value.is_null() => format!("Output: {}", value),
        _ => "Output: No output".to_string(),
    }
}

impl ServerHandler for ToolBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(SERVER_DESCRIPTION.into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools: Vec<Tool> = self
            .tools_or_error()
            .await?
            .iter()
            .map(|tool| {
                Tool::new(
                    tool.name.clone(),
                    tool.description.clone(),
                    tool.input_schema.clone(),
                )
            })
            .collect();

        tracing::debug!("Listing {} tools", tools.len());

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tools = self.tools_or_error().await?;
        let tool = tools.get(&request.name).ok_or_else(|| {
            McpError::invalid_params(format!("Unknown tool: {}", request.name), None)
        })?;

        let arguments = request.arguments.unwrap_or_default();
        tracing::debug!(tool = %request.name, "invoking action");

        match self
            .catalog
            .run_action(&tool.integration_key, &tool.action_key, &arguments)
            .await
        {
            Ok(outcome) => Ok(CallToolResult::success(vec![Content::text(render_output(
                outcome.output.as_ref(),
            ))])),
            Err(error) => {
                tracing::error!(
                    integration_key = %tool.integration_key,
                    action_key = %tool.action_key,
                    %error,
                    "error executing action"
                );
                Err(McpError::internal_error(
                    format!("Failed to execute action: {}", error),
                    None,
                ))
            }
        }
    }
}
