//! Tool registration pass
//!
//! One pass per protocol server instance: enumerate the caller's
//! connections, resolve each to an integration, and register one tool per
//! action. A connection that fails for any reason is logged and skipped;
//! an empty tool set is a valid outcome.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::JsonObject;

use crate::catalog::{CatalogClient, CatalogError, Connection, IntegrationRef};
use crate::naming::{slugify, tool_key};
use crate::schema::translate_input_schema;

/// One registered tool: a stable key plus the invocation context it is
/// bound to.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Arc<JsonObject>,
    pub integration_key: String,
    pub action_key: String,
}

/// Tools registered on one server instance, in catalog order.
#[derive(Debug, Default)]
pub struct ToolSet {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A name collision (possible after truncation)
    /// replaces the earlier registration in place.
    pub fn insert(&mut self, tool: RegisteredTool) {
        match self.index.get(&tool.name) {
            Some(&slot) => {
                tracing::warn!(name = %tool.name, "tool key collision, replacing earlier registration");
                self.tools[slot] = tool;
            }
            None => {
                self.index.insert(tool.name.clone(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Run the full registration pass for one caller.
///
/// Only the initial connection listing is fatal; every failure inside one
/// connection abandons that connection and the loop continues.
pub async fn build_tool_set(catalog: &CatalogClient) -> Result<ToolSet, CatalogError> {
    let connections = catalog.list_connections().await?;
    tracing::info!(count = connections.len(), "fetched connections");

    let mut set = ToolSet::new();
    for connection in &connections {
        if let Err(error) = register_connection(catalog, connection, &mut set).await {
            tracing::error!(
                connection = %connection.id,
                %error,
                "error processing connection, skipping"
            );
        }
    }

    tracing::info!(tools = set.len(), "tool registration pass complete");
    Ok(set)
}

async fn register_connection(
    catalog: &CatalogClient,
    connection: &Connection,
    set: &mut ToolSet,
) -> Result<(), CatalogError> {
    let Some(integration_id) = connection
        .integration
        .as_ref()
        .and_then(IntegrationRef::identifier)
    else {
        tracing::warn!(
            connection = %connection.id,
            "connection has no usable integration reference, skipping"
        );
        return Ok(());
    };

    let integration = catalog.get_integration(integration_id).await?;
    let slug = slugify(&integration.name);

    let actions = catalog.list_actions(&integration.id).await?;
    tracing::debug!(
        integration = %integration.name,
        actions = actions.len(),
        "registering actions"
    );

    for action in actions {
        let name = tool_key(&slug, &action.key);
        let input_schema = Arc::new(translate_input_schema(action.input_schema.as_ref()));
        set.insert(RegisteredTool {
            name,
            description: format!("{}: {}", integration.name, action.name),
            input_schema,
            integration_key: integration.key.clone(),
            action_key: action.key,
        });
    }

    Ok(())
}
