//! Catalog wire types

use serde::Deserialize;
use serde_json::Value;

/// One page of a catalog listing. Only the first page is ever fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// A caller's link to one external integration instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub integration: Option<IntegrationRef>,
}

/// The `integration` field on a connection is duck-typed at the boundary:
/// either a bare identifier string or an object carrying an id and/or key.
/// Anything else deserializes as `Other` and resolves to no identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IntegrationRef {
    Key(String),
    Object {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        key: Option<String>,
    },
    Other(Value),
}

impl IntegrationRef {
    /// Resolve the reference to a canonical integration identifier.
    /// Downstream code never re-inspects the shape.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            IntegrationRef::Key(key) => Some(key),
            IntegrationRef::Object { id, key } => id.as_deref().or(key.as_deref()),
            IntegrationRef::Other(_) => None,
        }
    }
}

/// A third-party system definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub key: String,
    pub name: String,
}

/// An operation exposed by an integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Result of running an action instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RunOutcome {
    #[serde(default)]
    pub output: Option<Value>,
}
