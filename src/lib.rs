pub mod bridge;
pub mod catalog;
pub mod http;
pub mod naming;
pub mod registry;
pub mod schema;
pub mod session;

// Re-export commonly used items
pub use bridge::ToolBridge;
pub use catalog::{CatalogClient, CatalogError};
pub use http::{app, AppState};
pub use registry::{build_tool_set, RegisteredTool, ToolSet};
pub use session::SessionRegistry;
