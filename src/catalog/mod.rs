//! Outbound client for the action-execution service
//!
//! The catalog is the remote system of record for connections, integrations
//! and actions. Everything here is fetched fresh per discovery pass; nothing
//! is cached across requests.

pub mod client;
pub mod types;

pub use client::{CatalogClient, CatalogError};
pub use types::{Action, Connection, Integration, IntegrationRef, RunOutcome};
