//! Session registry and transport for the legacy SSE connection style
//!
//! A session is one live SSE connection: the server half of a channel pair
//! feeding the attached MCP server. The registry maps session ids to the
//! inbound sender so the message endpoint can route posted messages; it is
//! the only shared mutable state in the process, written here and read by
//! the message router.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use rmcp::{
    model::{ClientJsonRpcMessage, ServerJsonRpcMessage},
    service::RoleServer,
    transport::Transport,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel capacity per session, both directions.
const SESSION_BUFFER: usize = 64;

/// Active sessions, keyed by server-generated session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, mpsc::Sender<ClientJsonRpcMessage>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: String, sender: mpsc::Sender<ClientJsonRpcMessage>) {
        self.lock().insert(session_id, sender);
    }

    /// Remove a session. Removing an already-removed session is harmless;
    /// both the disconnect callback and the serve task call this.
    pub fn remove(&self, session_id: &str) {
        if self.lock().remove(session_id).is_some() {
            tracing::info!(session_id, "session deregistered");
        }
    }

    /// Look up the inbound sender for a live session.
    pub fn sender(&self, session_id: &str) -> Option<mpsc::Sender<ClientJsonRpcMessage>> {
        self.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<ClientJsonRpcMessage>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Error)]
#[error("session transport closed")]
pub struct SessionClosed;

/// Transport half owned by the MCP server attached to one session.
/// Outbound messages go to the SSE response stream; inbound messages arrive
/// from the message endpoint via the registry.
pub struct SessionTransport {
    outbound: mpsc::Sender<ServerJsonRpcMessage>,
    inbound: mpsc::Receiver<ClientJsonRpcMessage>,
}

impl SessionTransport {
    /// Create the transport plus the two ends the multiplexer keeps: the
    /// inbound sender (stored in the registry) and the outbound receiver
    /// (drained into the SSE response).
    pub fn channel() -> (
        Self,
        mpsc::Sender<ClientJsonRpcMessage>,
        mpsc::Receiver<ServerJsonRpcMessage>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::channel(SESSION_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(SESSION_BUFFER);
        (
            Self {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            inbound_tx,
            outbound_rx,
        )
    }
}

impl Transport<RoleServer> for SessionTransport {
    type Error = SessionClosed;

    fn send(
        &mut self,
        item: ServerJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let outbound = self.outbound.clone();
        async move { outbound.send(item).await.map_err(|_| SessionClosed) }
    }

    fn receive(&mut self) -> impl Future<Output = Option<ClientJsonRpcMessage>> + Send {
        self.inbound.recv()
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inbound.close();
        std::future::ready(Ok(()))
    }
}
