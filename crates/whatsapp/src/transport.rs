//! Seams to the underlying chat-protocol implementation.

use std::sync::Arc;

use {async_trait::async_trait, serde_json::Value, tokio::sync::mpsc};

use crate::{
    Result,
    types::{AuthState, TransportEvent},
};

/// Receiving end of a connection's ordered event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending end handed to whatever produces transport events.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Opens protocol connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection for `session_id` using previously persisted
    /// credentials. Events for this connection arrive on the returned
    /// receiver until the connection is gone.
    async fn connect(
        &self,
        session_id: &str,
        auth: AuthState,
    ) -> Result<(Arc<dyn Connection>, EventReceiver)>;
}

/// One live protocol connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Log the account out and close the connection.
    async fn logout(&self) -> Result<()>;

    /// Send a message payload to `to` (a JID). Returns the protocol's
    /// description of the sent message.
    async fn send_message(&self, to: &str, content: Value) -> Result<Value>;

    /// Whether `jid` is a registered WhatsApp user.
    async fn on_whatsapp(&self, jid: &str) -> Result<bool>;

    /// Metadata of a group the account belongs to.
    async fn group_metadata(&self, jid: &str) -> Result<Value>;
}
