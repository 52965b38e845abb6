//! Protocol-facing types shared by the transport, the lifecycle manager and
//! the classifier.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Lifecycle state of a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Transport connection is being (re)established.
    Connecting,
    /// A challenge was issued and is waiting to be scanned.
    AwaitingAuth,
    /// Authenticated and receiving traffic.
    Open,
    /// Disconnected; a reconnect may be pending.
    Closed,
    /// The account was logged out remotely.
    LoggedOut,
}

/// Why the transport closed a connection, decoded from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
    Unknown(Option<u16>),
}

impl DisconnectReason {
    pub fn from_status(code: Option<u16>) -> Self {
        match code {
            Some(428) => Self::ConnectionClosed,
            Some(408) => Self::ConnectionLost,
            Some(440) => Self::ConnectionReplaced,
            Some(401) => Self::LoggedOut,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            Some(411) => Self::MultideviceMismatch,
            Some(403) => Self::Forbidden,
            Some(503) => Self::UnavailableService,
            other => Self::Unknown(other),
        }
    }
}

/// Connection phase reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Close,
}

/// A connection-lifecycle notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionStatus>,
    /// Status code of the last disconnect, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Raw challenge string to render as a QR code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// Account JID once authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Tag of an inbound message batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// Live traffic.
    Notify,
    /// History backfill.
    Append,
    #[serde(other)]
    Unknown,
}

/// A batch of inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesUpsert {
    #[serde(rename = "type")]
    pub kind: UpsertKind,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// One inbound message: the protocol payload plus its envelope (key,
/// timestamp, push name, ...), kept verbatim for forwarding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub envelope: Map<String, Value>,
}

/// Cached chat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Opaque authentication material owned by the credential store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthState(pub Value);

impl Default for AuthState {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

/// Events a live connection emits, in order, to its session's event loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ConnectionUpdate(ConnectionUpdate),
    MessagesUpsert(MessagesUpsert),
    CredsUpdate(AuthState),
    ChatsSet(Vec<Chat>),
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_codes() {
        assert_eq!(DisconnectReason::from_status(Some(401)), DisconnectReason::LoggedOut);
        assert_eq!(
            DisconnectReason::from_status(Some(515)),
            DisconnectReason::RestartRequired
        );
        assert_eq!(
            DisconnectReason::from_status(Some(999)),
            DisconnectReason::Unknown(Some(999))
        );
        assert_eq!(DisconnectReason::from_status(None), DisconnectReason::Unknown(None));
    }

    #[test]
    fn inbound_message_keeps_envelope() {
        let raw = serde_json::json!({
            "key": {"remoteJid": "1@s.whatsapp.net", "id": "ABC"},
            "pushName": "Ana",
            "message": {"conversation": "hi"}
        });
        let msg: InboundMessage = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(msg.envelope["pushName"], "Ana");
        assert!(msg.message.as_ref().unwrap().contains_key("conversation"));
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn null_payload_is_none() {
        let msg: InboundMessage =
            serde_json::from_value(serde_json::json!({"key": {}, "message": null})).unwrap();
        assert!(msg.message.is_none());
    }

    #[test]
    fn unknown_upsert_kind() {
        let batch: MessagesUpsert =
            serde_json::from_value(serde_json::json!({"type": "prepend", "messages": []}))
                .unwrap();
        assert_eq!(batch.kind, UpsertKind::Unknown);
    }
}
