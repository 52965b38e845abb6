//! Inbound message classification.
//!
//! Live batches are split into independent per-message tasks. Each message
//! is typed by its content key, protocol housekeeping is dropped, media is
//! downloaded through the [`AttachmentResolver`], and the result is handed to
//! an [`EventSink`] (normally the webhook dispatcher).

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    tokio::task::JoinHandle,
    tracing::{debug, warn},
};

use crate::{
    Result,
    attachment::{AttachmentResolver, MediaKind},
    types::{InboundMessage, MessagesUpsert, UpsertKind},
};

/// Payload keys that carry metadata rather than content.
const METADATA_KEYS: &[&str] = &["messageContextInfo"];

/// Content type of an inbound message, named after its payload key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Conversation,
    ExtendedText,
    Image,
    Video,
    Audio,
    Protocol,
    SenderKeyDistribution,
    Other(String),
}

impl MessageType {
    pub fn from_key(key: &str) -> Self {
        match key {
            "conversation" => Self::Conversation,
            "extendedTextMessage" => Self::ExtendedText,
            "imageMessage" => Self::Image,
            "videoMessage" => Self::Video,
            "audioMessage" => Self::Audio,
            "protocolMessage" => Self::Protocol,
            "senderKeyDistributionMessage" => Self::SenderKeyDistribution,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Conversation => "conversation",
            Self::ExtendedText => "extendedTextMessage",
            Self::Image => "imageMessage",
            Self::Video => "videoMessage",
            Self::Audio => "audioMessage",
            Self::Protocol => "protocolMessage",
            Self::SenderKeyDistribution => "senderKeyDistributionMessage",
            Self::Other(key) => key,
        }
    }

    /// Protocol housekeeping that must never reach the webhook.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Protocol | Self::SenderKeyDistribution)
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Image => Some(MediaKind::Image),
            Self::Video => Some(MediaKind::Video),
            Self::Audio => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Type a message payload by its first content key, in wire order.
    ///
    /// Metadata keys are ignored. A content key wins over protocol keys
    /// riding along in the same payload (group messages carry a key
    /// distribution next to the text).
    pub fn of_payload(payload: &Map<String, Value>) -> Option<Self> {
        let mut internal = None;
        for key in payload.keys() {
            if METADATA_KEYS.contains(&key.as_str()) {
                continue;
            }
            let ty = Self::from_key(key);
            if !ty.is_internal() {
                return Some(ty);
            }
            internal.get_or_insert(ty);
        }
        internal
    }
}

/// What a normalized event carries besides the raw message.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Empty,
    Text(String),
    Attachment(Value),
}

/// Classifier output, destined for webhook delivery.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub session_id: String,
    pub raw_message: InboundMessage,
    pub message_type: MessageType,
    pub content: Content,
}

impl NormalizedEvent {
    /// Webhook body: the raw message envelope plus `instance`,
    /// `messageType`, `msgContent` and, for text, `text`.
    pub fn webhook_body(&self) -> Value {
        let mut body = self.raw_message.envelope.clone();
        if let Some(payload) = &self.raw_message.message {
            body.insert("message".into(), Value::Object(payload.clone()));
        }
        body.insert("instance".into(), Value::String(self.session_id.clone()));
        body.insert(
            "messageType".into(),
            Value::String(self.message_type.key().to_string()),
        );
        let msg_content = match &self.content {
            Content::Attachment(value) => value.clone(),
            Content::Text(text) => {
                body.insert("text".into(), Value::String(text.clone()));
                Value::String(String::new())
            },
            Content::Empty => Value::String(String::new()),
        };
        body.insert("msgContent".into(), msg_content);
        Value::Object(body)
    }
}

/// Receives normalized events. Implementations must not fail past their
/// boundary.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: NormalizedEvent);
}

fn text_excerpt(ty: &MessageType, body: &Value) -> Option<String> {
    let text = match ty {
        MessageType::Conversation => body,
        MessageType::ExtendedText => body.get("text")?,
        _ => return None,
    };
    Some(match text {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

pub struct EventClassifier {
    resolver: Arc<dyn AttachmentResolver>,
    sink: Arc<dyn EventSink>,
}

impl EventClassifier {
    pub fn new(resolver: Arc<dyn AttachmentResolver>, sink: Arc<dyn EventSink>) -> Self {
        Self { resolver, sink }
    }

    /// Classify a message batch. Non-live batches are ignored; otherwise
    /// every message is processed in its own task and delivered when it
    /// survives. The handles are returned for callers that need to wait.
    pub fn handle_upsert(
        self: &Arc<Self>,
        session_id: &str,
        batch: MessagesUpsert,
    ) -> Vec<JoinHandle<()>> {
        if batch.kind != UpsertKind::Notify {
            debug!(session_id, kind = ?batch.kind, "ignoring non-live message batch");
            return Vec::new();
        }

        batch
            .messages
            .into_iter()
            .map(|message| {
                let classifier = Arc::clone(self);
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    match classifier.classify(&session_id, message).await {
                        Ok(Some(event)) => classifier.sink.deliver(event).await,
                        Ok(None) => {},
                        Err(e) => {
                            warn!(%session_id, error = %e, "dropping inbound message");
                        },
                    }
                })
            })
            .collect()
    }

    /// Classify one message. `Ok(None)` means the message is uninteresting.
    pub async fn classify(
        &self,
        session_id: &str,
        message: InboundMessage,
    ) -> Result<Option<NormalizedEvent>> {
        let Some(payload) = message.message.as_ref() else {
            return Ok(None);
        };
        let Some(message_type) = MessageType::of_payload(payload) else {
            return Ok(None);
        };
        if message_type.is_internal() {
            debug!(session_id, message_type = message_type.key(), "skipping protocol message");
            return Ok(None);
        }

        let body = payload.get(message_type.key()).unwrap_or(&Value::Null);
        let content = if let Some(kind) = message_type.media_kind() {
            Content::Attachment(self.resolver.resolve(body, kind).await?)
        } else if let Some(text) = text_excerpt(&message_type, body) {
            Content::Text(text)
        } else {
            Content::Empty
        };

        Ok(Some(NormalizedEvent {
            session_id: session_id.to_string(),
            raw_message: message,
            message_type,
            content,
        }))
    }
}
