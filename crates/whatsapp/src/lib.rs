//! WhatsApp multi-session lifecycle management.
//!
//! Sessions are driven through a [`Transport`] (in production the Baileys
//! sidecar, see [`sidecar`]); inbound messages are classified and forwarded
//! to a webhook.

pub mod attachment;
pub mod classify;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod outbound;
pub mod policy;
pub mod qr;
pub mod registry;
pub mod reply;
pub mod sidecar;
pub mod transport;
pub mod types;
pub mod webhook;

pub use {
    attachment::{AttachmentResolver, MediaKind},
    classify::{Content, EventClassifier, EventSink, MessageType, NormalizedEvent},
    credentials::{CredentialStore, FileCredentialStore, validate_session_id},
    error::{Context, Error, Result},
    manager::{ManagerOptions, SessionManager},
    outbound::SendJitter,
    policy::ReconnectPolicy,
    registry::Session,
    reply::{CreateOutcome, ResponseSink},
    sidecar::SidecarTransport,
    transport::{Connection, Transport},
    types::{Chat, DisconnectReason, LifecycleState},
    webhook::{DeliveryOutcome, WebhookDispatcher},
};
