//! Session lifecycle manager.
//!
//! Owns the registry and the reconnection policy. Every session gets one
//! event-loop task consuming its connection's events in order:
//!
//! ```text
//! create ─► Connecting ──qr──► AwaitingAuth ──open──► Open
//!               │                   │                  │
//!               └───────────close───┴──────────────────┘
//!                            │
//!            logged out / retries exhausted ─► removed
//!            otherwise ─► Closed ─(delay)─► Connecting
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    fastzap_common::jid,
    futures::future::BoxFuture,
    serde_json::Value,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result,
    classify::EventClassifier,
    credentials::{CredentialStore, validate_session_id},
    outbound::SendJitter,
    policy::ReconnectPolicy,
    qr,
    registry::{Session, SessionRegistry},
    reply::{CreateOutcome, ResponseSink},
    transport::{Connection, EventReceiver, Transport},
    types::{Chat, ConnectionStatus, ConnectionUpdate, DisconnectReason, LifecycleState, TransportEvent},
};

const CREATE_FAILED: &str = "Unable to create session.";
const QR_FAILED: &str = "Unable to create QR code.";

/// Tunables for [`SessionManager`].
#[derive(Debug, Default)]
pub struct ManagerOptions {
    pub policy: ReconnectPolicy,
    pub send_jitter: SendJitter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// How a connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    /// The protocol reported a close, with its status code when present.
    Reported(Option<u16>),
    /// The transport could not connect, or its event stream ended.
    LinkLost,
}

struct Inner {
    registry: SessionRegistry,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    classifier: Arc<EventClassifier>,
    send_jitter: SendJitter,
    next_generation: AtomicU64,
}

/// Creates, restores, reconnects and tears down sessions.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        classifier: Arc<EventClassifier>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::default(),
                policy: options.policy,
                transport,
                credentials,
                classifier,
                send_jitter: options.send_jitter,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        self.inner.registry.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.registry.get(id).map(|mut session| {
            session.retry_count = self.inner.policy.attempts(id);
            session
        })
    }

    pub fn list(&self) -> Vec<Session> {
        self.inner
            .registry
            .list()
            .into_iter()
            .map(|mut session| {
                session.retry_count = self.inner.policy.attempts(&session.id);
                session
            })
            .collect()
    }

    /// Register a new session and open its connection.
    ///
    /// Fails with [`Error::InvalidSessionId`] for ids that cannot name
    /// credential files, and with [`Error::Conflict`] when `id` already has
    /// a session; the existing one is left untouched. The optional `sink` receives exactly
    /// one [`CreateOutcome`], possibly after several reconnects.
    pub async fn create(&self, id: &str, sink: Option<ResponseSink>) -> Result<()> {
        validate_session_id(id)?;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.registry.insert_if_absent(id, generation)?;
        info!(session_id = id, generation, "creating session");
        self.open(id.to_string(), generation, sink).await;
        Ok(())
    }

    /// Log out and forget a session. Unknown ids are a no-op.
    pub async fn delete(&self, id: &str) {
        // Removing the entry first stops the event loop, so the close
        // triggered by the logout below is not treated as a disconnect.
        let removed = self.inner.registry.remove(id);
        if let Some(connection) = removed.as_ref().and_then(Session::connection)
            && let Err(e) = connection.logout().await
        {
            debug!(session_id = id, error = %e, "logout failed during delete");
        }
        self.purge(id).await;
        if removed.is_some() {
            info!(session_id = id, "session deleted");
        }
    }

    /// Create a session for every id the credential store knows about.
    pub async fn bootstrap(&self) -> Result<usize> {
        let ids = self.inner.credentials.list().await?;
        let mut started = 0;
        for id in ids {
            match self.create(&id, None).await {
                Ok(()) => started += 1,
                Err(Error::Conflict { .. }) => debug!(session_id = %id, "already running"),
                Err(e) => warn!(session_id = %id, error = %e, "failed to restore session"),
            }
        }
        info!(count = started, "restored persisted sessions");
        Ok(started)
    }

    /// Send a message through a session, after the configured jitter.
    ///
    /// `receiver` is a group JID (`@g.us`) or a phone number in any
    /// format, normalized to a user JID.
    pub async fn send_message(&self, id: &str, receiver: &str, content: Value) -> Result<Value> {
        let connection = self.connection(id)?;
        let receiver = if jid::is_group(receiver) {
            jid::format_group(receiver)
        } else {
            jid::format_phone(receiver)
        };
        self.inner.send_jitter.wait().await;
        connection.send_message(&receiver, content).await
    }

    /// Whether a group or phone number exists on the network. Lookup
    /// failures count as "no".
    pub async fn is_exists(&self, id: &str, target: &str, is_group: bool) -> bool {
        let Ok(connection) = self.connection(id) else {
            return false;
        };
        let jid = if is_group {
            jid::format_group(target)
        } else {
            jid::format_phone(target)
        };
        let result = if is_group {
            connection.group_metadata(&jid).await.map(|meta| {
                meta.get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|gid| !gid.is_empty())
            })
        } else {
            connection.on_whatsapp(&jid).await
        };
        result.unwrap_or_else(|e| {
            debug!(session_id = id, %jid, error = %e, "existence lookup failed");
            false
        })
    }

    /// Cached chats of a session, either groups or one-to-one chats.
    pub fn chat_list(&self, id: &str, is_group: bool) -> Result<Vec<Chat>> {
        let session = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| Error::unknown_session(id))?;
        let suffix = if is_group {
            fastzap_common::GROUP_SUFFIX
        } else {
            fastzap_common::USER_SUFFIX
        };
        Ok(session
            .chats
            .into_iter()
            .filter(|chat| chat.id.ends_with(suffix))
            .collect())
    }

    fn connection(&self, id: &str) -> Result<Arc<dyn Connection>> {
        let session = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| Error::unknown_session(id))?;
        session
            .connection()
            .cloned()
            .ok_or_else(|| Error::NotConnected {
                session_id: id.to_string(),
            })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Load credentials, connect, and start the event loop.
    ///
    /// Returns a boxed future because reconnect timers call back into it.
    fn open(
        &self,
        id: String,
        generation: u64,
        sink: Option<ResponseSink>,
    ) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move {
            let auth = match this.inner.credentials.load(&id).await {
                Ok(auth) => auth,
                Err(e) => {
                    error!(session_id = %id, error = %e, "failed to load credentials");
                    if let Some(sink) = &sink {
                        sink.reply(CreateOutcome::Failed {
                            message: CREATE_FAILED.into(),
                        });
                    }
                    this.remove_incarnation(&id, generation).await;
                    return;
                },
            };

            let (connection, events) = match this.inner.transport.connect(&id, auth).await {
                Ok(opened) => opened,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "failed to open connection");
                    this.handle_close(&id, generation, sink, Closed::LinkLost).await;
                    return;
                },
            };

            let attached = this.inner.registry.update(&id, generation, |session| {
                session.state = LifecycleState::Connecting;
                session.set_connection(Some(Arc::clone(&connection)));
            });
            if attached.is_none() {
                debug!(session_id = %id, "session removed while connecting");
                let _ = connection.logout().await;
                return;
            }

            tokio::spawn(this.run_events(id, generation, sink, connection, events));
        })
    }

    async fn run_events(
        self,
        id: String,
        generation: u64,
        sink: Option<ResponseSink>,
        connection: Arc<dyn Connection>,
        mut events: EventReceiver,
    ) {
        while let Some(event) = events.recv().await {
            if !self.inner.registry.is_current(&id, generation) {
                debug!(session_id = %id, "session gone, stopping event loop");
                return;
            }
            match event {
                TransportEvent::CredsUpdate(state) => {
                    if let Err(e) = self.inner.credentials.save(&id, &state).await {
                        warn!(session_id = %id, error = %e, "failed to persist credentials");
                    }
                },
                TransportEvent::ChatsSet(chats) => {
                    self.inner
                        .registry
                        .update(&id, generation, |session| session.chats = chats);
                },
                TransportEvent::MessagesUpsert(batch) => {
                    self.inner.classifier.handle_upsert(&id, batch);
                },
                TransportEvent::ConnectionUpdate(update) => {
                    let flow = self
                        .on_connection_update(&id, generation, sink.as_ref(), &connection, update)
                        .await;
                    if flow == Flow::Stop {
                        return;
                    }
                },
            }
        }

        if self.inner.registry.is_current(&id, generation) {
            warn!(session_id = %id, "event stream ended without close notification");
            self.handle_close(&id, generation, sink, Closed::LinkLost).await;
        }
    }

    async fn on_connection_update(
        &self,
        id: &str,
        generation: u64,
        sink: Option<&ResponseSink>,
        connection: &Arc<dyn Connection>,
        update: ConnectionUpdate,
    ) -> Flow {
        match update.connection {
            Some(ConnectionStatus::Open) => {
                self.inner.policy.reset(id);
                let user = update.user.clone();
                self.inner.registry.update(id, generation, |session| {
                    session.state = LifecycleState::Open;
                    if user.is_some() {
                        session.user = user;
                    }
                });
                info!(session_id = id, user = ?update.user, "session open");
                if let Some(sink) = sink {
                    sink.reply(CreateOutcome::Connected);
                }
            },
            Some(ConnectionStatus::Close) => {
                self.handle_close(
                    id,
                    generation,
                    sink.cloned(),
                    Closed::Reported(update.status_code),
                )
                .await;
                return Flow::Stop;
            },
            Some(ConnectionStatus::Connecting) | None => {},
        }

        match update.qr {
            Some(challenge) => {
                self.on_challenge(id, generation, sink, connection, &challenge)
                    .await
            },
            None => Flow::Continue,
        }
    }

    async fn on_challenge(
        &self,
        id: &str,
        generation: u64,
        sink: Option<&ResponseSink>,
        connection: &Arc<dyn Connection>,
        challenge: &str,
    ) -> Flow {
        match sink {
            Some(sink) if !sink.is_replied() => match qr::to_data_url(challenge) {
                Ok(qr) => {
                    self.inner.registry.update(id, generation, |session| {
                        session.state = LifecycleState::AwaitingAuth;
                    });
                    sink.reply(CreateOutcome::Challenge { qr });
                    info!(session_id = id, "authentication challenge issued");
                    return Flow::Continue;
                },
                Err(e) => {
                    warn!(session_id = id, error = %e, "failed to encode challenge");
                    sink.reply(CreateOutcome::Failed {
                        message: QR_FAILED.into(),
                    });
                },
            },
            Some(_) => {
                let e = Error::ChallengeReissued {
                    session_id: id.to_string(),
                };
                warn!(session_id = id, error = %e, "tearing session down");
            },
            None => {
                warn!(
                    session_id = id,
                    "stored credentials rejected, tearing session down"
                );
            },
        }

        if let Err(e) = connection.logout().await {
            debug!(session_id = id, error = %e, "logout failed");
        }
        self.remove_incarnation(id, generation).await;
        Flow::Stop
    }

    /// Classify a disconnect: remove the session for good, or schedule a
    /// reconnect for the same generation.
    ///
    /// Credentials are only deleted when the protocol closed the session.
    /// Exhausting retries on a lost link keeps them for the next bootstrap.
    async fn handle_close(
        &self,
        id: &str,
        generation: u64,
        sink: Option<ResponseSink>,
        closed: Closed,
    ) {
        if !self.inner.registry.is_current(id, generation) {
            return;
        }

        let status_code = match closed {
            Closed::Reported(code) => code,
            Closed::LinkLost => None,
        };
        let reason = DisconnectReason::from_status(status_code);
        let terminal =
            reason == DisconnectReason::LoggedOut || !self.inner.policy.should_retry(id);

        if terminal {
            info!(session_id = id, ?reason, "session closed permanently");
            self.inner.registry.update(id, generation, |session| {
                session.state = if reason == DisconnectReason::LoggedOut {
                    LifecycleState::LoggedOut
                } else {
                    LifecycleState::Closed
                };
                session.set_connection(None);
            });
            if let Some(sink) = &sink {
                sink.reply(CreateOutcome::Failed {
                    message: CREATE_FAILED.into(),
                });
            }
            if closed == Closed::LinkLost {
                if self.inner.registry.remove_if_current(id, generation).is_some() {
                    self.inner.policy.reset(id);
                    warn!(session_id = id, "transport unreachable, credentials kept");
                }
            } else {
                self.remove_incarnation(id, generation).await;
            }
            return;
        }

        let delay = self.inner.policy.delay_for(reason);
        let scheduled = self.inner.registry.update(id, generation, |session| {
            session.state = LifecycleState::Closed;
            session.set_connection(None);
        });
        if scheduled.is_none() {
            return;
        }
        info!(
            session_id = id,
            ?reason,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "connection closed, reconnect scheduled"
        );

        let this = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            sleep_unless_zero(delay).await;
            if !this.inner.registry.is_current(&id, generation) {
                debug!(session_id = %id, generation, "discarding stale reconnect");
                return;
            }
            this.open(id, generation, sink).await;
        });
    }

    /// Remove an incarnation and its artifacts, unless it was replaced.
    async fn remove_incarnation(&self, id: &str, generation: u64) {
        if self
            .inner
            .registry
            .remove_if_current(id, generation)
            .is_some()
        {
            self.purge(id).await;
        }
    }

    async fn purge(&self, id: &str) {
        if let Err(e) = self.inner.credentials.remove(id).await {
            warn!(session_id = id, error = %e, "failed to remove credentials");
        }
        self.inner.policy.reset(id);
    }
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
