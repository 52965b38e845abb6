//! Transport backed by a Baileys sidecar reached over a WebSocket.
//!
//! One socket carries every session. Outgoing frames are [`GatewayMessage`]s;
//! incoming frames are [`SidecarMessage`]s, either events routed to the
//! owning session or responses matched to a pending request by id.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    attachment::{AttachmentResolver, MediaKind},
    transport::{Connection, EventReceiver, EventSender, Transport},
    types::{AuthState, Chat, ConnectionUpdate, MessagesUpsert, TransportEvent},
};

/// Frames sent to the sidecar. Every request carries an id the sidecar
/// echoes back in its [`SidecarMessage::Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login {
        request_id: String,
        session_id: String,
        auth: AuthState,
    },
    Logout {
        request_id: String,
        session_id: String,
    },
    SendMessage {
        request_id: String,
        session_id: String,
        to: String,
        content: Value,
    },
    OnWhatsapp {
        request_id: String,
        session_id: String,
        jid: String,
    },
    GroupMetadata {
        request_id: String,
        session_id: String,
        jid: String,
    },
    DownloadMedia {
        request_id: String,
        kind: MediaKind,
        message: Value,
    },
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    ConnectionUpdate {
        session_id: String,
        update: ConnectionUpdate,
    },
    MessagesUpsert {
        session_id: String,
        upsert: MessagesUpsert,
    },
    CredsUpdate {
        session_id: String,
        creds: AuthState,
    },
    ChatsSet {
        session_id: String,
        chats: Vec<Chat>,
    },
    Response {
        request_id: String,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

type Pending = oneshot::Sender<Result<Value>>;

/// Event channel of one connection, tagged so a newer connection under the
/// same session id is never unrouted by an older one.
struct Route {
    token: u64,
    tx: EventSender,
}

struct Shared {
    url: String,
    request_timeout: Duration,
    writer: tokio::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    routes: RwLock<HashMap<String, Route>>,
    next_route: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
}

/// [`Transport`] over a sidecar WebSocket, connected lazily and reopened
/// on demand after the socket drops.
#[derive(Clone)]
pub struct SidecarTransport {
    shared: Arc<Shared>,
}

impl SidecarTransport {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                request_timeout,
                writer: tokio::sync::Mutex::new(None),
                routes: RwLock::new(HashMap::new()),
                next_route: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }
}

impl Shared {
    /// Writer for the live socket, connecting first if there is none.
    async fn link(self: &Arc<Self>) -> Result<mpsc::UnboundedSender<String>> {
        let mut writer = self.writer.lock().await;
        if let Some(tx) = writer.as_ref()
            && !tx.is_closed()
        {
            return Ok(tx.clone());
        }

        info!(url = %self.url, "connecting to sidecar");
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(Error::transport)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(self).run_socket(stream, rx));
        *writer = Some(tx.clone());
        Ok(tx)
    }

    async fn run_socket(
        self: Arc<Self>,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut write_rx: mpsc::UnboundedReceiver<String>,
    ) {
        let (mut sink, mut reader) = stream.split();
        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("sidecar closed the socket");
                        break;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "sidecar socket error");
                        break;
                    },
                },
                outgoing = write_rx.recv() => match outgoing {
                    Some(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            warn!(error = %e, "failed to write to sidecar");
                            break;
                        }
                    },
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    },
                },
            }
        }
        self.teardown();
    }

    /// Drop every route and fail every pending request. Session event
    /// streams end, which the manager treats as a disconnect.
    fn teardown(&self) {
        let routes = std::mem::take(&mut *self.routes.write().unwrap_or_else(|e| e.into_inner()));
        let pending =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        warn!(
            sessions = routes.len(),
            pending = pending.len(),
            "sidecar link lost"
        );
        for (_, waiter) in pending {
            let _ = waiter.send(Err(Error::transport("sidecar link lost")));
        }
    }

    fn dispatch(&self, text: &str) {
        let message: SidecarMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unparsable sidecar frame");
                return;
            },
        };
        let (session_id, event) = match message {
            SidecarMessage::Response {
                request_id,
                ok,
                result,
                error,
            } => {
                let waiter = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&request_id);
                match waiter {
                    Some(waiter) => {
                        let outcome = if ok {
                            Ok(result)
                        } else {
                            Err(Error::transport(
                                error.unwrap_or_else(|| "request failed".into()),
                            ))
                        };
                        let _ = waiter.send(outcome);
                    },
                    None => debug!(%request_id, "response for unknown request"),
                }
                return;
            },
            SidecarMessage::ConnectionUpdate { session_id, update } => {
                (session_id, TransportEvent::ConnectionUpdate(update))
            },
            SidecarMessage::MessagesUpsert { session_id, upsert } => {
                (session_id, TransportEvent::MessagesUpsert(upsert))
            },
            SidecarMessage::CredsUpdate { session_id, creds } => {
                (session_id, TransportEvent::CredsUpdate(creds))
            },
            SidecarMessage::ChatsSet { session_id, chats } => {
                (session_id, TransportEvent::ChatsSet(chats))
            },
        };

        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        match routes.get(&session_id) {
            Some(route) => {
                let _ = route.tx.send(event);
            },
            None => debug!(%session_id, "event for unrouted session"),
        }
    }

    /// Send a request built from a fresh id and wait for its response.
    async fn request(
        self: &Arc<Self>,
        build: impl FnOnce(String) -> GatewayMessage,
    ) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&build(request_id.clone()))?;
        let writer = self.link().await?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id.clone(), tx);
        if writer.send(frame).is_err() {
            self.forget(&request_id);
            return Err(Error::transport("sidecar link closed"));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::transport("sidecar link lost")),
            Err(_) => {
                self.forget(&request_id);
                Err(Error::transport(format!(
                    "sidecar did not answer within {}s",
                    self.request_timeout.as_secs()
                )))
            },
        }
    }

    fn forget(&self, request_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
    }

    fn route(&self, session_id: &str, tx: EventSender) -> u64 {
        let token = self.next_route.fetch_add(1, Ordering::Relaxed);
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), Route { token, tx });
        token
    }

    /// Drop the route for `session_id` if it is still the one `token` was
    /// issued for.
    fn unroute(&self, session_id: &str, token: u64) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes
            .get(session_id)
            .is_some_and(|route| route.token == token)
        {
            routes.remove(session_id);
        }
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(
        &self,
        session_id: &str,
        auth: AuthState,
    ) -> Result<(Arc<dyn Connection>, EventReceiver)> {
        // Route first so no event after the login ack is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        let route = self.shared.route(session_id, tx);

        let login = self
            .shared
            .request(|request_id| GatewayMessage::Login {
                request_id,
                session_id: session_id.to_string(),
                auth,
            })
            .await;
        if let Err(e) = login {
            self.shared.unroute(session_id, route);
            return Err(e);
        }

        let connection = SidecarConnection {
            session_id: session_id.to_string(),
            shared: Arc::clone(&self.shared),
            route,
        };
        Ok((Arc::new(connection), rx))
    }
}

#[async_trait]
impl AttachmentResolver for SidecarTransport {
    async fn resolve(&self, body: &Value, kind: MediaKind) -> Result<Value> {
        self.shared
            .request(|request_id| GatewayMessage::DownloadMedia {
                request_id,
                kind,
                message: body.clone(),
            })
            .await
            .map_err(Error::attachment)
    }
}

/// One session's handle on the shared sidecar socket. Its route lives as
/// long as the handle.
struct SidecarConnection {
    session_id: String,
    shared: Arc<Shared>,
    route: u64,
}

impl Drop for SidecarConnection {
    fn drop(&mut self) {
        self.shared.unroute(&self.session_id, self.route);
    }
}

#[async_trait]
impl Connection for SidecarConnection {
    async fn logout(&self) -> Result<()> {
        let result = self
            .shared
            .request(|request_id| GatewayMessage::Logout {
                request_id,
                session_id: self.session_id.clone(),
            })
            .await;
        self.shared.unroute(&self.session_id, self.route);
        result.map(|_| ())
    }

    async fn send_message(&self, to: &str, content: Value) -> Result<Value> {
        self.shared
            .request(|request_id| GatewayMessage::SendMessage {
                request_id,
                session_id: self.session_id.clone(),
                to: to.to_string(),
                content,
            })
            .await
    }

    async fn on_whatsapp(&self, jid: &str) -> Result<bool> {
        let result = self
            .shared
            .request(|request_id| GatewayMessage::OnWhatsapp {
                request_id,
                session_id: self.session_id.clone(),
                jid: jid.to_string(),
            })
            .await?;
        Ok(result
            .get("exists")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn group_metadata(&self, jid: &str) -> Result<Value> {
        self.shared
            .request(|request_id| GatewayMessage::GroupMetadata {
                request_id,
                session_id: self.session_id.clone(),
                jid: jid.to_string(),
            })
            .await
    }
}
