//! Integration tests for the token middleware protecting the sessions API.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::Secret,
    serde_json::Value,
    tokio::{net::TcpListener, sync::mpsc},
};

use {
    fastzap_gateway::{AppState, build_gateway_app},
    fastzap_whatsapp::{
        AttachmentResolver, Connection, CredentialStore, EventClassifier, EventSink,
        ManagerOptions, MediaKind, NormalizedEvent, Result, SessionManager, Transport,
        transport::EventReceiver,
        types::{AuthState, TransportEvent},
    },
};

/// Transport whose connections never produce events.
#[derive(Default)]
struct SilentTransport {
    open: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

struct SilentConnection;

#[async_trait]
impl Transport for SilentTransport {
    async fn connect(
        &self,
        _session_id: &str,
        _auth: AuthState,
    ) -> Result<(Arc<dyn Connection>, EventReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.open.lock().unwrap().push(tx);
        Ok((Arc::new(SilentConnection), rx))
    }
}

#[async_trait]
impl Connection for SilentConnection {
    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn send_message(&self, _to: &str, _content: Value) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn on_whatsapp(&self, _jid: &str) -> Result<bool> {
        Ok(false)
    }

    async fn group_metadata(&self, _jid: &str) -> Result<Value> {
        Ok(Value::Null)
    }
}

struct Nothing;

#[async_trait]
impl CredentialStore for Nothing {
    async fn load(&self, _session_id: &str) -> Result<AuthState> {
        Ok(AuthState::default())
    }

    async fn save(&self, _session_id: &str, _state: &AuthState) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl EventSink for Nothing {
    async fn deliver(&self, _event: NormalizedEvent) {}
}

#[async_trait]
impl AttachmentResolver for Nothing {
    async fn resolve(&self, _body: &Value, _kind: MediaKind) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Start a gateway with `token` configured and one registered session `known`.
async fn start_server(token: Option<&str>) -> SocketAddr {
    let sessions = SessionManager::new(
        Arc::new(SilentTransport::default()),
        Arc::new(Nothing),
        Arc::new(EventClassifier::new(Arc::new(Nothing), Arc::new(Nothing))),
        ManagerOptions::default(),
    );
    sessions.create("known", None).await.unwrap();

    let state = AppState::new(
        sessions,
        token.map(|t| Secret::new(t.to_string())),
        Duration::from_secs(1),
    );
    let app = build_gateway_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn get(addr: SocketAddr, path: &str, auth: Option<&str>) -> (u16, Value) {
    let mut request = reqwest::Client::new().get(format!("http://{addr}{path}"));
    if let Some(auth) = auth {
        request = request.header("authorization", auth);
    }
    let resp = request.send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn missing_token_is_forbidden() {
    let addr = start_server(Some("s3cret")).await;
    let (status, body) = get(addr, "/sessions/find/known", None).await;
    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No token sent!");
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let addr = start_server(Some("s3cret")).await;
    let (status, body) = get(addr, "/sessions/find/known", Some("guess")).await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn raw_and_bearer_tokens_pass() {
    let addr = start_server(Some("s3cret")).await;
    for auth in ["s3cret", "Bearer s3cret"] {
        let (status, body) = get(addr, "/sessions/find/known", Some(auth)).await;
        assert_eq!(status, 200, "authorization {auth:?}");
        assert_eq!(body["message"], "Session found.");
    }
}

#[tokio::test]
async fn token_is_checked_before_session_lookup() {
    let addr = start_server(Some("s3cret")).await;
    let (status, _) = get(addr, "/sessions/find/ghost", None).await;
    assert_eq!(status, 403);

    let (status, body) = get(addr, "/sessions/find/ghost", Some("s3cret")).await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Session not found.");
}

#[tokio::test]
async fn health_needs_no_token() {
    let addr = start_server(Some("s3cret")).await;
    let (status, body) = get(addr, "/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["sessions"], 1);
}

#[tokio::test]
async fn no_configured_token_leaves_api_open() {
    let addr = start_server(None).await;
    let (status, body) = get(addr, "/sessions/status/known", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "unauthenticated");
}
