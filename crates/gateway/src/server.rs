use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::State,
        http::StatusCode,
        middleware,
        response::Response,
        routing::{delete, get, post},
    },
    serde_json::json,
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use {
    fastzap_config::FastzapConfig,
    fastzap_whatsapp::{
        EventClassifier, FileCredentialStore, ManagerOptions, ReconnectPolicy, SendJitter,
        SessionManager, SidecarTransport, WebhookDispatcher,
    },
};

use crate::{
    auth_middleware::{require_session, require_token},
    response::respond,
    session_routes,
    state::AppState,
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let known_session = Router::new()
        .route("/find/{id}", get(session_routes::find))
        .route("/status/{id}", get(session_routes::status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let sessions = Router::new()
        .merge(known_session)
        .route("/add", post(session_routes::add))
        .route("/delete/{id}", delete(session_routes::delete));

    Router::new()
        .nest("/sessions", sessions)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Wire the production stack, restore persisted sessions and serve until
/// ctrl-c.
pub async fn start_gateway(config: FastzapConfig) -> anyhow::Result<()> {
    let credentials = Arc::new(FileCredentialStore::new(&config.sessions.dir));
    let sidecar = SidecarTransport::new(
        config.sidecar.url.clone(),
        Duration::from_secs(config.sidecar.request_timeout_secs),
    );

    let webhook = WebhookDispatcher::new(
        config.webhook.url.clone(),
        config.webhook.max_attempts,
        Duration::from_secs(config.webhook.timeout_secs),
    )?;
    if webhook.url().is_none() {
        warn!("no webhook url configured, inbound messages will not be forwarded");
    }
    let classifier = Arc::new(EventClassifier::new(
        Arc::new(sidecar.clone()),
        Arc::new(webhook),
    ));

    let sessions = SessionManager::new(
        Arc::new(sidecar),
        credentials,
        classifier,
        ManagerOptions {
            policy: ReconnectPolicy::new(
                config.sessions.max_retries,
                Duration::from_millis(config.sessions.reconnect_interval_ms),
            ),
            send_jitter: SendJitter::new(
                Duration::from_millis(config.outbound.jitter_min_ms),
                Duration::from_millis(config.outbound.jitter_max_ms),
            ),
        },
    );

    if config.sessions.bootstrap {
        let restored = sessions.bootstrap().await?;
        info!(
            restored,
            dir = %config.sessions.dir.display(),
            "session bootstrap complete"
        );
    }

    if config.auth.token.is_none() {
        warn!("no api token configured, the sessions API is open");
    }
    let state = AppState::new(
        sessions,
        config.auth.token.clone(),
        Duration::from_secs(config.server.create_timeout_secs),
    );
    let app = build_gateway_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, sidecar = %config.sidecar.url, "fastzap gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("running cleanup before exit");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Response {
    respond(
        StatusCode::OK,
        "",
        json!({
            "status": "ok",
            "version": state.version,
            "sessions": state.sessions.list().len(),
        }),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        axum::{
            body::{Body, to_bytes},
            http::Request,
        },
        fastzap_whatsapp::{
            AttachmentResolver, Connection, CredentialStore, EventSink, MediaKind,
            NormalizedEvent, Result, Transport,
            transport::EventReceiver,
            types::{AuthState, ConnectionUpdate, TransportEvent},
        },
        serde_json::Value,
        std::sync::Mutex,
        tokio::sync::mpsc,
        tower::ServiceExt,
    };

    /// Every connection immediately asks for a QR scan.
    #[derive(Default)]
    struct ChallengeTransport {
        senders: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    }

    struct IdleConnection;

    #[async_trait]
    impl Connection for IdleConnection {
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

    #[async_trait]
    impl Transport for ChallengeTransport {
        async fn connect(
            &self,
            _session_id: &str,
            _auth: AuthState,
        ) -> Result<(Arc<dyn Connection>, EventReceiver)> {
            let (tx, rx) = mpsc::unbounded_channel();
            tx.send(TransportEvent::ConnectionUpdate(ConnectionUpdate {
                qr: Some("2@scan-me".into()),
                ..Default::default()
            }))
            .unwrap();
            self.senders.lock().unwrap().push(tx);
            Ok((Arc::new(IdleConnection), rx))
        }
    }

    struct NoCredentials;

    #[async_trait]
    impl CredentialStore for NoCredentials {
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

    struct Discard;

    #[async_trait]
    impl EventSink for Discard {
        async fn deliver(&self, _event: NormalizedEvent) {}
    }

    #[async_trait]
    impl AttachmentResolver for Discard {
        async fn resolve(&self, _body: &Value, _kind: MediaKind) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn app() -> Router {
        let sessions = SessionManager::new(
            Arc::new(ChallengeTransport::default()),
            Arc::new(NoCredentials),
            Arc::new(EventClassifier::new(Arc::new(Discard), Arc::new(Discard))),
            ManagerOptions::default(),
        );
        let state = AppState::new(
            sessions,
            None,
            Duration::from_secs(5),
        );
        build_gateway_app(state)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unknown_session_status_is_not_found() {
        let app = app();
        let (status, body) = call(&app, "GET", "/sessions/status/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let app = app();

        let (status, body) = call(
            &app,
            "POST",
            "/sessions/add",
            Some(json!({"id": "sales"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(
            body["data"]["qr"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );

        let (status, body) = call(
            &app,
            "POST",
            "/sessions/add",
            Some(json!({"id": "sales"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["message"],
            "Session already exists, please use another id."
        );

        let (status, body) = call(&app, "GET", "/sessions/find/sales", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Session found.");

        let (status, body) = call(&app, "GET", "/sessions/status/sales", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "unauthenticated");

        let (status, _) = call(&app, "DELETE", "/sessions/delete/sales", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "GET", "/sessions/find/sales", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_unknown_session_succeeds() {
        let app = app();
        let (status, body) = call(&app, "DELETE", "/sessions/delete/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn blank_id_is_rejected() {
        let app = app();
        let (status, _) = call(&app, "POST", "/sessions/add", Some(json!({"id": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let app = app();
        for id in ["x/../victim", "..", "a\\b"] {
            let (status, _) = call(&app, "POST", "/sessions/add", Some(json!({"id": id}))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{id:?}");
        }
        let (status, _) = call(&app, "GET", "/sessions/find/x", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_with_encoded_traversal_leaves_siblings() {
        let root = tempfile::tempdir().unwrap();
        let sessions_dir = root.path().join("sessions");
        let victim = root.path().join("victim");
        std::fs::create_dir(&victim).unwrap();
        let credentials = Arc::new(FileCredentialStore::new(&sessions_dir));
        credentials.save("x", &AuthState::default()).await.unwrap();

        let sessions = SessionManager::new(
            Arc::new(ChallengeTransport::default()),
            credentials,
            Arc::new(EventClassifier::new(Arc::new(Discard), Arc::new(Discard))),
            ManagerOptions::default(),
        );
        let app = build_gateway_app(AppState::new(sessions, None, Duration::from_secs(5)));

        let (status, body) = call(
            &app,
            "DELETE",
            "/sessions/delete/x%2F..%2F..%2Fvictim",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(victim.exists());
        assert!(sessions_dir.join("md_x").exists());
    }
}
