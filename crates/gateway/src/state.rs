use std::{sync::Arc, time::Duration};

use {fastzap_whatsapp::SessionManager, secrecy::Secret};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    /// Expected `Authorization` token; `None` leaves the API open.
    pub token: Option<Arc<Secret<String>>>,
    /// How long `POST /sessions/add` waits for the first creation outcome.
    pub create_timeout: Duration,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        sessions: SessionManager,
        token: Option<Secret<String>>,
        create_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            token: token.map(Arc::new),
            create_timeout,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
