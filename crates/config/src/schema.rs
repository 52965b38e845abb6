/// Config schema types (server, auth, sessions, webhook, sidecar, outbound).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FastzapConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub sessions: SessionsConfig,
    pub webhook: WebhookConfig,
    pub sidecar: SidecarConfig,
    pub outbound: OutboundConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    /// Port to listen on. Defaults to 8000.
    pub port: u16,
    /// How long `POST /sessions/add` waits for a QR code or a connection.
    pub create_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            create_timeout_secs: 60,
        }
    }
}

/// API authentication.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static token expected in the `Authorization` header. When unset the
    /// API is open.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Session lifecycle and reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Directory holding `md_<id>` credential folders.
    pub dir: PathBuf,
    /// Reconnect attempts per disconnected period. Values below 1 count as 1.
    pub max_retries: u32,
    /// Fixed delay before a reconnect, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Restore every persisted session on startup.
    pub bootstrap: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("sessions"),
            max_retries: 0,
            reconnect_interval_ms: 0,
            bootstrap: true,
        }
    }
}

/// Outbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Endpoint receiving one POST per inbound message. Delivery is skipped
    /// when unset.
    pub url: Option<String>,
    /// Total attempts per event, the first call included.
    pub max_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_attempts: 3,
            timeout_secs: 10,
        }
    }
}

/// Baileys sidecar connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// WebSocket URL of the sidecar.
    pub url: String,
    /// Timeout for request/response calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8099".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Outbound message pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Lower bound of the random delay before each send, in milliseconds.
    pub jitter_min_ms: u64,
    /// Upper bound of the random delay before each send, in milliseconds.
    pub jitter_max_ms: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            jitter_min_ms: 1_000,
            jitter_max_ms: 4_000,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = FastzapConfig::default();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.sessions.max_retries, 0);
        assert_eq!(cfg.webhook.max_attempts, 3);
        assert!(cfg.webhook.url.is_none());
        assert!(cfg.auth.token.is_none());
        assert_eq!(cfg.outbound.jitter_max_ms, 4_000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: FastzapConfig = toml::from_str(
            r#"
            [sessions]
            max_retries = 5

            [webhook]
            url = "https://hooks.example.com/wa"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sessions.max_retries, 5);
        assert_eq!(cfg.sessions.dir, PathBuf::from("sessions"));
        assert_eq!(cfg.webhook.url.as_deref(), Some("https://hooks.example.com/wa"));
        assert_eq!(cfg.webhook.max_attempts, 3);
    }

    #[test]
    fn token_is_redacted_in_debug() {
        let cfg: FastzapConfig = toml::from_str("[auth]\ntoken = \"s3cret\"").unwrap();
        let debug = format!("{:?}", cfg.auth);
        assert!(!debug.contains("s3cret"));
        assert_eq!(
            cfg.auth.token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("s3cret")
        );
    }
}
