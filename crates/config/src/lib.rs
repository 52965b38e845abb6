//! Configuration loading and env substitution.
//!
//! Config files: `fastzap.toml`, `fastzap.yaml` or `fastzap.json`,
//! searched in `./` then `~/.config/fastzap/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file. Flat environment
//! variables (`TOKEN`, `WEBHOOK_URL`, `MAX_RETRIES`, ...) are applied last.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        AuthConfig, FastzapConfig, OutboundConfig, ServerConfig, SessionsConfig, SidecarConfig,
        WebhookConfig,
    },
};
