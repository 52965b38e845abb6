use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::FastzapConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "fastzap.toml",
    "fastzap.yaml",
    "fastzap.yml",
    "fastzap.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<FastzapConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./fastzap.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/fastzap/fastzap.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `FastzapConfig::default()` if no file is found or parsing
/// fails.
pub fn discover_and_load() -> FastzapConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                FastzapConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            FastzapConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/fastzap/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fastzap").map(|d| d.config_dir().to_path_buf())
}

/// Apply the flat environment variables used by existing deployments.
pub fn apply_env_overrides(config: &mut FastzapConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut FastzapConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("TOKEN").filter(|t| !t.is_empty()) {
        config.auth.token = Some(Secret::new(token));
    }
    if let Some(url) = lookup("WEBHOOK_URL").filter(|u| !u.is_empty()) {
        config.webhook.url = Some(url);
    }
    if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
        config.server.bind = host;
    }
    if let Some(dir) = lookup("SESSIONS_DIR").filter(|d| !d.is_empty()) {
        config.sessions.dir = PathBuf::from(dir);
    }
    if let Some(url) = lookup("SIDECAR_URL").filter(|u| !u.is_empty()) {
        config.sidecar.url = url;
    }
    if let Some(port) = parse_var(&lookup, "PORT") {
        config.server.port = port;
    }
    if let Some(max) = parse_var(&lookup, "MAX_RETRIES") {
        config.sessions.max_retries = max;
    }
    if let Some(interval) = parse_var(&lookup, "RECONNECT_INTERVAL") {
        config.sessions.reconnect_interval_ms = interval;
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        },
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<FastzapConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("fastzap.yaml");
        std::fs::write(&yaml, "sessions:\n  max_retries: 4\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().sessions.max_retries, 4);

        let json = dir.path().join("fastzap.json");
        std::fs::write(&json, r#"{"server": {"port": 9100}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().server.port, 9100);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fastzap.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = FastzapConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            env(&[
                ("TOKEN", "abc"),
                ("WEBHOOK_URL", "http://hook"),
                ("MAX_RETRIES", "7"),
                ("RECONNECT_INTERVAL", "2500"),
                ("PORT", "9000"),
            ]),
        );
        assert_eq!(
            cfg.auth.token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("abc")
        );
        assert_eq!(cfg.webhook.url.as_deref(), Some("http://hook"));
        assert_eq!(cfg.sessions.max_retries, 7);
        assert_eq!(cfg.sessions.reconnect_interval_ms, 2500);
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn unparsable_override_is_ignored() {
        let mut cfg = FastzapConfig::default();
        apply_env_overrides_with(&mut cfg, env(&[("MAX_RETRIES", "lots"), ("TOKEN", "")]));
        assert_eq!(cfg.sessions.max_retries, 0);
        assert!(cfg.auth.token.is_none());
    }
}
