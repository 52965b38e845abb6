//! Per-session credential persistence.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use crate::{Error, Result, types::AuthState};

/// Prefix of a persisted session directory.
pub const SESSION_PREFIX: &str = "md_";

/// Load/save capability for authentication material.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load credentials for a session. A session that was never saved yields
    /// an empty state, which makes the transport issue a fresh challenge.
    async fn load(&self, session_id: &str) -> Result<AuthState>;

    /// Persist refreshed credentials.
    async fn save(&self, session_id: &str, state: &AuthState) -> Result<()>;

    /// Remove every artifact for a session. Missing artifacts are not an error.
    async fn remove(&self, session_id: &str) -> Result<()>;

    /// Ids of all persisted sessions.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Stores credentials as `<dir>/md_<id>/creds.json`.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{SESSION_PREFIX}{session_id}")))
    }

    fn creds_path(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self.session_dir(session_id)?.join("creds.json"))
    }

    fn store_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}_store.json")))
    }
}

/// Check that `session_id` can name on-disk artifacts: non-empty, with no
/// path separators, no `..` and no NUL.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let invalid = session_id.is_empty()
        || session_id.contains(['/', '\\', '\0'])
        || session_id.contains("..");
    if invalid {
        return Err(Error::invalid_session_id(session_id));
    }
    Ok(())
}

/// Extract a session id from a directory entry name, following the
/// `md_<id>` convention. Store artifacts (`*_store`) are skipped and a
/// trailing `.json` is ignored.
pub fn session_id_from_entry(name: &str) -> Option<&str> {
    if !name.starts_with(SESSION_PREFIX) || name.ends_with("_store") {
        return None;
    }
    let name = name.strip_suffix(".json").unwrap_or(name);
    let id = &name[SESSION_PREFIX.len()..];
    (!id.is_empty()).then_some(id)
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Attempt every removal, then report the first failure.
async fn remove_each<F, Fut>(
    paths: impl IntoIterator<Item = PathBuf>,
    remove: F,
) -> std::io::Result<()>
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut first_error = None;
    for path in paths {
        let shown = path.display().to_string();
        if let Err(e) = remove(path).await {
            warn!(path = %shown, error = %e, "failed to remove credential artifact");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, session_id: &str) -> Result<AuthState> {
        match tokio::fs::read(self.creds_path(session_id)?).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(session_id, "no stored credentials, starting fresh");
                Ok(AuthState::default())
            },
            Err(e) => Err(Error::credentials(session_id, e)),
        }
    }

    async fn save(&self, session_id: &str, state: &AuthState) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::credentials(session_id, e))?;
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(dir.join("creds.json"), bytes)
            .await
            .map_err(|e| Error::credentials(session_id, e))
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        let paths = [self.session_dir(session_id)?, self.store_path(session_id)?];
        remove_each(paths, |path| async move { remove_path(&path).await })
            .await
            .map_err(|e| Error::credentials(session_id, e))
    }

    async fn list(&self) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(session_id_from_entry) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
