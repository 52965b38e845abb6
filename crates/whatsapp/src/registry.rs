//! Process-wide session map.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    Error, Result,
    transport::Connection,
    types::{Chat, LifecycleState},
};

/// One managed session.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub state: LifecycleState,
    /// Account JID once authenticated.
    pub user: Option<String>,
    /// Chat metadata cached from the connection.
    pub chats: Vec<Chat>,
    /// Reconnect attempts in the current disconnected period.
    pub retry_count: u32,
    /// Token identifying this incarnation of the id; bumps on every create.
    pub generation: u64,
    connection: Option<Arc<dyn Connection>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("user", &self.user)
            .field("retry_count", &self.retry_count)
            .field("generation", &self.generation)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(id: &str, generation: u64) -> Self {
        Self {
            id: id.to_string(),
            state: LifecycleState::Connecting,
            user: None,
            chats: Vec::new(),
            retry_count: 0,
            generation,
            connection: None,
        }
    }

    /// Live connection, if one was opened.
    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    pub(crate) fn set_connection(&mut self, connection: Option<Arc<dyn Connection>>) {
        self.connection = connection;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Mapping `id → Session`, written only by the lifecycle manager.
///
/// Locks are never held across `.await` points.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn contains(&self, id: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<Session> = sessions.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Register a fresh `Connecting` session unless `id` is taken.
    pub(crate) fn insert_if_absent(&self, id: &str, generation: u64) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(id) {
            return Err(Error::conflict(id));
        }
        sessions.insert(id.to_string(), Session::new(id, generation));
        Ok(())
    }

    /// Whether `id` is still the incarnation identified by `generation`.
    pub fn is_current(&self, id: &str, generation: u64) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(id)
            .is_some_and(|session| session.generation == generation)
    }

    /// Mutate the entry for `id` if it is still at `generation`. Returns
    /// `None` when the entry is gone or was replaced.
    pub(crate) fn update<R>(
        &self,
        id: &str,
        generation: u64,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .get_mut(id)
            .filter(|session| session.generation == generation)
            .map(f)
    }

    /// Remove `id`, whatever its generation.
    pub(crate) fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id)
    }

    /// Remove `id` only if it is still at `generation`.
    pub(crate) fn remove_if_current(&self, id: &str, generation: u64) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.get(id)?.generation != generation {
            return None;
        }
        sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_absent_rejects_duplicates() {
        let registry = SessionRegistry::default();
        registry.insert_if_absent("a", 1).unwrap();
        let err = registry.insert_if_absent("a", 2).unwrap_err();
        assert!(matches!(err, Error::Conflict { session_id } if session_id == "a"));
        assert_eq!(registry.get("a").unwrap().generation, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn updates_are_generation_guarded() {
        let registry = SessionRegistry::default();
        registry.insert_if_absent("a", 1).unwrap();

        assert!(
            registry
                .update("a", 2, |s| s.state = LifecycleState::Open)
                .is_none()
        );
        assert_eq!(registry.get("a").unwrap().state, LifecycleState::Connecting);

        registry.update("a", 1, |s| s.state = LifecycleState::Open);
        assert_eq!(registry.get("a").unwrap().state, LifecycleState::Open);

        assert!(registry.remove_if_current("a", 2).is_none());
        assert!(registry.remove_if_current("a", 1).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_generation_after_recreate() {
        let registry = SessionRegistry::default();
        registry.insert_if_absent("a", 1).unwrap();
        registry.remove("a");
        registry.insert_if_absent("a", 2).unwrap();
        assert!(!registry.is_current("a", 1));
        assert!(registry.is_current("a", 2));
    }
}
