use thiserror::Error;

/// Crate-wide result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Session lifecycle, classification and delivery errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A session with this id already exists.
    #[error("session already exists: {session_id}")]
    Conflict { session_id: String },

    /// The id cannot name a session (empty, or not a single path segment).
    #[error("invalid session id: {session_id:?}")]
    InvalidSessionId { session_id: String },

    /// The requested session is not registered.
    #[error("unknown session: {session_id}")]
    UnknownSession { session_id: String },

    /// The session has no live connection yet.
    #[error("session not connected: {session_id}")]
    NotConnected { session_id: String },

    /// A second challenge arrived after the creation request was answered.
    #[error("authentication challenge reissued for session {session_id}")]
    ChallengeReissued { session_id: String },

    /// The transport (sidecar) failed or reported an error.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Loading, saving or removing credentials failed.
    #[error("credential store error for session {session_id}: {source}")]
    Credentials {
        session_id: String,
        #[source]
        source: std::io::Error,
    },

    /// Media download for a single message failed.
    #[error("attachment resolution failed: {message}")]
    Attachment { message: String },

    /// A webhook call failed.
    #[error("webhook delivery failed: {message}")]
    Delivery { message: String },

    #[error("{message}")]
    Message { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn conflict(session_id: impl Into<String>) -> Self {
        Self::Conflict {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_session_id(session_id: impl Into<String>) -> Self {
        Self::InvalidSessionId {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        Self::UnknownSession {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn attachment(message: impl std::fmt::Display) -> Self {
        Self::Attachment {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn delivery(message: impl std::fmt::Display) -> Self {
        Self::Delivery {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn credentials(session_id: impl Into<String>, source: std::io::Error) -> Self {
        Self::Credentials {
            session_id: session_id.into(),
            source,
        }
    }
}

impl fastzap_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

fastzap_common::impl_context!(Error);
