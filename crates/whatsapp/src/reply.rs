//! One-shot reply channel for a creation request.

use std::sync::{Arc, Mutex};

use {serde::Serialize, tokio::sync::oneshot};

/// What the caller of a creation request eventually learns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// A challenge to scan, as a `data:` URL.
    Challenge { qr: String },
    /// The session opened without needing a challenge.
    Connected,
    /// The session could not be created.
    Failed { message: String },
}

/// Shared handle to the reply side of a creation request.
///
/// Clones share one slot, so across reconnects at most one reply is ever
/// written regardless of which clone writes it.
#[derive(Clone, Debug)]
pub struct ResponseSink {
    slot: Arc<Mutex<Option<oneshot::Sender<CreateOutcome>>>>,
}

impl ResponseSink {
    /// Create a sink and the receiver the caller waits on.
    pub fn channel() -> (Self, oneshot::Receiver<CreateOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Whether a reply was already written.
    pub fn is_replied(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Write the reply. Returns `false` if one was already written; the
    /// slot is consumed even when the receiver has gone away.
    pub fn reply(&self, outcome: CreateOutcome) -> bool {
        let sender = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            },
            None => false,
        }
    }
}
