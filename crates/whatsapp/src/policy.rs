//! Reconnection decisions.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use tracing::info;

use crate::types::DisconnectReason;

/// Reconnect attempts per session for the current disconnected period.
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn get(&self, session_id: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(session_id).copied().unwrap_or(0)
    }

    /// Increment the count for `session_id` if it is below `max`.
    /// Returns the new count, or `None` when exhausted.
    fn try_increment(&self, session_id: &str, max: u32) -> Option<u32> {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let current = attempts.get(session_id).copied().unwrap_or(0);
        if current >= max {
            return None;
        }
        attempts.insert(session_id.to_string(), current + 1);
        Some(current + 1)
    }

    pub fn clear(&self, session_id: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(session_id);
    }
}

/// Fixed-interval, bounded reconnection policy.
#[derive(Debug)]
pub struct ReconnectPolicy {
    max_retries: u32,
    interval: Duration,
    tracker: RetryTracker,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl ReconnectPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
            tracker: RetryTracker::default(),
        }
    }

    /// Configured maximum, floored at 1.
    pub fn effective_max(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Record a reconnect attempt for `session_id` if the budget allows it.
    pub fn should_retry(&self, session_id: &str) -> bool {
        match self
            .tracker
            .try_increment(session_id, self.effective_max())
        {
            Some(attempts) => {
                info!(session_id, attempts, "reconnecting");
                true
            },
            None => false,
        }
    }

    /// Delay before the next connection attempt.
    pub fn delay_for(&self, reason: DisconnectReason) -> Duration {
        match reason {
            DisconnectReason::RestartRequired => Duration::ZERO,
            _ => self.interval,
        }
    }

    pub fn attempts(&self, session_id: &str) -> u32 {
        self.tracker.get(session_id)
    }

    /// Forget the retry history (successful open or final removal).
    pub fn reset(&self, session_id: &str) {
        self.tracker.clear(session_id);
    }
}
