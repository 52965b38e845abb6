//! Outbound message pacing.

use std::time::Duration;

use rand::Rng;

/// Uniform random delay applied before each outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendJitter {
    min: Duration,
    max: Duration,
}

impl Default for SendJitter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(4))
    }
}

impl SendJitter {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
    }

    pub async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
