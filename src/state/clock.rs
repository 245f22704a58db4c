use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Source of "now" for room actors, in epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock anchored once, then advanced with tokio's monotonic clock.
///
/// Under a paused tokio runtime this clock only moves when the runtime
/// auto-advances or `tokio::time::advance` is called.
#[derive(Debug, Clone)]
pub struct TokioClock {
    epoch_ms: u64,
    started: Instant,
}

impl TokioClock {
    /// Anchor the clock to the current system time.
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::anchored_at(epoch_ms)
    }

    /// Anchor the clock to an explicit epoch value.
    pub fn anchored_at(epoch_ms: u64) -> Self {
        Self {
            epoch_ms,
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.started.elapsed().as_millis() as u64
    }
}

/// Convert epoch milliseconds back into a [`SystemTime`].
pub fn system_time_from_ms(epoch_ms: u64) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_millis(epoch_ms)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_runtime() {
        let clock = TokioClock::anchored_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 3_500);
    }
}
