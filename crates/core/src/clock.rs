use std::time::Duration;
use tokio::time::Instant;

/// Monotonic time source for snapshot timestamps and window eviction.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's own epoch. Never decreases.
    fn now(&self) -> Duration;
}

/// Clock backed by the tokio timer, so tests running with paused time see the
/// same virtual timeline as the sampling loops.
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    epoch: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
