use std::time::Duration;

/// Exponential backoff state: explicit (attempt, next-delay) advanced
/// between I/O calls, so the retry loop stays cancellable.
#[derive(Debug, Clone)]
pub struct Backoff {
    next_delay: Duration,
    cap: Duration,
}

impl Backoff {
    pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

    pub fn new(initial: Duration) -> Self {
        Self {
            next_delay: initial,
            cap: Self::DEFAULT_CAP,
        }
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// The delay to sleep before the next attempt; doubles each call up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(self.cap);
        current
    }
}
