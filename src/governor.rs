//! Requests-per-minute and tokens-per-minute admission control
//!
//! Keeps a trailing 60 second window of request timestamps and token
//! records. A limit of zero disables that dimension.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::utils::Clock;

/// Length of the trailing window
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct RateWindow {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    /// Drops entries older than [`WINDOW`]. Both queues are time-ordered.
    fn purge(&mut self, now: Instant) {
        let stale = |stamp: Instant| now.saturating_duration_since(stamp) > WINDOW;

        while self.requests.front().is_some_and(|stamp| stale(*stamp)) {
            self.requests.pop_front();
        }
        while self.tokens.front().is_some_and(|(stamp, _)| stale(*stamp)) {
            self.tokens.pop_front();
        }
    }

    fn token_sum(&self) -> u64 {
        self.tokens.iter().map(|(_, tokens)| tokens).sum()
    }
}

/// Process-wide rate governor shared by all relays
pub struct RateGovernor {
    rpm_limit: u32,
    tpm_limit: u64,
    window: Mutex<RateWindow>,
    clock: Arc<dyn Clock>,
}

impl RateGovernor {
    pub fn new(rpm_limit: u32, tpm_limit: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rpm_limit,
            tpm_limit,
            window: Mutex::new(RateWindow::default()),
            clock,
        }
    }

    /// Whether a request costing `tokens` fits in the current window.
    pub fn can_admit(&self, tokens: u64) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.purge(now);

        if self.rpm_limit > 0 && window.requests.len() >= self.rpm_limit as usize {
            debug!(
                requests = window.requests.len(),
                rpm_limit = self.rpm_limit,
                "Request limit reached"
            );
            return false;
        }

        let used = window.token_sum();
        if self.tpm_limit > 0 && used.saturating_add(tokens) > self.tpm_limit {
            debug!(
                used = used,
                requested = tokens,
                tpm_limit = self.tpm_limit,
                "Token limit reached"
            );
            return false;
        }

        true
    }

    /// Records a completed request that consumed `tokens`.
    pub fn record(&self, tokens: u64) {
        let now = self.clock.now();
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.requests.push_back(now);
        window.tokens.push_back((now, tokens));
        window.purge(now);
    }

    /// `(requests, tokens)` currently in the window
    pub fn snapshot(&self) -> (usize, u64) {
        let now = self.clock.now();
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.purge(now);
        (window.requests.len(), window.token_sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn governor(rpm: u32, tpm: u64) -> (RateGovernor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateGovernor::new(rpm, tpm, clock.clone()), clock)
    }

    #[test]
    fn test_token_limit_is_inclusive() {
        let (governor, _clock) = governor(0, 1000);
        governor.record(400);
        assert!(governor.can_admit(600));
        assert!(!governor.can_admit(601));
    }

    #[test]
    fn test_zero_limits_are_unlimited() {
        let (governor, _clock) = governor(0, 0);
        for _ in 0..100 {
            governor.record(u64::MAX / 200);
        }
        assert!(governor.can_admit(u64::MAX));
    }

    #[test]
    fn test_entry_at_exactly_sixty_seconds_still_counts() {
        let (governor, clock) = governor(1, 0);
        governor.record(0);
        clock.advance(WINDOW);
        assert!(!governor.can_admit(0));
        clock.advance(Duration::from_millis(1));
        assert!(governor.can_admit(0));
    }

    #[test]
    fn test_snapshot() {
        let (governor, clock) = governor(10, 1000);
        governor.record(100);
        clock.advance(Duration::from_secs(30));
        governor.record(50);
        assert_eq!(governor.snapshot(), (2, 150));

        clock.advance(Duration::from_secs(31));
        assert_eq!(governor.snapshot(), (1, 50));
    }
}
