use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Default budget: 5 report submissions per trailing minute.
pub const DEFAULT_MAX_CALLS: usize = 5;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Sliding-window limiter with one budget for the whole process.
///
/// At most `max_calls` acquisitions complete within any trailing `period`.
/// Callers over budget wait for the oldest grant to age out; nobody is
/// rejected. The budget is shared by every chat, so one user's burst delays
/// everyone else's submissions too.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    /// Grant instants inside the current window, oldest first.
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            period,
            grants: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        loop {
            let retry_at = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();
                evict_expired(&mut grants, now, self.period);

                if grants.len() < self.max_calls {
                    grants.push_back(now);
                    return;
                }

                match grants.front() {
                    Some(oldest) => *oldest + self.period,
                    None => now,
                }
            };

            debug!(
                "Rate limit reached ({} per {:?}), waiting {:?}",
                self.max_calls,
                self.period,
                retry_at.saturating_duration_since(Instant::now())
            );
            sleep_until(retry_at).await;
        }
    }

    /// Grants still inside the trailing window.
    pub async fn in_window(&self) -> usize {
        let mut grants = self.grants.lock().await;
        evict_expired(&mut grants, Instant::now(), self.period);
        grants.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_PERIOD)
    }
}

fn evict_expired(grants: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&oldest) = grants.front() {
        if now.saturating_duration_since(oldest) >= period {
            grants.pop_front();
        } else {
            break;
        }
    }
}
