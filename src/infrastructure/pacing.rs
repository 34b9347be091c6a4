//! Request pacing: adaptive throttle plus periodic burst pauses
//!
//! The throttle follows latency: each response proposes a delay of
//! `latency / target_concurrency`, and the applied delay moves halfway
//! toward it, clamped to `[download_delay, max_delay]`. Error responses
//! can raise the delay but never lower it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::infrastructure::config::{BurstPauseRule, PacingConfig};

#[derive(Debug)]
pub struct AutoThrottle {
    min_delay: Duration,
    max_delay: Duration,
    target_concurrency: f64,
    state: Mutex<ThrottleState>,
}

#[derive(Debug)]
struct ThrottleState {
    delay: Duration,
    last_request: Option<Instant>,
}

impl AutoThrottle {
    pub fn new(config: &PacingConfig) -> Self {
        let min_delay = config.download_delay();
        Self {
            min_delay,
            max_delay: config.max_delay().max(min_delay),
            target_concurrency: config.target_concurrency.max(f64::EPSILON),
            state: Mutex::new(ThrottleState {
                delay: min_delay,
                last_request: None,
            }),
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.state.lock().map(|s| s.delay).unwrap_or(self.min_delay)
    }

    /// Reserve the next request slot and return how long to wait for it
    pub fn reserve(&self) -> Duration {
        let Ok(mut state) = self.state.lock() else {
            return self.min_delay;
        };
        let now = Instant::now();
        let wait = match state.last_request {
            Some(last) => {
                let next = last + state.delay;
                next.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        };
        state.last_request = Some(now + wait);
        wait
    }

    /// Feed back one response's latency
    pub fn record(&self, latency: Duration, success: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let target = latency.div_f64(self.target_concurrency);
        let proposed = (state.delay + target) / 2;
        let proposed = proposed.clamp(self.min_delay, self.max_delay);
        if success || proposed > state.delay {
            state.delay = proposed;
        }
    }
}

/// Fixed rests after every Nth request
#[derive(Debug)]
pub struct BurstPause {
    rules: Vec<BurstPauseRule>,
    count: AtomicU64,
}

impl BurstPause {
    pub fn new(rules: &[BurstPauseRule]) -> Self {
        Self {
            rules: rules.iter().copied().filter(|r| r.every > 0).collect(),
            count: AtomicU64::new(0),
        }
    }

    /// Count one request; returns the pause owed after it, if any.
    /// When several rules fire on the same request the longest wins.
    pub fn tick(&self) -> Option<Duration> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.rules
            .iter()
            .filter(|rule| n % rule.every == 0)
            .map(|rule| Duration::from_millis(rule.pause_ms))
            .max()
    }

    pub fn requests_seen(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
