/*!
 * # Save Throttle
 *
 * Per-key limiter guarding lead capture writes. Two limits apply to every key:
 *
 * - a window cap: at most `max_per_window` allowed calls per `window`, with the
 *   counter reset once the window has elapsed
 * - a minimum interval between two allowed calls
 *
 * Entries live in a `DashMap`, so a check-and-record on one key is atomic with
 * respect to concurrent callers using the same key (duplicate browser tabs).
 * Time comes from the injected [`Clock`].
 *
 * ## Usage
 *
 * ```ignore
 * let throttle = SaveThrottle::new(ThrottleConfig::default(), Arc::new(SystemClock));
 * if throttle.check("session-token").is_allowed() {
 *     // write
 * }
 * ```
 */
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub max_per_window: u32,
    pub window: Duration,
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_per_window: 10,
            window: Duration::from_secs(60),
            min_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
struct ThrottleEntry {
    count: u32,
    window_start: DateTime<Utc>,
    last_allowed: DateTime<Utc>,
}

impl ThrottleEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
            last_allowed: now,
        }
    }
}

/// Result of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed { remaining: u32 },
    /// Too close to the previous allowed call
    TooSoon { retry_after: Duration },
    /// Window cap reached
    WindowExhausted { retry_after: Duration },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed { .. })
    }
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    // A clock that moved backwards counts as no time elapsed
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug)]
pub struct SaveThrottle {
    entries: DashMap<String, ThrottleEntry>,
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
}

impl SaveThrottle {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
        }
    }

    /// Checks `key` and, when allowed, records the call against both limits.
    pub fn check(&self, key: &str) -> ThrottleDecision {
        let now = self.clock.now();
        let mut inserted = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            ThrottleEntry::new(now)
        });

        if inserted {
            return ThrottleDecision::Allowed {
                remaining: self.config.max_per_window.saturating_sub(1),
            };
        }

        // Reset if window has expired
        if elapsed(entry.window_start, now) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        let since_last = elapsed(entry.last_allowed, now);
        if since_last < self.config.min_interval {
            debug!(key, "save throttled: minimum interval not reached");
            return ThrottleDecision::TooSoon {
                retry_after: self.config.min_interval - since_last,
            };
        }

        if entry.count >= self.config.max_per_window {
            debug!(key, count = entry.count, "save throttled: window cap reached");
            let in_window = elapsed(entry.window_start, now);
            return ThrottleDecision::WindowExhausted {
                retry_after: self.config.window.saturating_sub(in_window),
            };
        }

        entry.count += 1;
        entry.last_allowed = now;
        ThrottleDecision::Allowed {
            remaining: self.config.max_per_window.saturating_sub(entry.count),
        }
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops entries whose window and interval have both lapsed.
    pub fn cleanup_expired(&self) {
        let now = self.clock.now();
        let keep_for = self.config.window.max(self.config.min_interval);
        self.entries
            .retain(|_, entry| elapsed(entry.last_allowed, now) < keep_for);
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn throttle(max: u32) -> (SaveThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let config = ThrottleConfig {
            max_per_window: max,
            window: Duration::from_secs(60),
            min_interval: Duration::from_secs(2),
        };
        (SaveThrottle::new(config, clock.clone()), clock)
    }

    #[test]
    fn second_call_inside_interval_is_too_soon() {
        let (throttle, clock) = throttle(10);
        assert!(throttle.check("s1").is_allowed());

        clock.advance(ChronoDuration::milliseconds(1500));
        assert_eq!(
            throttle.check("s1"),
            ThrottleDecision::TooSoon {
                retry_after: Duration::from_millis(500)
            }
        );

        clock.advance(ChronoDuration::milliseconds(500));
        assert!(throttle.check("s1").is_allowed());
    }

    #[test]
    fn window_cap_resets_after_window() {
        let (throttle, clock) = throttle(3);
        for _ in 0..3 {
            assert!(throttle.check("s1").is_allowed());
            clock.advance(ChronoDuration::seconds(3));
        }
        assert!(matches!(
            throttle.check("s1"),
            ThrottleDecision::WindowExhausted { .. }
        ));

        clock.advance(ChronoDuration::seconds(60));
        assert_eq!(
            throttle.check("s1"),
            ThrottleDecision::Allowed { remaining: 2 }
        );
    }

    #[test]
    fn keys_are_limited_independently() {
        let (throttle, _clock) = throttle(1);
        assert!(throttle.check("a").is_allowed());
        assert!(throttle.check("b").is_allowed());
        assert!(!throttle.check("a").is_allowed());
        assert!(!throttle.check("b").is_allowed());
    }

    #[test]
    fn reset_and_cleanup_forget_keys() {
        let (throttle, clock) = throttle(1);
        throttle.check("a");
        throttle.check("b");
        throttle.reset("a");
        assert!(throttle.check("a").is_allowed());

        clock.advance(ChronoDuration::seconds(120));
        throttle.cleanup_expired();
        assert_eq!(throttle.tracked_keys(), 0);
    }
}
