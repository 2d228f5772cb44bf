//! Fixed-window admission control
//!
//! Each key gets a window that opens on first use and lasts the policy's
//! duration. Every check increments the window's count; once the count
//! exceeds the policy maximum, checks report "limited" until the window
//! elapses and a fresh one opens. There is no smoothing across windows.
//!
//! Keys are arbitrary strings. Callers compose one key per capability
//! (`events:<session>`, `plan:<session>`) so that a burst on one capability
//! does not exhaust another.

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::CoachError;
use crate::notify::{PipelineNotice, PipelineObserver, TracingObserver};
use crate::types::RateWindow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub limited: bool,
    /// Requests counted in the current window, including this one
    pub count: u32,
    pub remaining: u32,
    /// Seconds until the current window closes; 0 when admitted
    pub retry_after_secs: u64,
}

/// Fixed-window rate limiter keyed by arbitrary strings
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PipelineObserver>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            RateLimitConfig::default(),
            Arc::new(SystemClock),
            Arc::new(TracingObserver),
        )
    }
}

impl RateLimiter {
    pub fn new(
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
            clock,
            observer,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request against `key` and report whether it is over budget
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let policy = self.config.policy_for(key);
        let window_len = policy.window();

        let decision = {
            let mut windows = self.windows.lock();

            if !windows.contains_key(key) && windows.len() >= self.config.max_tracked_keys {
                self.make_room(&mut windows, now);
            }

            let window = windows
                .entry(key.to_string())
                .or_insert_with(|| RateWindow {
                    identifier: key.to_string(),
                    window_start: now,
                    count: 0,
                });

            if now >= window.window_start + window_len {
                window.window_start = now;
                window.count = 0;
            }

            window.count = window.count.saturating_add(1);
            let limited = window.count > policy.max_requests;
            let retry_after_secs = if limited {
                let remaining = (window.window_start + window_len - now).num_seconds();
                remaining.max(1) as u64
            } else {
                0
            };

            RateDecision {
                limited,
                count: window.count,
                remaining: policy.max_requests.saturating_sub(window.count),
                retry_after_secs,
            }
        };

        if decision.limited {
            self.observer.notify(&PipelineNotice::RateLimited {
                key: key.to_string(),
                retry_after_secs: decision.retry_after_secs,
            });
        }
        decision
    }

    /// Boolean shortcut for [`RateLimiter::check`]
    pub fn is_rate_limited(&self, key: &str) -> bool {
        self.check(key).limited
    }

    /// Check `key` and turn a limited decision into `AdmissionDenied`
    pub fn admit(&self, key: &str) -> Result<RateDecision, CoachError> {
        let decision = self.check(key);
        if decision.limited {
            Err(CoachError::AdmissionDenied {
                key: key.to_string(),
                retry_after_secs: decision.retry_after_secs,
            })
        } else {
            Ok(decision)
        }
    }

    /// Current window for a key, if one is tracked
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.lock().get(key).cloned()
    }

    pub fn reset(&self, key: &str) -> bool {
        self.windows.lock().remove(key).is_some()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop elapsed windows; if none elapsed, drop the oldest one
    fn make_room(&self, windows: &mut HashMap<String, RateWindow>, now: DateTime<Utc>) {
        let before = windows.len();
        windows.retain(|key, w| now < w.window_start + self.config.policy_for(key).window());

        if windows.len() >= self.config.max_tracked_keys {
            let oldest = windows
                .values()
                .min_by_key(|w| w.window_start)
                .map(|w| w.identifier.clone());
            if let Some(key) = oldest {
                windows.remove(&key);
            }
        }
        tracing::debug!(pruned = before - windows.len(), "rate limiter pruned windows");
    }
}
