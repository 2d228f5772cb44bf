//! Pipeline configuration
//!
//! Every tunable constant of the pipeline lives here as a named default. The
//! scoring divisor, the thresholds and the plan confidence target are
//! hand-tuned values; they are kept overridable rather than derived.
//!
//! Configuration is loaded from JSON. Every section is `#[serde(default)]`, so a
//! file only needs to name the values it changes.

use crate::error::CoachError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Divisor turning a window's raw score into confidence
pub const DEFAULT_NORMALIZATION_DIVISOR: f64 = 6.0;
/// Points removed from the raw score per adaptive match
pub const DEFAULT_ADAPTIVE_CREDIT: f64 = 1.0;
/// Number of most recent user messages a classifier looks at
pub const DEFAULT_MESSAGE_WINDOW: usize = 5;
/// Minimum analysis confidence for an event to be stored
pub const DEFAULT_STORAGE_THRESHOLD: f64 = 0.3;
/// Confidence at which callers treat a classifier as active
pub const DEFAULT_ACTIVATION_THRESHOLD: f64 = 0.5;

pub const DEFAULT_MAX_EVENTS_PER_SESSION: usize = 1000;
pub const DEFAULT_MAX_SESSIONS: usize = 100;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// Longest accepted session TTL (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
pub const DEFAULT_MAX_PLANS_PER_SESSION: usize = 10;
/// Fraction of store writes that trigger an inline TTL sweep
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 30;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Longest accepted rate-limit window (one day)
pub const MAX_RATE_LIMIT_WINDOW_SECS: u64 = 86_400;
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

/// Action count at which plan confidence saturates
pub const DEFAULT_PLAN_TARGET_ACTIONS: usize = 5;
pub const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYNTHESIS_MAX_TOKENS: u32 = 800;
pub const DEFAULT_SYNTHESIS_TEMPERATURE: f64 = 0.4;
/// Stored events needed before callers offer a plan
pub const DEFAULT_SYNTHESIS_MIN_EVENTS: usize = 2;
/// Confidence those events must reach
pub const DEFAULT_SYNTHESIS_MIN_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_PLAN_SUMMARY: &str =
    "Here is a starting plan based on what you have shared so far.";

/// Classifier scoring parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub normalization_divisor: f64,
    pub adaptive_credit: f64,
    pub message_window: usize,
    pub storage_threshold: f64,
    pub activation_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            normalization_divisor: DEFAULT_NORMALIZATION_DIVISOR,
            adaptive_credit: DEFAULT_ADAPTIVE_CREDIT,
            message_window: DEFAULT_MESSAGE_WINDOW,
            storage_threshold: DEFAULT_STORAGE_THRESHOLD,
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
        }
    }
}

/// Event store capacity and hygiene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_events_per_session: usize,
    pub max_sessions: usize,
    pub session_ttl_hours: i64,
    pub max_plans_per_session: usize,
    pub sweep_probability: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_events_per_session: DEFAULT_MAX_EVENTS_PER_SESSION,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            max_plans_per_session: DEFAULT_MAX_PLANS_PER_SESSION,
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
        }
    }
}

impl StoreConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

/// Budget for one fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs as i64)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS)
    }
}

/// Rate limits, optionally specialized per capability.
///
/// The capability of a key is the text before its first `:`, so
/// `events:<session>` and `plan:<session>` get independent budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_policy: RateLimitPolicy,
    pub capabilities: BTreeMap<String, RateLimitPolicy>,
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut capabilities = BTreeMap::new();
        capabilities.insert("events".to_string(), RateLimitPolicy::new(60, 60));
        capabilities.insert("plan".to_string(), RateLimitPolicy::new(10, 300));
        Self {
            default_policy: RateLimitPolicy::default(),
            capabilities,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
        }
    }
}

impl RateLimitConfig {
    /// Policy that applies to a key
    pub fn policy_for(&self, key: &str) -> RateLimitPolicy {
        key.split_once(':')
            .and_then(|(capability, _)| self.capabilities.get(capability))
            .copied()
            .unwrap_or(self.default_policy)
    }
}

/// Plan synthesis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
    pub target_actions: usize,
    /// Stored events read when a plan is requested
    pub event_window: usize,
    /// Recent messages embedded in the prompt
    pub message_window: usize,
    pub message_char_limit: usize,
    pub min_events: usize,
    pub min_confidence: f64,
    pub default_summary: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SYNTHESIS_TIMEOUT_SECS,
            max_tokens: DEFAULT_SYNTHESIS_MAX_TOKENS,
            temperature: DEFAULT_SYNTHESIS_TEMPERATURE,
            target_actions: DEFAULT_PLAN_TARGET_ACTIONS,
            event_window: 20,
            message_window: 6,
            message_char_limit: 400,
            min_events: DEFAULT_SYNTHESIS_MIN_EVENTS,
            min_confidence: DEFAULT_SYNTHESIS_MIN_CONFIDENCE,
            default_summary: DEFAULT_PLAN_SUMMARY.to_string(),
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub rate_limits: RateLimitConfig,
    pub synthesis: SynthesisConfig,
}

impl CoachConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, CoachError> {
        let config: CoachConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoachError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String, CoachError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would break the pipeline's invariants
    pub fn validate(&self) -> Result<(), CoachError> {
        let scoring = &self.scoring;
        if scoring.normalization_divisor.is_nan() || scoring.normalization_divisor <= 0.0 {
            return Err(config_error("scoring.normalization_divisor must be positive"));
        }
        if scoring.adaptive_credit < 0.0 {
            return Err(config_error("scoring.adaptive_credit must not be negative"));
        }
        if scoring.message_window == 0 {
            return Err(config_error("scoring.message_window must be at least 1"));
        }
        check_unit("scoring.storage_threshold", scoring.storage_threshold)?;
        check_unit("scoring.activation_threshold", scoring.activation_threshold)?;

        let store = &self.store;
        if store.max_events_per_session == 0 || store.max_sessions == 0 {
            return Err(config_error("store caps must be at least 1"));
        }
        if store.max_plans_per_session == 0 {
            return Err(config_error("store.max_plans_per_session must be at least 1"));
        }
        if store.session_ttl_hours <= 0 || store.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(config_error(&format!(
                "store.session_ttl_hours must be within 1..={MAX_SESSION_TTL_HOURS}"
            )));
        }
        check_unit("store.sweep_probability", store.sweep_probability)?;

        let limits = &self.rate_limits;
        for (name, policy) in std::iter::once(("default", &limits.default_policy))
            .chain(limits.capabilities.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if policy.max_requests == 0 || policy.window_secs == 0 {
                return Err(config_error(&format!(
                    "rate limit policy '{name}' needs a non-zero budget and window"
                )));
            }
            if policy.window_secs > MAX_RATE_LIMIT_WINDOW_SECS {
                return Err(config_error(&format!(
                    "rate limit policy '{name}' window exceeds {MAX_RATE_LIMIT_WINDOW_SECS}s"
                )));
            }
        }
        if limits.max_tracked_keys == 0 {
            return Err(config_error("rate_limits.max_tracked_keys must be at least 1"));
        }

        let synthesis = &self.synthesis;
        if synthesis.timeout_secs == 0 {
            return Err(config_error("synthesis.timeout_secs must be positive"));
        }
        if synthesis.target_actions == 0 {
            return Err(config_error("synthesis.target_actions must be at least 1"));
        }
        check_unit("synthesis.min_confidence", synthesis.min_confidence)?;
        if !(0.0..=2.0).contains(&synthesis.temperature) {
            return Err(config_error("synthesis.temperature must be within [0, 2]"));
        }
        if synthesis.default_summary.trim().is_empty() {
            return Err(config_error("synthesis.default_summary must not be empty"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), CoachError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(&format!("{name} must be within [0, 1]")))
    }
}

fn config_error(message: &str) -> CoachError {
    CoachError::Config(message.to_string())
}
