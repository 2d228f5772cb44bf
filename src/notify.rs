//! Structured notifications
//!
//! The core reports notable transitions through a [`PipelineObserver`]
//! instead of logging ad hoc from each call site. The default observer turns
//! every notice into a `tracing` event; an observability layer can install its
//! own observer without touching the pipeline.

use crate::types::ClassifierId;
use serde::Serialize;

/// Why a session left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// The session cap was reached and this was the least recently active
    Capacity,
    /// Inactive for longer than the session TTL
    Expired,
    /// Removed by an explicit call
    Explicit,
}

/// A notable pipeline transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineNotice {
    SessionCreated {
        session_id: String,
    },
    SessionEvicted {
        session_id: String,
        reason: EvictionReason,
        events: usize,
        plans: usize,
    },
    EventStored {
        session_id: String,
        event_id: String,
        classifier: ClassifierId,
        confidence: f64,
    },
    EventDiscarded {
        session_id: String,
        classifier: ClassifierId,
        confidence: f64,
    },
    PlanSynthesized {
        session_id: String,
        plan_id: String,
        actions: usize,
        confidence: f64,
    },
    /// The reply parsed with fewer actions than requested, or no summary
    PlanDegraded {
        session_id: String,
        skipped_blocks: usize,
        missing_summary: bool,
    },
    PlanFailed {
        session_id: String,
        reason: String,
    },
    RateLimited {
        key: String,
        retry_after_secs: u64,
    },
    SweepCompleted {
        removed: usize,
    },
}

/// Receives pipeline notices. Implementations must be cheap and must not block.
pub trait PipelineObserver: Send + Sync {
    fn notify(&self, notice: &PipelineNotice);
}

/// Emits each notice as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn notify(&self, notice: &PipelineNotice) {
        match notice {
            PipelineNotice::SessionCreated { session_id } => {
                tracing::debug!(%session_id, "session created");
            }
            PipelineNotice::SessionEvicted {
                session_id,
                reason,
                events,
                plans,
            } => {
                tracing::info!(%session_id, ?reason, events, plans, "session evicted");
            }
            PipelineNotice::EventStored {
                session_id,
                event_id,
                classifier,
                confidence,
            } => {
                tracing::info!(%session_id, %event_id, %classifier, confidence, "event stored");
            }
            PipelineNotice::EventDiscarded {
                session_id,
                classifier,
                confidence,
            } => {
                tracing::debug!(%session_id, %classifier, confidence, "analysis below storage threshold");
            }
            PipelineNotice::PlanSynthesized {
                session_id,
                plan_id,
                actions,
                confidence,
            } => {
                tracing::info!(%session_id, %plan_id, actions, confidence, "plan synthesized");
            }
            PipelineNotice::PlanDegraded {
                session_id,
                skipped_blocks,
                missing_summary,
            } => {
                tracing::warn!(%session_id, skipped_blocks, missing_summary, "plan reply partially parsed");
            }
            PipelineNotice::PlanFailed { session_id, reason } => {
                tracing::warn!(%session_id, %reason, "plan synthesis failed");
            }
            PipelineNotice::RateLimited {
                key,
                retry_after_secs,
            } => {
                tracing::info!(%key, retry_after_secs, "rate limited");
            }
            PipelineNotice::SweepCompleted { removed } => {
                tracing::debug!(removed, "ttl sweep completed");
            }
        }
    }
}

/// Discards every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn notify(&self, _notice: &PipelineNotice) {}
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;

    #[test]
    fn test_notice_serializes_with_type_tag() {
        let notice = PipelineNotice::RateLimited {
            key: "plan:abc".to_string(),
            retry_after_secs: 30,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["type"], "rate_limited");
        assert_eq!(json["key"], "plan:abc");
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::default();
        observer.notify(&PipelineNotice::SweepCompleted { removed: 2 });
        TracingObserver.notify(&PipelineNotice::SweepCompleted { removed: 2 });
        assert_eq!(observer.notices().len(), 1);
        assert_eq!(
            observer.count(|n| matches!(n, PipelineNotice::SweepCompleted { .. })),
            1
        );
    }
}
