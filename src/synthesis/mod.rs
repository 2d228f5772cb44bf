//! Plan synthesis
//!
//! Aggregates stored signals, renders a prompt, calls the generative backend
//! once under a timeout and parses the reply into a [`Plan`]. There is no
//! retry: a timeout or transport failure surfaces as
//! [`CoachError::UpstreamGeneration`] and the caller decides what to do.

pub mod aggregate;
pub mod backend;
pub mod parser;
pub mod prompt;

pub use aggregate::{aggregate, AggregatedSignal, SignalSummary};
pub use backend::{
    BackendError, BackendSettings, CannedBackend, CannedReply, GenerationRequest,
    GenerativeBackend, OpenAiCompatibleBackend,
};
pub use parser::{parse_reply, plan_confidence, ParsedAction, ParsedPlan};
pub use prompt::{build_prompt, PlanPrompt, ACTIONS_MARKER, SUMMARY_MARKER};

use crate::clock::{Clock, SystemClock};
use crate::config::SynthesisConfig;
use crate::error::CoachError;
use crate::notify::{PipelineNotice, PipelineObserver, TracingObserver};
use crate::redact::redact;
use crate::types::{Action, Event, Plan};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Whether enough signal has accumulated to be worth a plan.
///
/// True once at least `min_events` events each reach `min_confidence`.
pub fn is_ready_for_plan(events: &[Event], min_events: usize, min_confidence: f64) -> bool {
    events
        .iter()
        .filter(|e| e.confidence >= min_confidence)
        .count()
        >= min_events.max(1)
}

/// Build a plan from a parsed reply
pub fn build_plan(
    session_id: &str,
    parsed: &ParsedPlan,
    config: &SynthesisConfig,
    now: DateTime<Utc>,
) -> Plan {
    let actions: Vec<Action> = parsed
        .actions
        .iter()
        .map(|a| Action {
            id: Uuid::new_v4().to_string(),
            title: a.title.clone(),
            description: a.description.clone(),
            category: a.category,
            difficulty: a.difficulty,
        })
        .collect();

    Plan {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        created_at: now,
        summary: parsed.summary.clone(),
        confidence: plan_confidence(actions.len(), config.target_actions),
        actions,
    }
}

/// Turns stored events into plans through a generative backend
pub struct PlanSynthesizer {
    backend: Arc<dyn GenerativeBackend>,
    config: SynthesisConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PipelineObserver>,
}

impl PlanSynthesizer {
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: SynthesisConfig) -> Self {
        Self {
            backend,
            config,
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Render the prompt that [`PlanSynthesizer::synthesize`] would send.
    ///
    /// Messages are redacted here, so callers may pass raw text.
    pub fn prompt_for<S: AsRef<str>>(&self, events: &[Event], recent_messages: &[S]) -> PlanPrompt {
        let redacted: Vec<String> = recent_messages
            .iter()
            .map(|m| redact(m.as_ref()))
            .collect();
        build_prompt(&aggregate(events), &redacted, &self.config)
    }

    /// Generate one plan for a session.
    ///
    /// The returned plan is not persisted.
    pub async fn synthesize<S: AsRef<str>>(
        &self,
        session_id: &str,
        events: &[Event],
        recent_messages: &[S],
    ) -> Result<Plan, CoachError> {
        if session_id.trim().is_empty() {
            return Err(CoachError::Validation("session id is required".to_string()));
        }
        if events.is_empty() && recent_messages.iter().all(|m| m.as_ref().trim().is_empty()) {
            return Err(CoachError::Validation(
                "nothing to synthesize from: no events and no messages".to_string(),
            ));
        }

        let prompt = self.prompt_for(events, recent_messages);
        let request = GenerationRequest {
            system: prompt.system,
            prompt: prompt.user,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        tracing::debug!(
            %session_id,
            backend = self.backend.name(),
            events = events.len(),
            "requesting plan generation"
        );

        let reply = match tokio::time::timeout(self.config.timeout(), self.backend.generate(&request))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(self.fail(session_id, e)),
            Err(_) => return Err(self.fail(session_id, BackendError::Timeout(self.config.timeout_secs))),
        };

        let parsed = parse_reply(&reply, &self.config.default_summary);
        if parsed.is_degraded() {
            self.observer.notify(&PipelineNotice::PlanDegraded {
                session_id: session_id.to_string(),
                skipped_blocks: parsed.skipped_blocks,
                missing_summary: parsed.missing_summary,
            });
        }

        let plan = build_plan(session_id, &parsed, &self.config, self.clock.now());
        self.observer.notify(&PipelineNotice::PlanSynthesized {
            session_id: session_id.to_string(),
            plan_id: plan.id.clone(),
            actions: plan.actions.len(),
            confidence: plan.confidence,
        });
        Ok(plan)
    }

    fn fail(&self, session_id: &str, err: BackendError) -> CoachError {
        self.observer.notify(&PipelineNotice::PlanFailed {
            session_id: session_id.to_string(),
            reason: err.to_string(),
        });
        err.into()
    }
}
