//! Pipeline orchestration
//!
//! [`CoachProcessor`] is the public face of the crate. It owns one instance of
//! each stateful component, built once at process start and shared by handle:
//! redaction → classification → bounded storage → plan synthesis, with
//! per-capability admission control in front of the write paths.

use crate::classifier::ClassifierSet;
use crate::clock::{Clock, SystemClock};
use crate::config::CoachConfig;
use crate::error::CoachError;
use crate::notify::{PipelineObserver, TracingObserver};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::redact::redact;
use crate::session::{resolve_session, IdentityHints, ResolvedSession};
use crate::store::{EventStore, StoreStats};
use crate::synthesis::{is_ready_for_plan, GenerativeBackend, PlanSynthesizer};
use crate::types::{Analysis, ClassifierId, Event, Plan};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Admission key prefix for message ingestion
pub const EVENTS_CAPABILITY: &str = "events";
/// Admission key prefix for plan requests
pub const PLAN_CAPABILITY: &str = "plan";

/// Compose a per-capability admission key
pub fn admission_key(capability: &str, session_id: &str) -> String {
    format!("{capability}:{session_id}")
}

/// Result of one ingest call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub session_id: String,
    /// One analysis per classifier, in canonical order
    pub analyses: Vec<Analysis>,
    /// Events that cleared the storage threshold
    pub stored: Vec<Event>,
    pub ready_for_plan: bool,
}

/// Builder for [`CoachProcessor`]
pub struct CoachProcessorBuilder {
    config: CoachConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PipelineObserver>,
    backend: Option<Arc<dyn GenerativeBackend>>,
}

impl CoachProcessorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validate the configuration and compile the classifiers
    pub fn build(self) -> Result<CoachProcessor, CoachError> {
        self.config.validate()?;
        let classifiers = ClassifierSet::new(&self.config.scoring)?;
        let store = Arc::new(EventStore::new(
            self.config.store.clone(),
            self.clock.clone(),
            self.observer.clone(),
        ));
        let limiter = RateLimiter::new(
            self.config.rate_limits.clone(),
            self.clock.clone(),
            self.observer.clone(),
        );
        let synthesizer = self.backend.map(|backend| {
            PlanSynthesizer::new(backend, self.config.synthesis.clone())
                .with_clock(self.clock.clone())
                .with_observer(self.observer.clone())
        });

        tracing::info!(
            backend = synthesizer.as_ref().map(|s| s.backend_name()).unwrap_or("none"),
            max_sessions = self.config.store.max_sessions,
            "coach processor ready"
        );

        Ok(CoachProcessor {
            config: self.config,
            classifiers,
            store,
            limiter,
            synthesizer,
        })
    }
}

/// Stateful processor shared by every request handler
pub struct CoachProcessor {
    config: CoachConfig,
    classifiers: ClassifierSet,
    store: Arc<EventStore>,
    limiter: RateLimiter,
    synthesizer: Option<PlanSynthesizer>,
}

impl CoachProcessor {
    /// Processor with the system clock, tracing notices and no generative backend
    pub fn new(config: CoachConfig) -> Result<Self, CoachError> {
        Self::builder(config).build()
    }

    pub fn builder(config: CoachConfig) -> CoachProcessorBuilder {
        CoachProcessorBuilder {
            config,
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
            backend: None,
        }
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn has_backend(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn redact(&self, text: &str) -> String {
        redact(text)
    }

    pub fn classify<S: AsRef<str>>(&self, id: ClassifierId, messages: &[S]) -> Analysis {
        self.classifiers.classify(id, messages)
    }

    pub fn classify_all<S: AsRef<str>>(&self, messages: &[S]) -> Vec<Analysis> {
        self.classifiers.classify_all(messages)
    }

    pub fn resolve_session(&self, hints: &IdentityHints) -> ResolvedSession {
        resolve_session(&self.store, hints)
    }

    pub fn is_rate_limited(&self, key: &str) -> bool {
        self.limiter.is_rate_limited(key)
    }

    pub fn admit(&self, key: &str) -> Result<RateDecision, CoachError> {
        self.limiter.admit(key)
    }

    /// Store an analysis if it clears the storage threshold
    pub fn record_event(
        &self,
        session_id: &str,
        analysis: &Analysis,
        source_message_ref: Option<String>,
    ) -> Option<Event> {
        self.store.record_analysis(
            session_id,
            analysis,
            source_message_ref,
            self.config.scoring.storage_threshold,
        )
    }

    /// Most recent events, oldest first; `None` returns everything retained
    pub fn recent_events(&self, session_id: &str, limit: Option<usize>) -> Vec<Event> {
        self.store.recent(session_id, limit)
    }

    /// Redact, classify and store one batch of user messages.
    ///
    /// Counted against `events:<session_id>`. When admission is denied nothing
    /// is classified or stored.
    pub fn ingest<S: AsRef<str>>(
        &self,
        session_id: &str,
        messages: &[S],
        source_message_ref: Option<String>,
    ) -> Result<IngestOutcome, CoachError> {
        validate_session_id(session_id)?;
        if messages.iter().all(|m| m.as_ref().trim().is_empty()) {
            return Err(CoachError::Validation(
                "at least one non-empty message is required".to_string(),
            ));
        }
        self.admit(&admission_key(EVENTS_CAPABILITY, session_id))?;

        self.store.touch_session(session_id, None);
        let redacted: Vec<String> = messages.iter().map(|m| redact(m.as_ref())).collect();
        let analyses = self.classifiers.classify_all(&redacted);

        let stored: Vec<Event> = analyses
            .iter()
            .filter_map(|a| self.record_event(session_id, a, source_message_ref.clone()))
            .collect();

        let synthesis = &self.config.synthesis;
        let recent = self.store.recent(session_id, Some(synthesis.event_window));
        let ready_for_plan =
            is_ready_for_plan(&recent, synthesis.min_events, synthesis.min_confidence);

        tracing::debug!(
            %session_id,
            messages = messages.len(),
            stored = stored.len(),
            ready_for_plan,
            "messages ingested"
        );

        Ok(IngestOutcome {
            session_id: session_id.to_string(),
            analyses,
            stored,
            ready_for_plan,
        })
    }

    /// Synthesize a plan from the given events and persist it.
    ///
    /// Nothing is persisted when generation fails.
    pub async fn synthesize_plan<S: AsRef<str>>(
        &self,
        session_id: &str,
        events: &[Event],
        recent_messages: &[S],
    ) -> Result<Plan, CoachError> {
        let plan = self
            .synthesizer()?
            .synthesize(session_id, events, recent_messages)
            .await?;
        self.store.append_plan(plan.clone())?;
        Ok(plan)
    }

    /// Admission-checked plan request over the session's recent events.
    ///
    /// Counted against `plan:<session_id>`. Requests rejected as invalid or
    /// unserviceable are not counted.
    pub async fn request_plan<S: AsRef<str>>(
        &self,
        session_id: &str,
        recent_messages: &[S],
    ) -> Result<Plan, CoachError> {
        validate_session_id(session_id)?;
        self.synthesizer()?;
        let events = self
            .store
            .recent(session_id, Some(self.config.synthesis.event_window));
        if events.is_empty() && recent_messages.iter().all(|m| m.as_ref().trim().is_empty()) {
            return Err(CoachError::Validation(
                "nothing to plan from: no stored events and no messages".to_string(),
            ));
        }
        self.admit(&admission_key(PLAN_CAPABILITY, session_id))?;
        self.synthesize_plan(session_id, &events, recent_messages)
            .await
    }

    fn synthesizer(&self) -> Result<&PlanSynthesizer, CoachError> {
        self.synthesizer
            .as_ref()
            .ok_or_else(|| CoachError::Config("no generative backend configured".to_string()))
    }

    pub fn latest_plan(&self, session_id: &str) -> Option<Plan> {
        self.store.latest_plan(session_id)
    }

    pub fn plans(&self, session_id: &str) -> Vec<Plan> {
        self.store.plans(session_id)
    }

    pub fn pin_plan(&self, session_id: &str, plan_id: &str) -> Result<(), CoachError> {
        self.store.pin_plan(session_id, plan_id)
    }

    pub fn unpin_plan(&self, session_id: &str) -> bool {
        self.store.unpin_plan(session_id)
    }

    pub fn pinned_plan(&self, session_id: &str) -> Option<Plan> {
        self.store.pinned_plan(session_id)
    }

    pub fn evict_session(&self, session_id: &str) -> bool {
        self.store.evict(session_id)
    }

    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Start a periodic TTL sweep on the current Tokio runtime.
    ///
    /// Must be called from within a runtime. The task stops when the handle
    /// is stopped or dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        let store = Arc::clone(&self.store);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let every = every.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired();
                        if removed > 0 {
                            tracing::info!(removed, "periodic sweep removed expired sessions");
                        }
                    }
                }
            }
        });

        tracing::debug!(interval_ms = every.as_millis() as u64, "sweeper started");
        SweeperHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running sweeper task
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "sweeper task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn validate_session_id(session_id: &str) -> Result<(), CoachError> {
    if session_id.trim().is_empty() {
        return Err(CoachError::Validation("session id is required".to_string()));
    }
    Ok(())
}
