//! Ephemeral per-session event and plan store
//!
//! Sessions own their events and plans by key: evicting a session removes its
//! entry and with it every dependent record. Memory is bounded by hard caps
//! that hold whether or not the TTL sweep ever runs:
//!
//! - at most `max_events_per_session` events per session (oldest dropped first)
//! - at most `max_plans_per_session` plans per session (oldest dropped first)
//! - at most `max_sessions` sessions (least recently active dropped first)
//!
//! The TTL sweep is lazy: a random fraction of writes runs it inline.
//! All state sits behind one lock so "check cap, then append" is atomic.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::CoachError;
use crate::notify::{EvictionReason, PipelineNotice, PipelineObserver, TracingObserver};
use crate::types::{clamp_unit, Analysis, ClientMeta, Event, Plan, Session};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

struct SessionEntry {
    session: Session,
    events: VecDeque<Event>,
    plans: VecDeque<Plan>,
    /// Tie-breaker for sessions touched within the same instant
    touch_seq: u64,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<String, SessionEntry>,
    next_seq: u64,
}

/// Point-in-time store occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub sessions: usize,
    pub events: usize,
    pub plans: usize,
}

/// Bounded in-memory store for sessions, events and plans
pub struct EventStore {
    inner: Mutex<StoreInner>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PipelineObserver>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(
            StoreConfig::default(),
            Arc::new(SystemClock),
            Arc::new(TracingObserver),
        )
    }
}

impl EventStore {
    pub fn new(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            config,
            clock,
            observer,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register or refresh a session and bump its activity time.
    ///
    /// New client metadata replaces what was recorded before.
    pub fn touch_session(&self, session_id: &str, client_meta: Option<ClientMeta>) -> Session {
        let now = self.clock.now();
        let mut notices = Vec::new();
        let session = {
            let mut inner = self.inner.lock();
            let entry = self.upsert_locked(&mut inner, session_id, now, &mut notices);
            if let Some(meta) = client_meta.filter(|m| !m.is_empty()) {
                entry.session.client_meta = Some(meta);
            }
            let session = entry.session.clone();
            self.maybe_sweep_locked(&mut inner, now, &mut notices);
            session
        };
        self.emit(notices);
        session
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(|e| e.session.clone())
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.inner.lock().sessions.contains_key(session_id)
    }

    /// Append an event, dropping the session's oldest event past the cap.
    ///
    /// Events without tags are rejected; confidence is clamped to [0, 1].
    pub fn append(&self, mut event: Event) -> Result<(), CoachError> {
        if event.tags.is_empty() {
            return Err(CoachError::Validation(
                "events must carry at least one tag".to_string(),
            ));
        }
        if event.session_id.is_empty() {
            return Err(CoachError::Validation("session id is required".to_string()));
        }
        event.confidence = clamp_unit(event.confidence);

        let now = self.clock.now();
        let mut notices = Vec::new();
        {
            let mut inner = self.inner.lock();
            let cap = self.config.max_events_per_session;
            let entry = self.upsert_locked(&mut inner, &event.session_id, now, &mut notices);
            notices.push(PipelineNotice::EventStored {
                session_id: event.session_id.clone(),
                event_id: event.id.clone(),
                classifier: event.classifier,
                confidence: event.confidence,
            });
            entry.events.push_back(event);
            while entry.events.len() > cap {
                entry.events.pop_front();
            }
            self.maybe_sweep_locked(&mut inner, now, &mut notices);
        }
        self.emit(notices);
        Ok(())
    }

    /// Promote an analysis to a stored event if it clears `storage_threshold`.
    ///
    /// Returns `None` (and stores nothing) for analyses below the threshold or
    /// without tags.
    pub fn record_analysis(
        &self,
        session_id: &str,
        analysis: &Analysis,
        source_message_ref: Option<String>,
        storage_threshold: f64,
    ) -> Option<Event> {
        let confidence = clamp_unit(analysis.confidence);
        if analysis.tags.is_empty() || confidence < storage_threshold {
            self.observer.notify(&PipelineNotice::EventDiscarded {
                session_id: session_id.to_string(),
                classifier: analysis.classifier,
                confidence,
            });
            return None;
        }

        let event = Event {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: self.clock.now(),
            classifier: analysis.classifier,
            tags: analysis.tags.clone(),
            confidence,
            source_message_ref,
        };
        match self.append(event.clone()) {
            Ok(()) => Some(event),
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "event rejected by store");
                None
            }
        }
    }

    /// Most recent events for a session, oldest first.
    ///
    /// `limit` of `None` returns everything retained.
    pub fn recent(&self, session_id: &str, limit: Option<usize>) -> Vec<Event> {
        let inner = self.inner.lock();
        let Some(entry) = inner.sessions.get(session_id) else {
            return Vec::new();
        };
        let len = entry.events.len();
        let skip = limit.map_or(0, |l| len.saturating_sub(l));
        entry.events.iter().skip(skip).cloned().collect()
    }

    /// Append a plan, dropping the session's oldest plan past the cap.
    ///
    /// If the dropped plan was pinned the pin is cleared.
    pub fn append_plan(&self, plan: Plan) -> Result<(), CoachError> {
        if plan.session_id.is_empty() {
            return Err(CoachError::Validation("session id is required".to_string()));
        }
        if plan.summary.trim().is_empty() {
            return Err(CoachError::Validation("plan summary must not be empty".to_string()));
        }

        let now = self.clock.now();
        let mut notices = Vec::new();
        {
            let mut inner = self.inner.lock();
            let cap = self.config.max_plans_per_session;
            let entry = self.upsert_locked(&mut inner, &plan.session_id, now, &mut notices);
            entry.plans.push_back(plan);
            while entry.plans.len() > cap {
                if let Some(dropped) = entry.plans.pop_front() {
                    if entry.session.pinned_plan_id.as_deref() == Some(dropped.id.as_str()) {
                        entry.session.pinned_plan_id = None;
                    }
                }
            }
            self.maybe_sweep_locked(&mut inner, now, &mut notices);
        }
        self.emit(notices);
        Ok(())
    }

    pub fn latest_plan(&self, session_id: &str) -> Option<Plan> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .and_then(|e| e.plans.back().cloned())
    }

    /// Retained plans for a session, oldest first
    pub fn plans(&self, session_id: &str) -> Vec<Plan> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(|e| e.plans.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Point the session at one of its plans
    pub fn pin_plan(&self, session_id: &str, plan_id: &str) -> Result<(), CoachError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = next_seq(&mut inner);
        let entry = inner.sessions.get_mut(session_id).ok_or_else(|| {
            CoachError::Validation(format!("unknown session: {session_id}"))
        })?;
        if !entry.plans.iter().any(|p| p.id == plan_id) {
            return Err(CoachError::Validation(format!(
                "plan {plan_id} does not belong to session {session_id}"
            )));
        }
        entry.session.pinned_plan_id = Some(plan_id.to_string());
        entry.session.last_activity_at = now;
        entry.touch_seq = seq;
        Ok(())
    }

    /// Clear the pin. Returns whether a plan was pinned.
    pub fn unpin_plan(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = next_seq(&mut inner);
        match inner.sessions.get_mut(session_id) {
            Some(entry) => {
                entry.session.last_activity_at = now;
                entry.touch_seq = seq;
                entry.session.pinned_plan_id.take().is_some()
            }
            None => false,
        }
    }

    pub fn pinned_plan(&self, session_id: &str) -> Option<Plan> {
        let inner = self.inner.lock();
        let entry = inner.sessions.get(session_id)?;
        let pinned = entry.session.pinned_plan_id.as_deref()?;
        entry.plans.iter().find(|p| p.id == pinned).cloned()
    }

    /// Remove a session and everything it owns
    pub fn evict(&self, session_id: &str) -> bool {
        let removed = self.inner.lock().sessions.remove(session_id);
        match removed {
            Some(entry) => {
                self.emit(vec![eviction_notice(entry, EvictionReason::Explicit)]);
                true
            }
            None => false,
        }
    }

    /// Remove every session inactive for longer than the TTL
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut notices = Vec::new();
        let removed = {
            let mut inner = self.inner.lock();
            self.sweep_locked(&mut inner, now, &mut notices)
        };
        self.emit(notices);
        removed
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            sessions: inner.sessions.len(),
            events: inner.sessions.values().map(|e| e.events.len()).sum(),
            plans: inner.sessions.values().map(|e| e.plans.len()).sum(),
        }
    }

    fn upsert_locked<'a>(
        &self,
        inner: &'a mut StoreInner,
        session_id: &str,
        now: DateTime<Utc>,
        notices: &mut Vec<PipelineNotice>,
    ) -> &'a mut SessionEntry {
        let seq = next_seq(inner);

        if !inner.sessions.contains_key(session_id) {
            while inner.sessions.len() >= self.config.max_sessions {
                let Some(victim) = least_recently_active(&inner.sessions) else {
                    break;
                };
                if let Some(entry) = inner.sessions.remove(&victim) {
                    notices.push(eviction_notice(entry, EvictionReason::Capacity));
                }
            }
            notices.push(PipelineNotice::SessionCreated {
                session_id: session_id.to_string(),
            });
        }

        let entry = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                session: Session::new(session_id, now),
                events: VecDeque::new(),
                plans: VecDeque::new(),
                touch_seq: seq,
            });
        entry.session.last_activity_at = now;
        entry.touch_seq = seq;
        entry
    }

    fn maybe_sweep_locked(
        &self,
        inner: &mut StoreInner,
        now: DateTime<Utc>,
        notices: &mut Vec<PipelineNotice>,
    ) {
        let probability = self.config.sweep_probability;
        if probability > 0.0 && rand::random::<f64>() < probability {
            self.sweep_locked(inner, now, notices);
        }
    }

    fn sweep_locked(
        &self,
        inner: &mut StoreInner,
        now: DateTime<Utc>,
        notices: &mut Vec<PipelineNotice>,
    ) -> usize {
        let cutoff = now - self.config.session_ttl();
        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, e)| e.session.last_activity_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = inner.sessions.remove(id) {
                notices.push(eviction_notice(entry, EvictionReason::Expired));
            }
        }
        notices.push(PipelineNotice::SweepCompleted {
            removed: expired.len(),
        });
        expired.len()
    }

    fn emit(&self, notices: Vec<PipelineNotice>) {
        for notice in &notices {
            self.observer.notify(notice);
        }
    }
}

fn next_seq(inner: &mut StoreInner) -> u64 {
    inner.next_seq += 1;
    inner.next_seq
}

fn least_recently_active(sessions: &HashMap<String, SessionEntry>) -> Option<String> {
    sessions
        .iter()
        .min_by_key(|(_, e)| (e.session.last_activity_at, e.touch_seq))
        .map(|(id, _)| id.clone())
}

fn eviction_notice(entry: SessionEntry, reason: EvictionReason) -> PipelineNotice {
    PipelineNotice::SessionEvicted {
        session_id: entry.session.id,
        reason,
        events: entry.events.len(),
        plans: entry.plans.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::testing::RecordingObserver;
    use crate::types::{ClassifierId, Tag, TagKind};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn store_with(config: StoreConfig) -> (EventStore, Arc<ManualClock>, Arc<RecordingObserver>) {
        let clock = Arc::new(ManualClock::new(start()));
        let observer = Arc::new(RecordingObserver::default());
        let store = EventStore::new(config, clock.clone(), observer.clone());
        (store, clock, observer)
    }

    fn no_sweep() -> StoreConfig {
        StoreConfig {
            sweep_probability: 0.0,
            ..StoreConfig::default()
        }
    }

    fn tag() -> Tag {
        Tag {
            kind: TagKind::Concern,
            category: "avoidance".to_string(),
            label: "Avoidance".to_string(),
            confidence: 0.75,
            note: None,
        }
    }

    fn event(session_id: &str, n: usize) -> Event {
        Event {
            id: format!("evt-{n}"),
            session_id: session_id.to_string(),
            created_at: start(),
            classifier: ClassifierId::BehaviorRegulation,
            tags: vec![tag()],
            confidence: 0.5,
            source_message_ref: None,
        }
    }

    fn plan(session_id: &str, id: &str) -> Plan {
        Plan {
            id: id.to_string(),
            session_id: session_id.to_string(),
            created_at: start(),
            summary: "summary".to_string(),
            actions: Vec::new(),
            confidence: 0.0,
        }
    }

    #[test]
    fn test_event_cap_drops_oldest() {
        let (store, _, _) = store_with(no_sweep());
        let cap = store.config().max_events_per_session;

        for n in 0..cap + 5 {
            store.append(event("s1", n)).unwrap();
        }

        let events = store.recent("s1", None);
        assert_eq!(events.len(), cap);
        assert_eq!(events.first().unwrap().id, "evt-5");
        assert_eq!(events.last().unwrap().id, format!("evt-{}", cap + 4));
    }

    #[test]
    fn test_recent_with_limit() {
        let (store, _, _) = store_with(no_sweep());
        for n in 0..10 {
            store.append(event("s1", n)).unwrap();
        }
        let ids: Vec<String> = store.recent("s1", Some(3)).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-7", "evt-8", "evt-9"]);
        assert!(store.recent("s1", Some(0)).is_empty());
        assert!(store.recent("missing", None).is_empty());
    }

    #[test]
    fn test_empty_tags_rejected() {
        let (store, _, _) = store_with(no_sweep());
        let mut bare = event("s1", 0);
        bare.tags.clear();
        assert!(matches!(store.append(bare), Err(CoachError::Validation(_))));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_confidence_clamped_on_append() {
        let (store, _, _) = store_with(no_sweep());
        let mut loud = event("s1", 0);
        loud.confidence = 3.0;
        store.append(loud).unwrap();
        assert_eq!(store.recent("s1", None)[0].confidence, 1.0);
    }

    #[test]
    fn test_session_cap_evicts_least_recently_active_with_cascade() {
        let config = StoreConfig {
            max_sessions: 3,
            ..no_sweep()
        };
        let (store, clock, observer) = store_with(config);

        for id in ["a", "b", "c"] {
            store.append(event(id, 0)).unwrap();
            store.append_plan(plan(id, &format!("plan-{id}"))).unwrap();
            clock.advance(Duration::minutes(1));
        }
        // "a" becomes the most recent, so "b" is now the oldest
        store.touch_session("a", None);
        clock.advance(Duration::minutes(1));

        store.append(event("d", 0)).unwrap();

        assert_eq!(store.session_count(), 3);
        assert!(!store.contains_session("b"));
        assert!(store.recent("b", None).is_empty());
        assert!(store.latest_plan("b").is_none());
        assert!(store.contains_session("a"));
        assert_eq!(
            observer.count(|n| matches!(
                n,
                PipelineNotice::SessionEvicted {
                    reason: EvictionReason::Capacity,
                    events: 1,
                    plans: 1,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_session_cap_with_frozen_clock_uses_touch_order() {
        let config = StoreConfig {
            max_sessions: 2,
            ..no_sweep()
        };
        let (store, _, _) = store_with(config);
        store.touch_session("first", None);
        store.touch_session("second", None);
        store.touch_session("third", None);
        assert!(!store.contains_session("first"));
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn test_plan_cap_and_latest() {
        let (store, _, _) = store_with(no_sweep());
        for n in 0..12 {
            store.append_plan(plan("s1", &format!("p{n}"))).unwrap();
        }
        let plans = store.plans("s1");
        assert_eq!(plans.len(), 10);
        assert_eq!(plans[0].id, "p2");
        assert_eq!(store.latest_plan("s1").unwrap().id, "p11");
    }

    #[test]
    fn test_pin_and_unpin() {
        let (store, _, _) = store_with(no_sweep());
        store.append_plan(plan("s1", "p1")).unwrap();
        store.append_plan(plan("s1", "p2")).unwrap();

        store.pin_plan("s1", "p1").unwrap();
        assert_eq!(store.pinned_plan("s1").unwrap().id, "p1");
        assert_eq!(store.session("s1").unwrap().pinned_plan_id.as_deref(), Some("p1"));

        assert!(matches!(
            store.pin_plan("s1", "nope"),
            Err(CoachError::Validation(_))
        ));
        assert!(matches!(
            store.pin_plan("ghost", "p1"),
            Err(CoachError::Validation(_))
        ));

        assert!(store.unpin_plan("s1"));
        assert!(!store.unpin_plan("s1"));
        assert!(store.pinned_plan("s1").is_none());
    }

    #[test]
    fn test_pin_cleared_when_plan_evicted() {
        let config = StoreConfig {
            max_plans_per_session: 2,
            ..no_sweep()
        };
        let (store, _, _) = store_with(config);
        store.append_plan(plan("s1", "p1")).unwrap();
        store.pin_plan("s1", "p1").unwrap();
        store.append_plan(plan("s1", "p2")).unwrap();
        store.append_plan(plan("s1", "p3")).unwrap();

        assert!(store.session("s1").unwrap().pinned_plan_id.is_none());
        assert!(store.pinned_plan("s1").is_none());
    }

    #[test]
    fn test_explicit_sweep_removes_expired() {
        let (store, clock, observer) = store_with(no_sweep());
        store.append(event("old", 0)).unwrap();
        clock.advance(Duration::hours(23));
        store.append(event("fresh", 0)).unwrap();
        clock.advance(Duration::hours(2));

        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.contains_session("old"));
        assert!(store.contains_session("fresh"));
        assert_eq!(
            observer.count(|n| matches!(
                n,
                PipelineNotice::SessionEvicted {
                    reason: EvictionReason::Expired,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_inline_sweep_runs_on_write() {
        let config = StoreConfig {
            sweep_probability: 1.0,
            ..StoreConfig::default()
        };
        let (store, clock, _) = store_with(config);
        store.append(event("old", 0)).unwrap();
        clock.advance(Duration::hours(25));
        store.append(event("new", 0)).unwrap();

        assert!(!store.contains_session("old"));
        assert!(store.contains_session("new"));
    }

    #[test]
    fn test_activity_bumped_on_write() {
        let (store, clock, _) = store_with(no_sweep());
        let created = store.touch_session("s1", None);
        clock.advance(Duration::minutes(10));
        store.append(event("s1", 0)).unwrap();

        let session = store.session("s1").unwrap();
        assert_eq!(session.created_at, created.created_at);
        assert_eq!(session.last_activity_at, start() + Duration::minutes(10));
    }

    #[test]
    fn test_client_meta_recorded() {
        let (store, _, _) = store_with(no_sweep());
        let meta = ClientMeta {
            locale: Some("en-US".to_string()),
            ..ClientMeta::default()
        };
        store.touch_session("s1", Some(meta.clone()));
        store.touch_session("s1", Some(ClientMeta::default()));
        assert_eq!(store.session("s1").unwrap().client_meta, Some(meta));
    }

    #[test]
    fn test_record_analysis_threshold() {
        let (store, _, observer) = store_with(no_sweep());
        let mut analysis = Analysis::empty(ClassifierId::SelfJudgment);
        analysis.tags.push(tag());
        analysis.confidence = 0.29;

        assert!(store.record_analysis("s1", &analysis, None, 0.3).is_none());
        assert_eq!(store.session_count(), 0);

        analysis.confidence = 0.3;
        let stored = store
            .record_analysis("s1", &analysis, Some("turn-1".to_string()), 0.3)
            .unwrap();
        assert_eq!(stored.source_message_ref.as_deref(), Some("turn-1"));
        assert_eq!(store.recent("s1", None), vec![stored]);
        assert_eq!(
            observer.count(|n| matches!(n, PipelineNotice::EventDiscarded { .. })),
            1
        );
    }

    #[test]
    fn test_explicit_evict_and_stats() {
        let (store, _, _) = store_with(no_sweep());
        store.append(event("s1", 0)).unwrap();
        store.append(event("s1", 1)).unwrap();
        store.append_plan(plan("s2", "p")).unwrap();

        assert_eq!(
            store.stats(),
            StoreStats {
                sessions: 2,
                events: 2,
                plans: 1
            }
        );
        assert!(store.evict("s1"));
        assert!(!store.evict("s1"));
        assert_eq!(store.stats().events, 0);
    }

    #[test]
    fn test_concurrent_appends_respect_caps() {
        let config = StoreConfig {
            max_events_per_session: 50,
            max_sessions: 4,
            ..no_sweep()
        };
        let (store, _, _) = store_with(config);

        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..100 {
                        store.append(event(&format!("s{}", t % 6), n)).unwrap();
                    }
                });
            }
        });

        let stats = store.stats();
        assert!(stats.sessions <= 4);
        assert!(stats.events <= 4 * 50);
    }
}
