//! Signal aggregation
//!
//! Groups the tags of stored events by originating classifier and collapses
//! repeats of the same label into one entry. Every stored tag already cleared
//! the storage threshold, so nothing is filtered out here.

use crate::types::{ClassifierId, Event, TagKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// One de-duplicated signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSignal {
    pub category: String,
    pub label: String,
    pub kind: TagKind,
    /// Number of tags collapsed into this entry
    pub occurrences: usize,
    pub max_confidence: f64,
}

/// Signals per classifier, in canonical classifier order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalSummary {
    pub by_classifier: BTreeMap<ClassifierId, Vec<AggregatedSignal>>,
    pub event_count: usize,
    pub mean_confidence: f64,
}

impl SignalSummary {
    pub fn is_empty(&self) -> bool {
        self.by_classifier.values().all(Vec::is_empty)
    }

    pub fn signals(&self, classifier: ClassifierId) -> &[AggregatedSignal] {
        self.by_classifier
            .get(&classifier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Aggregate event tags per classifier, de-duplicated by label.
///
/// Within a classifier, concerns come before strengths, then more frequent
/// signals first, then alphabetical by label.
pub fn aggregate(events: &[Event]) -> SignalSummary {
    let mut by_classifier: BTreeMap<ClassifierId, Vec<AggregatedSignal>> = BTreeMap::new();

    for event in events {
        let signals = by_classifier.entry(event.classifier).or_default();
        for tag in &event.tags {
            match signals.iter_mut().find(|s| s.label == tag.label) {
                Some(existing) => {
                    existing.occurrences += 1;
                    existing.max_confidence = existing.max_confidence.max(tag.confidence);
                }
                None => signals.push(AggregatedSignal {
                    category: tag.category.clone(),
                    label: tag.label.clone(),
                    kind: tag.kind,
                    occurrences: 1,
                    max_confidence: tag.confidence,
                }),
            }
        }
    }

    for signals in by_classifier.values_mut() {
        signals.sort_by(|a, b| {
            let rank = |s: &AggregatedSignal| (s.kind == TagKind::Strength) as u8;
            rank(a)
                .cmp(&rank(b))
                .then(b.occurrences.cmp(&a.occurrences))
                .then_with(|| a.label.cmp(&b.label))
        });
    }

    let mean_confidence = if events.is_empty() {
        0.0
    } else {
        events.iter().map(|e| e.confidence).sum::<f64>() / events.len() as f64
    };

    SignalSummary {
        by_classifier,
        event_count: events.len(),
        mean_confidence,
    }
}
