//! Behavioral text classifiers
//!
//! Three independent, symmetric classifiers (behavior regulation, self-judgment,
//! cognitive pattern) map a window of recent user messages to a
//! confidence-scored [`Analysis`]. They share one scoring function and differ
//! only in their rule tables, so adding a classifier is a table change.
//!
//! Classifiers hold no mutable state and never observe each other's output;
//! they may run in any order or concurrently.

pub mod engine;
pub mod tables;

pub use engine::{AdaptiveRule, CategoryRule, Classifier, RuleTable};
pub use tables::{table_for, BEHAVIOR_REGULATION, COGNITIVE_PATTERN, SELF_JUDGMENT};

use crate::config::ScoringConfig;
use crate::error::CoachError;
use crate::types::{Analysis, ClassifierId};
use std::sync::LazyLock;

/// The built-in classifiers compiled with one scoring configuration
pub struct ClassifierSet {
    classifiers: Vec<Classifier>,
}

impl ClassifierSet {
    pub fn new(scoring: &ScoringConfig) -> Result<Self, CoachError> {
        let classifiers = ClassifierId::ALL
            .iter()
            .map(|id| Classifier::new(table_for(*id), scoring.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { classifiers })
    }

    pub fn get(&self, id: ClassifierId) -> Option<&Classifier> {
        self.classifiers.iter().find(|c| c.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Classifier> {
        self.classifiers.iter()
    }

    /// Run one classifier over the window
    pub fn classify<S: AsRef<str>>(&self, id: ClassifierId, messages: &[S]) -> Analysis {
        match self.get(id) {
            Some(classifier) => classifier.classify(messages),
            None => Analysis::empty(id),
        }
    }

    /// Run every classifier over the same window, in canonical order
    pub fn classify_all<S: AsRef<str>>(&self, messages: &[S]) -> Vec<Analysis> {
        self.classifiers
            .iter()
            .map(|c| c.classify(messages))
            .collect()
    }
}

static DEFAULT_CLASSIFIERS: LazyLock<ClassifierSet> = LazyLock::new(|| {
    ClassifierSet::new(&ScoringConfig::default()).expect("built-in rule tables compile")
});

/// Classify with the built-in tables and default scoring
pub fn classify<S: AsRef<str>>(id: ClassifierId, messages: &[S]) -> Analysis {
    DEFAULT_CLASSIFIERS.classify(id, messages)
}
