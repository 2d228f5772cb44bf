//! Table-driven scoring
//!
//! A classifier is a [`RuleTable`] (category → patterns → weight) compiled into
//! a [`Classifier`]. Scoring is the same for every table:
//!
//! 1. For each message in the window, walk categories in priority order. The
//!    first matching pattern of a category emits one concern tag for that
//!    category and adds the category weight to the running score. A category
//!    fires at most once per message.
//! 2. If the message matches an adaptive pattern, one strength tag is emitted
//!    and the adaptive credit is taken off the running score (floored at 0).
//! 3. Confidence is `clamp(score / normalization_divisor, 0, 1)`.

use crate::config::ScoringConfig;
use crate::error::CoachError;
use crate::types::{clamp_unit, Analysis, ClassifierId, Tag, TagKind};
use regex::Regex;
use std::collections::BTreeSet;

/// Longest matched phrase kept as a tag note
const NOTE_MAX_CHARS: usize = 80;

/// One concern category of a rule table
#[derive(Debug)]
pub struct CategoryRule {
    pub category: &'static str,
    pub label: &'static str,
    /// Tag confidence for this category
    pub confidence: f64,
    /// Points added to the window score
    pub weight: f64,
    pub patterns: &'static [&'static str],
}

/// Patterns that indicate adaptive coping and lower the score
#[derive(Debug)]
pub struct AdaptiveRule {
    pub category: &'static str,
    pub label: &'static str,
    pub confidence: f64,
    pub patterns: &'static [&'static str],
}

/// Complete rule data for one classifier
#[derive(Debug)]
pub struct RuleTable {
    pub classifier: ClassifierId,
    /// Categories in priority order
    pub categories: &'static [CategoryRule],
    pub adaptive: AdaptiveRule,
}

impl RuleTable {
    pub fn category_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.categories.iter().map(|c| c.category)
    }

    pub fn pattern_count(&self) -> usize {
        self.categories.iter().map(|c| c.patterns.len()).sum::<usize>()
            + self.adaptive.patterns.len()
    }
}

struct CompiledCategory {
    rule: &'static CategoryRule,
    patterns: Vec<Regex>,
}

/// A compiled rule table plus scoring parameters.
///
/// Stateless after construction; safe to share across threads.
pub struct Classifier {
    table: &'static RuleTable,
    categories: Vec<CompiledCategory>,
    adaptive: Vec<Regex>,
    scoring: ScoringConfig,
}

impl Classifier {
    /// Compile a rule table. All patterns match case-insensitively.
    pub fn new(table: &'static RuleTable, scoring: ScoringConfig) -> Result<Self, CoachError> {
        let categories = table
            .categories
            .iter()
            .map(|rule| {
                Ok(CompiledCategory {
                    rule,
                    patterns: compile_all(rule.patterns)?,
                })
            })
            .collect::<Result<Vec<_>, CoachError>>()?;
        let adaptive = compile_all(table.adaptive.patterns)?;

        Ok(Self {
            table,
            categories,
            adaptive,
            scoring,
        })
    }

    pub fn id(&self) -> ClassifierId {
        self.table.classifier
    }

    pub fn table(&self) -> &'static RuleTable {
        self.table
    }

    /// Score the most recent `message_window` messages.
    ///
    /// Never fails: an empty or irrelevant window yields confidence 0 and no tags.
    pub fn classify<S: AsRef<str>>(&self, messages: &[S]) -> Analysis {
        let window_start = messages.len().saturating_sub(self.scoring.message_window);
        let window = &messages[window_start..];

        let mut tags = Vec::new();
        let mut matched_signals = BTreeSet::new();
        let mut score = 0.0_f64;

        for message in window {
            let text = message.as_ref();
            if text.trim().is_empty() {
                continue;
            }

            for compiled in &self.categories {
                let Some(found) = first_match(&compiled.patterns, text) else {
                    continue;
                };
                let rule = compiled.rule;
                tags.push(Tag {
                    kind: TagKind::Concern,
                    category: rule.category.to_string(),
                    label: rule.label.to_string(),
                    confidence: clamp_unit(rule.confidence),
                    note: Some(found),
                });
                matched_signals.insert(rule.category.to_string());
                score += rule.weight;
            }

            if let Some(found) = first_match(&self.adaptive, text) {
                let rule = &self.table.adaptive;
                tags.push(Tag {
                    kind: TagKind::Strength,
                    category: rule.category.to_string(),
                    label: rule.label.to_string(),
                    confidence: clamp_unit(rule.confidence),
                    note: Some(found),
                });
                score = (score - self.scoring.adaptive_credit).max(0.0);
            }
        }

        Analysis {
            classifier: self.table.classifier,
            tags,
            matched_signals,
            confidence: clamp_unit(score / self.scoring.normalization_divisor),
        }
    }
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>, CoachError> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).map_err(CoachError::from))
        .collect()
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.find(text))
        .map(|m| m.as_str().chars().take(NOTE_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    static TEST_TABLE: RuleTable = RuleTable {
        classifier: ClassifierId::BehaviorRegulation,
        categories: &[
            CategoryRule {
                category: "alpha",
                label: "Alpha",
                confidence: 0.8,
                weight: 3.0,
                patterns: &[r"\balpha\b", r"\bfirst\b"],
            },
            CategoryRule {
                category: "beta",
                label: "Beta",
                confidence: 0.6,
                weight: 1.0,
                patterns: &[r"\bbeta\b"],
            },
        ],
        adaptive: AdaptiveRule {
            category: "steady",
            label: "Steady",
            confidence: 0.7,
            patterns: &[r"\bcalm\b"],
        },
    };

    fn classifier() -> Classifier {
        Classifier::new(&TEST_TABLE, ScoringConfig::default()).unwrap()
    }

    #[test]
    fn test_one_tag_per_category_per_message() {
        let analysis = classifier().classify(&["alpha and first and ALPHA again"]);
        assert_eq!(analysis.tags.len(), 1);
        assert_eq!(analysis.tags[0].category, "alpha");
        assert_eq!(analysis.tags[0].note.as_deref(), Some("alpha"));
        assert!((analysis.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_accumulates_across_messages() {
        let analysis = classifier().classify(&["alpha", "beta", "alpha beta"]);
        // 3 + 1 + 3 + 1 = 8 → clamped
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.tags.len(), 4);
        let signals: Vec<&str> = analysis.matched_signals.iter().map(String::as_str).collect();
        assert_eq!(signals, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_adaptive_credit_floors_at_zero() {
        let analysis = classifier().classify(&["calm", "beta and calm"]);
        // 0 - 1 → 0, then 0 + 1 - 1 → 0
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(
            analysis.tags.iter().filter(|t| t.kind == TagKind::Strength).count(),
            2
        );
        assert!(!analysis.matched_signals.contains("steady"));
    }

    #[test]
    fn test_adaptive_credit_reduces_score() {
        let analysis = classifier().classify(&["alpha", "calm down"]);
        // 3 - 1 = 2 → 2/6
        assert!((analysis.confidence - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let scoring = ScoringConfig {
            message_window: 2,
            ..ScoringConfig::default()
        };
        let classifier = Classifier::new(&TEST_TABLE, scoring).unwrap();
        let analysis = classifier.classify(&["alpha", "nothing", "beta"]);
        assert!(!analysis.matched_signals.contains("alpha"));
        assert!(analysis.matched_signals.contains("beta"));
    }

    #[test]
    fn test_empty_window() {
        let empty: [&str; 0] = [];
        let analysis = classifier().classify(&empty);
        assert_eq!(analysis, Analysis::empty(ClassifierId::BehaviorRegulation));

        let blank = classifier().classify(&["   ", ""]);
        assert_eq!(blank.confidence, 0.0);
        assert!(blank.tags.is_empty());
    }

    #[test]
    fn test_custom_divisor() {
        let scoring = ScoringConfig {
            normalization_divisor: 12.0,
            ..ScoringConfig::default()
        };
        let classifier = Classifier::new(&TEST_TABLE, scoring).unwrap();
        let analysis = classifier.classify(&["alpha"]);
        assert!((analysis.confidence - 0.25).abs() < 1e-9);
    }
}
