//! Core data types
//!
//! Types that flow through the signal pipeline: classifier output (tags and
//! analyses), stored events, sessions, synthesized plans and rate windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Clamp a confidence value into [0, 1]. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Identifies one of the built-in classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierId {
    BehaviorRegulation,
    SelfJudgment,
    CognitivePattern,
}

impl ClassifierId {
    /// All built-in classifiers in their canonical order
    pub const ALL: [ClassifierId; 3] = [
        ClassifierId::BehaviorRegulation,
        ClassifierId::SelfJudgment,
        ClassifierId::CognitivePattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierId::BehaviorRegulation => "behavior_regulation",
            ClassifierId::SelfJudgment => "self_judgment",
            ClassifierId::CognitivePattern => "cognitive_pattern",
        }
    }

    /// Human-readable heading used in prompts and reports
    pub fn display_name(&self) -> &'static str {
        match self {
            ClassifierId::BehaviorRegulation => "Behavior regulation",
            ClassifierId::SelfJudgment => "Self-judgment",
            ClassifierId::CognitivePattern => "Cognitive patterns",
        }
    }
}

impl fmt::Display for ClassifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "behavior_regulation" | "behavior" => Ok(ClassifierId::BehaviorRegulation),
            "self_judgment" | "self_judgement" => Ok(ClassifierId::SelfJudgment),
            "cognitive_pattern" | "cognitive" => Ok(ClassifierId::CognitivePattern),
            other => Err(format!("unknown classifier: {other}")),
        }
    }
}

/// Whether a tag reports a concern or an adaptive strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Concern,
    Strength,
}

/// A single labeled observation produced by a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    /// Stable category key, e.g. `self-criticism`
    pub category: String,
    /// Human-readable label, e.g. `Self-criticism`
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Matched phrase, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Output of one classifier invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub classifier: ClassifierId,
    pub tags: Vec<Tag>,
    /// Concern categories that fired anywhere in the window
    pub matched_signals: BTreeSet<String>,
    /// Window confidence in [0, 1]
    pub confidence: f64,
}

impl Analysis {
    /// Analysis for a window where nothing fired
    pub fn empty(classifier: ClassifierId) -> Self {
        Self {
            classifier,
            tags: Vec::new(),
            matched_signals: BTreeSet::new(),
            confidence: 0.0,
        }
    }

    /// Whether the analysis clears a caller-chosen activation threshold
    pub fn is_active(&self, threshold: f64) -> bool {
        !self.tags.is_empty() && self.confidence >= threshold
    }

    pub fn concern_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|t| t.kind == TagKind::Concern)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.tags.iter().any(|t| t.category == category)
    }
}

/// A stored, immutable record of one classifier's output for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub classifier: ClassifierId,
    /// Never empty
    pub tags: Vec<Tag>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message_ref: Option<String>,
}

/// Optional client details captured at session resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ClientMeta {
    pub fn is_empty(&self) -> bool {
        self.user_agent.is_none() && self.locale.is_none() && self.timezone.is_none()
    }
}

/// The bounded-lifetime identity that groups events, plans and rate state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_meta: Option<ClientMeta>,
    /// Plan id the user chose to keep in view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_plan_id: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            last_activity_at: now,
            client_meta: None,
            pinned_plan_id: None,
        }
    }
}

/// Time horizon of a plan action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    Immediate,
    ShortTerm,
    LongTerm,
}

impl ActionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Immediate => "immediate",
            ActionCategory::ShortTerm => "short-term",
            ActionCategory::LongTerm => "long-term",
        }
    }
}

impl FromStr for ActionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "immediate" => Ok(ActionCategory::Immediate),
            "short-term" => Ok(ActionCategory::ShortTerm),
            "long-term" => Ok(ActionCategory::LongTerm),
            other => Err(format!("unknown action category: {other}")),
        }
    }
}

/// Effort estimate of a plan action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// One recommended step in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ActionCategory,
    pub difficulty: Difficulty,
}

/// A structured multi-action recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Never empty; holds a default sentence when the reply had no summary
    pub summary: String,
    pub actions: Vec<Action>,
    /// Completeness proxy in [0, 1]
    pub confidence: f64,
}

/// Fixed-window request counter for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub identifier: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
}
