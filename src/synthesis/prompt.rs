//! Plan prompt rendering
//!
//! The prompt is a fixed template: scope guardrails, the aggregated signals
//! per classifier, the recent conversation, and a strict output contract. The
//! parser in [`super::parser`] relies on the markers and header shape named
//! here.

use super::aggregate::SignalSummary;
use crate::config::SynthesisConfig;
use crate::types::{ClassifierId, TagKind};
use serde::Serialize;

/// Marker that opens the summary section of a reply
pub const SUMMARY_MARKER: &str = "SUMMARY:";
/// Marker that opens the action list of a reply
pub const ACTIONS_MARKER: &str = "ACTIONS:";

/// System prompt: role and safety scope
pub const PLAN_SYSTEM_PROMPT: &str = r#"You are a supportive self-improvement coach. You help people turn patterns they noticed in a conversation into small, concrete next steps.

## Scope
- You are not a therapist and do not diagnose. Never name a disorder or condition.
- Do not give medical, legal, or medication advice.
- If anything suggests the person may be in danger or thinking about self-harm, make the first action reaching out to a crisis line or a trusted person right now.
- Keep a warm, non-judgmental tone. Describe patterns, never the person.
- Never repeat placeholders such as [EMAIL_REDACTED] or ask for personal details."#;

/// User prompt template
pub const PLAN_USER_PROMPT: &str = r#"Create a personal action plan from the observations below.

## Observed Signals
{signals}

## Recent Conversation
{messages}

## Output Format
Reply in exactly this format and nothing else:

SUMMARY:
Two or three sentences reflecting the main patterns back to the person.

ACTIONS:
1. Action title | category | difficulty
   One sentence describing what to do and why it helps.
2. Action title | category | difficulty
   One sentence describing what to do and why it helps.

Rules:
- Give between 3 and {max_actions} actions.
- category is one of: immediate, short-term, long-term
- difficulty is one of: easy, medium, hard
- Keep each header on one line with the three parts separated by " | "."#;

/// Rendered prompt pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanPrompt {
    pub system: String,
    pub user: String,
}

/// Render the plan prompt. Deterministic for equal inputs.
pub fn build_prompt<S: AsRef<str>>(
    summary: &SignalSummary,
    recent_messages: &[S],
    config: &SynthesisConfig,
) -> PlanPrompt {
    let user = PLAN_USER_PROMPT
        .replace("{signals}", &format_signals(summary))
        .replace("{messages}", &format_messages(recent_messages, config))
        .replace("{max_actions}", &config.target_actions.max(3).to_string());

    PlanPrompt {
        system: PLAN_SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn format_signals(summary: &SignalSummary) -> String {
    if summary.is_empty() {
        return "No strong signals were recorded yet.".to_string();
    }

    let mut sections = Vec::new();
    for id in ClassifierId::ALL {
        let signals = summary.signals(id);
        if signals.is_empty() {
            continue;
        }
        let mut lines = vec![format!("### {}", id.display_name())];
        for signal in signals {
            let prefix = match signal.kind {
                TagKind::Concern => "-",
                TagKind::Strength => "- Strength:",
            };
            lines.push(format!(
                "{} {} (seen {}x, confidence {:.2})",
                prefix, signal.label, signal.occurrences, signal.max_confidence
            ));
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}

fn format_messages<S: AsRef<str>>(messages: &[S], config: &SynthesisConfig) -> String {
    let start = messages.len().saturating_sub(config.message_window);
    let lines: Vec<String> = messages[start..]
        .iter()
        .map(|m| m.as_ref().trim())
        .filter(|m| !m.is_empty())
        .map(|m| format!("- \"{}\"", truncate_chars(m, config.message_char_limit)))
        .collect();

    if lines.is_empty() {
        "No recent messages.".to_string()
    } else {
        lines.join("\n")
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::aggregate::AggregatedSignal;
    use std::collections::BTreeMap;

    fn summary() -> SignalSummary {
        let mut by_classifier = BTreeMap::new();
        by_classifier.insert(
            ClassifierId::SelfJudgment,
            vec![
                AggregatedSignal {
                    category: "self-criticism".to_string(),
                    label: "Self-criticism".to_string(),
                    kind: TagKind::Concern,
                    occurrences: 2,
                    max_confidence: 0.85,
                },
                AggregatedSignal {
                    category: "self-compassion".to_string(),
                    label: "Self-compassion".to_string(),
                    kind: TagKind::Strength,
                    occurrences: 1,
                    max_confidence: 0.7,
                },
            ],
        );
        SignalSummary {
            by_classifier,
            event_count: 2,
            mean_confidence: 0.8,
        }
    }

    #[test]
    fn test_prompt_contains_contract_and_signals() {
        let prompt = build_prompt(
            &summary(),
            &["I'm such a failure"],
            &SynthesisConfig::default(),
        );
        assert!(prompt.system.contains("not a therapist"));
        assert!(prompt.user.contains(SUMMARY_MARKER));
        assert!(prompt.user.contains(ACTIONS_MARKER));
        assert!(prompt.user.contains("### Self-judgment"));
        assert!(prompt.user.contains("- Self-criticism (seen 2x, confidence 0.85)"));
        assert!(prompt.user.contains("- Strength: Self-compassion"));
        assert!(prompt.user.contains("- \"I'm such a failure\""));
        assert!(prompt.user.contains("between 3 and 5 actions"));
        assert!(!prompt.user.contains("{signals}"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let config = SynthesisConfig::default();
        let a = build_prompt(&summary(), &["one", "two"], &config);
        let b = build_prompt(&summary(), &["one", "two"], &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_window_and_truncation() {
        let config = SynthesisConfig {
            message_window: 2,
            message_char_limit: 5,
            ..SynthesisConfig::default()
        };
        let prompt = build_prompt(&SignalSummary::default(), &["first", "second", "third!"], &config);
        assert!(!prompt.user.contains("\"first\""));
        assert!(prompt.user.contains("- \"secon…\""));
        assert!(prompt.user.contains("- \"third…\""));
        assert!(prompt.user.contains("No strong signals"));
    }

    #[test]
    fn test_empty_messages() {
        let empty: [&str; 0] = [];
        let prompt = build_prompt(&summary(), &empty, &SynthesisConfig::default());
        assert!(prompt.user.contains("No recent messages."));
    }
}
