//! Reply parsing
//!
//! Turns free-form generated text into a summary and validated actions.
//! Parsing never fails: blocks whose header does not match
//! `Title | category | difficulty` are skipped and counted, and a missing
//! or empty summary is replaced by the configured default sentence.

use crate::types::{ActionCategory, Difficulty};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*)?summary(?:\*\*)?[ \t]*:(?:\*\*)?")
        .expect("summary marker regex")
});

static ACTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*)?actions(?:\*\*)?[ \t]*:(?:\*\*)?")
        .expect("actions marker regex")
});

static ENUMERATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+").expect("enumeration regex"));

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\*)?(?P<title>[^|]+?)(?:\*\*)?\s*\|\s*(?P<category>immediate|short-term|long-term)\s*\|\s*(?P<difficulty>easy|medium|hard)\s*(?:\*\*)?\s*$",
    )
    .expect("action header regex")
});

/// One action recovered from a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAction {
    pub title: String,
    pub description: String,
    pub category: ActionCategory,
    pub difficulty: Difficulty,
}

/// Parse outcome, including what had to be recovered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedPlan {
    pub summary: String,
    pub actions: Vec<ParsedAction>,
    /// Enumerated blocks dropped for a malformed header
    pub skipped_blocks: usize,
    /// The default summary was used
    pub missing_summary: bool,
}

impl ParsedPlan {
    pub fn is_degraded(&self) -> bool {
        self.skipped_blocks > 0 || self.missing_summary
    }
}

/// Parse a generated reply
pub fn parse_reply(reply: &str, default_summary: &str) -> ParsedPlan {
    let text = reply.replace("\r\n", "\n");
    let summary_marker = SUMMARY_RE.find(&text);
    let actions_marker = ACTIONS_RE.find(&text);

    let summary = summary_marker.and_then(|marker| {
        let end = actions_marker
            .filter(|a| a.start() >= marker.end())
            .map_or(text.len(), |a| a.start());
        let joined = text[marker.end()..end]
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    });

    let (actions, skipped_blocks) = match actions_marker {
        Some(marker) => parse_actions(&text[marker.end()..]),
        None => (Vec::new(), 0),
    };

    let missing_summary = summary.is_none();
    ParsedPlan {
        summary: summary.unwrap_or_else(|| default_summary.to_string()),
        actions,
        skipped_blocks,
        missing_summary,
    }
}

fn parse_actions(section: &str) -> (Vec<ParsedAction>, usize) {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in section.lines() {
        if ENUMERATION_RE.is_match(line) {
            blocks.push(vec![line]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }

    let mut actions = Vec::new();
    let mut skipped = 0;
    for block in blocks {
        match parse_block(&block) {
            Some(action) => actions.push(action),
            None => skipped += 1,
        }
    }
    (actions, skipped)
}

fn parse_block(lines: &[&str]) -> Option<ParsedAction> {
    let (first, rest) = lines.split_first()?;
    let header = ENUMERATION_RE.replace(first, "");
    let caps = HEADER_RE.captures(header.trim())?;

    let title = caps["title"].trim().trim_matches('*').trim().to_string();
    if title.is_empty() {
        return None;
    }
    let category = caps["category"].parse::<ActionCategory>().ok()?;
    let difficulty = caps["difficulty"].parse::<Difficulty>().ok()?;

    let description = rest
        .iter()
        .map(|l| l.trim().trim_start_matches("- ").trim())
        .map(|l| strip_prefix_ci(l, "description:").trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(ParsedAction {
        title,
        description,
        category,
        difficulty,
    })
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> &'a str {
    match line.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &line[prefix.len()..],
        _ => line,
    }
}

/// Completeness proxy: `min(actions / target, 1)`
pub fn plan_confidence(action_count: usize, target_actions: usize) -> f64 {
    if target_actions == 0 {
        return if action_count > 0 { 1.0 } else { 0.0 };
    }
    (action_count as f64 / target_actions as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEFAULT: &str = "Default summary.";

    #[test]
    fn test_well_formed_reply() {
        let reply = "SUMMARY:\nYou are hard on yourself after setbacks.\nThat pattern is common.\n\n\
                     ACTIONS:\n\
                     1. Name the inner critic | immediate | easy\n   Notice the critical voice and label it.\n\
                     2. Evidence log | short-term | medium\n   Write down one thing that went right each day.\n\
                     3. Values check-in | long-term | hard\n   Description: Revisit what matters to you monthly.\n";

        let parsed = parse_reply(reply, DEFAULT);
        assert_eq!(
            parsed.summary,
            "You are hard on yourself after setbacks. That pattern is common."
        );
        assert!(!parsed.missing_summary);
        assert_eq!(parsed.skipped_blocks, 0);
        assert_eq!(parsed.actions.len(), 3);
        assert_eq!(
            parsed.actions[0],
            ParsedAction {
                title: "Name the inner critic".to_string(),
                description: "Notice the critical voice and label it.".to_string(),
                category: ActionCategory::Immediate,
                difficulty: Difficulty::Easy,
            }
        );
        assert_eq!(parsed.actions[2].description, "Revisit what matters to you monthly.");
        assert_eq!(plan_confidence(parsed.actions.len(), 5), 0.6);
    }

    #[test]
    fn test_malformed_blocks_are_skipped() {
        let reply = "SUMMARY: Short one.\nACTIONS:\n\
                     1. Good one | Immediate | EASY\n   Do it.\n\
                     2. Missing parts | soon\n   Ignored.\n\
                     3) **Bold title** | long-term | medium\n   Still fine.\n";
        let parsed = parse_reply(reply, DEFAULT);
        assert_eq!(parsed.summary, "Short one.");
        assert_eq!(parsed.skipped_blocks, 1);
        let titles: Vec<&str> = parsed.actions.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Good one", "Bold title"]);
        assert!(parsed.is_degraded());
    }

    #[test]
    fn test_no_valid_blocks() {
        let parsed = parse_reply("SUMMARY: ok\nACTIONS:\n1. just text\n2. more text\n", DEFAULT);
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.skipped_blocks, 2);
        assert_eq!(plan_confidence(0, 5), 0.0);
    }

    #[test]
    fn test_missing_summary_marker_uses_default() {
        let parsed = parse_reply("ACTIONS:\n1. Walk | immediate | easy\n", DEFAULT);
        assert_eq!(parsed.summary, DEFAULT);
        assert!(parsed.missing_summary);
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].description, "");
    }

    #[test]
    fn test_empty_summary_counts_as_missing() {
        let parsed = parse_reply("SUMMARY:\n\nACTIONS:\n", DEFAULT);
        assert_eq!(parsed.summary, DEFAULT);
        assert!(parsed.missing_summary);
    }

    #[test]
    fn test_markdown_markers() {
        let reply = "## Summary:\nCalm reflection.\n\n**Actions:**\n1. Breathe | immediate | easy\n";
        let parsed = parse_reply(reply, DEFAULT);
        assert_eq!(parsed.summary, "Calm reflection.");
        assert_eq!(parsed.actions.len(), 1);
    }

    #[test]
    fn test_no_markers_at_all() {
        let parsed = parse_reply("I can't help with that.", DEFAULT);
        assert!(parsed.actions.is_empty());
        assert!(parsed.missing_summary);
        assert_eq!(parsed.skipped_blocks, 0);
    }

    #[test]
    fn test_plan_confidence_caps_at_one() {
        assert_eq!(plan_confidence(7, 5), 1.0);
        assert_eq!(plan_confidence(5, 5), 1.0);
        assert_eq!(plan_confidence(1, 0), 1.0);
    }
}
