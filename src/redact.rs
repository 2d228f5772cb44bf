//! Best-effort redaction of identifiable substrings
//!
//! Runs before anything else sees user text. Passes run in a fixed order:
//! structured identifiers (emails, card and ID numbers, phone numbers), then
//! name introductions, then street addresses. Each pass swaps what it matches
//! for a category placeholder that no later pass can match, which keeps the
//! whole operation idempotent.
//!
//! Redaction never fails from the caller's point of view: if the patterns are
//! unavailable the original text is returned unchanged.

use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::LazyLock;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL_REDACTED]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE_REDACTED]";
pub const ID_PLACEHOLDER: &str = "[ID_REDACTED]";
pub const NAME_PLACEHOLDER: &str = "[NAME_REDACTED]";
pub const ADDRESS_PLACEHOLDER: &str = "[ADDRESS_REDACTED]";

/// What a redaction pass removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionKind {
    Email,
    CardNumber,
    NationalId,
    Phone,
    Name,
    Address,
}

struct RedactionPass {
    kind: RedactionKind,
    pattern: Regex,
    replacement: &'static str,
}

/// Result of a redaction with per-kind replacement counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redaction {
    pub text: String,
    pub replaced: Vec<(RedactionKind, usize)>,
}

impl Redaction {
    pub fn total_replaced(&self) -> usize {
        self.replaced.iter().map(|(_, n)| n).sum()
    }
}

/// Ordered set of compiled redaction passes
pub struct Redactor {
    passes: Vec<RedactionPass>,
}

impl Redactor {
    /// Compile the built-in passes
    pub fn new() -> Result<Self, regex::Error> {
        let definitions: [(RedactionKind, &str, &'static str); 6] = [
            (
                RedactionKind::Email,
                r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
                EMAIL_PLACEHOLDER,
            ),
            // 13-19 contiguous digits, 4-4-4-4 groups, or 4-6-5 groups
            (
                RedactionKind::CardNumber,
                r"\b(?:\d{13,19}|\d{4}(?:[ -]\d{4}){3}|\d{4}[ -]\d{6}[ -]\d{5})\b",
                ID_PLACEHOLDER,
            ),
            (RedactionKind::NationalId, r"\b\d{3}-\d{2}-\d{4}\b", ID_PLACEHOLDER),
            // US-style: optional +1, then exactly 3-3-4 digits
            (
                RedactionKind::Phone,
                r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b",
                PHONE_PLACEHOLDER,
            ),
            // The introduction is case-insensitive, the name itself must be capitalized
            (
                RedactionKind::Name,
                r"(?P<intro>(?i:\b(?:my name is|my name's|i am called|i'm called|they call me|call me)\s+))[A-Z][a-z]+(?:[ '-][A-Z][a-z]+)?",
                "${intro}[NAME_REDACTED]",
            ),
            (
                RedactionKind::Address,
                r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Circle)\b",
                ADDRESS_PLACEHOLDER,
            ),
        ];

        let passes = definitions
            .into_iter()
            .map(|(kind, pattern, replacement)| {
                Ok(RedactionPass {
                    kind,
                    pattern: Regex::new(pattern)?,
                    replacement,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { passes })
    }

    /// Apply every pass in order
    pub fn apply(&self, text: &str) -> Redaction {
        let mut current: Cow<'_, str> = Cow::Borrowed(text);
        let mut replaced = Vec::new();

        for pass in &self.passes {
            let count = pass.pattern.find_iter(&current).count();
            if count == 0 {
                continue;
            }
            let next = pass
                .pattern
                .replace_all(&current, pass.replacement)
                .into_owned();
            current = Cow::Owned(next);
            replaced.push((pass.kind, count));
        }

        Redaction {
            text: current.into_owned(),
            replaced,
        }
    }
}

static REDACTOR: LazyLock<Option<Redactor>> = LazyLock::new(|| match Redactor::new() {
    Ok(redactor) => Some(redactor),
    Err(e) => {
        tracing::warn!(error = %e, "redaction patterns failed to compile, redaction disabled");
        None
    }
});

/// Redact identifiable substrings from `text`.
///
/// Total and idempotent: `redact(&redact(x)) == redact(x)`.
pub fn redact(text: &str) -> String {
    redact_with_report(text).text
}

/// Like [`redact`], also reporting how many substrings each pass replaced
pub fn redact_with_report(text: &str) -> Redaction {
    match REDACTOR.as_ref() {
        Some(redactor) => {
            let redaction = redactor.apply(text);
            if redaction.total_replaced() > 0 {
                tracing::debug!(replaced = redaction.total_replaced(), "redacted user text");
            }
            redaction
        }
        None => Redaction {
            text: text.to_string(),
            replaced: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_patterns_compile() {
        assert!(Redactor::new().is_ok());
    }

    #[test]
    fn test_email_phone_and_address_replaced() {
        let input = "Reach me at jane.doe@example.com or 555-123-4567, I live at 42 Maple Street near the park.";
        let output = redact(input);
        assert_eq!(
            output,
            "Reach me at [EMAIL_REDACTED] or [PHONE_REDACTED], I live at [ADDRESS_REDACTED] near the park."
        );
    }

    #[test]
    fn test_phone_formats() {
        assert_eq!(redact("call (555) 123-4567 now"), "call [PHONE_REDACTED] now");
        assert_eq!(redact("call +1 555.123.4567"), "call [PHONE_REDACTED]");
        assert_eq!(redact("5551234567"), "[PHONE_REDACTED]");
    }

    #[test]
    fn test_short_numbers_untouched() {
        let input = "I slept 6 hours, ran 5 km and scored 1234 points in 2024.";
        assert_eq!(redact(input), input);
        assert_eq!(redact("room 555-1234"), "room 555-1234");
    }

    #[test]
    fn test_id_numbers() {
        assert_eq!(redact("ssn 123-45-6789"), "ssn [ID_REDACTED]");
        assert_eq!(redact("card 4111 1111 1111 1111 ok"), "card [ID_REDACTED] ok");
        assert_eq!(redact("amex 3782-822463-10005"), "amex [ID_REDACTED]");
        assert_eq!(redact("raw 4111111111111111"), "raw [ID_REDACTED]");
    }

    #[test]
    fn test_adjacent_numbers_keep_their_kind() {
        assert_eq!(
            redact("555-123-4567 555-123-4567"),
            "[PHONE_REDACTED] [PHONE_REDACTED]"
        );

        let report = redact_with_report("my name is Ann 123-45-6789 5551234567");
        assert_eq!(
            report.text,
            "my name is [NAME_REDACTED] [ID_REDACTED] [PHONE_REDACTED]"
        );
        assert_eq!(
            report.replaced,
            vec![
                (RedactionKind::NationalId, 1),
                (RedactionKind::Phone, 1),
                (RedactionKind::Name, 1),
            ]
        );
    }

    #[test]
    fn test_name_introductions() {
        assert_eq!(redact("Hi, my name is Sarah Connor."), "Hi, my name is [NAME_REDACTED].");
        assert_eq!(redact("Everyone calls me Bob"), "Everyone calls me Bob");
        assert_eq!(redact("They call me Max"), "They call me [NAME_REDACTED]");
        // lowercase continuation is not a name
        assert_eq!(redact("call me later"), "call me later");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "plain text with nothing sensitive",
            "my name is Ada Lovelace, email ada@calc.org, phone 212-555-0199",
            "I live at 1600 Pennsylvania Avenue and my card is 4111-1111-1111-1111",
            "",
            "[EMAIL_REDACTED] already",
        ];
        for sample in samples {
            let once = redact(sample);
            assert_eq!(redact(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_report_counts() {
        let report = redact_with_report("a@b.co and c@d.io, 555-123-4567");
        assert_eq!(report.total_replaced(), 3);
        assert_eq!(
            report.replaced,
            vec![(RedactionKind::Email, 2), (RedactionKind::Phone, 1)]
        );
    }
}
