//! Quality Gate - style and structure checks for generated prose
//!
//! Detection always runs on the text as given and reports every violation
//! kind present. Repair then strips Markdown, emoji and odd whitespace and
//! merges runs of short sentences. Template placeholders are never repaired:
//! they fail the gate and the caller decides whether to retry.

pub mod evaluation;
pub mod repair;
mod rules;

use crate::config::QualitySettings;
use crate::error::{CounselError, Result};
use serde::{Deserialize, Serialize};

pub use evaluation::score;

/// Repair passes before giving up on reaching a fixed point
const MAX_REPAIR_PASSES: usize = 4;

/// Kinds of style violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MarkdownSyntax,
    EmojiPresent,
    PlaceholderToken,
    ExcessiveShortSentenceRun,
    NonStandardWhitespace,
}

impl ViolationKind {
    /// Whether the gate fixes this kind itself
    pub fn is_repairable(&self) -> bool {
        !matches!(self, ViolationKind::PlaceholderToken)
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationKind::MarkdownSyntax => "markdown syntax",
            ViolationKind::EmojiPresent => "emoji",
            ViolationKind::PlaceholderToken => "placeholder token",
            ViolationKind::ExcessiveShortSentenceRun => "short sentence run",
            ViolationKind::NonStandardWhitespace => "non-standard whitespace",
        };
        f.write_str(name)
    }
}

/// Outcome of one gate run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Repaired text
    pub clean_text: String,
    /// Kinds detected in the input, in declaration order
    pub violations: Vec<ViolationKind>,
    /// Kinds still present after repair
    pub outstanding: Vec<ViolationKind>,
    /// 0-100
    pub score: u8,
    /// Template placeholders found, in order of appearance
    pub placeholders: Vec<String>,
    /// Explicit "needs verification" annotations
    pub verification_notes: usize,
}

impl ValidationReport {
    /// False when a template placeholder is present
    pub fn passed(&self) -> bool {
        !self.violations.contains(&ViolationKind::PlaceholderToken)
    }

    /// Whether anything is left that repair could not fix
    pub fn has_outstanding(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Turn a placeholder hard-fail into [`CounselError::PlaceholderViolation`]
    pub fn ensure_passed(&self) -> Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(CounselError::PlaceholderViolation(self.placeholders.clone()))
        }
    }
}

/// Stateless quality gate
#[derive(Debug, Clone)]
pub struct QualityGate {
    min_sentence_chars: usize,
    placeholder_allowance: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(&QualitySettings::default())
    }
}

impl QualityGate {
    pub fn new(settings: &QualitySettings) -> Self {
        Self {
            min_sentence_chars: settings.min_sentence_chars,
            placeholder_allowance: settings.placeholder_allowance,
        }
    }

    /// Detect, repair and score a piece of text
    pub fn validate(&self, text: &str) -> ValidationReport {
        let violations = evaluation::detect(text, self.min_sentence_chars);
        let placeholders = evaluation::find_placeholders(text);

        let clean_text = self.repair(text);
        // Markers can surface only once emphasis around them is stripped
        let verification_notes = evaluation::count_verification_notes(&clean_text);
        let outstanding = evaluation::detect(&clean_text, self.min_sentence_chars);

        let score = evaluation::score(
            violations.len(),
            placeholders.len() + verification_notes,
            self.placeholder_allowance,
        );

        ValidationReport {
            clean_text,
            violations,
            outstanding,
            score,
            placeholders,
            verification_notes,
        }
    }

    /// Apply every repair until the text stops changing
    pub fn repair(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_REPAIR_PASSES {
            let next = self.repair_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn repair_pass(&self, text: &str) -> String {
        let text = repair::strip_markdown(text);
        let text = repair::strip_emoji(&text);
        let text = repair::normalize_whitespace(&text);
        repair::merge_short_sentences(&text, self.min_sentence_chars)
    }
}

/// Validate with default thresholds
pub fn validate(text: &str) -> ValidationReport {
    QualityGate::default().validate(text)
}

/// Remove verification markers after the first `keep`, so the sentences they
/// introduced read as plain statements. Returns the text and how many were removed.
pub fn strip_verification_markers(text: &str, keep: usize) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut removed = 0;
    let mut capitalize_next = false;

    for (index, marker) in rules::VERIFICATION_MARKER.find_iter(text).enumerate() {
        let before = &text[last..marker.start()];
        push_capitalized(&mut out, before, capitalize_next);
        capitalize_next = false;

        if index < keep {
            out.push_str(marker.as_str());
        } else {
            removed += 1;
            capitalize_next = out
                .trim_end()
                .chars()
                .last()
                .map_or(true, rules::is_terminator);
        }
        last = marker.end();
    }
    push_capitalized(&mut out, &text[last..], capitalize_next);

    (out, removed)
}

fn push_capitalized(out: &mut String, segment: &str, capitalize: bool) {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if capitalize && first.is_ascii_lowercase() => {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
        _ => out.push_str(segment),
    }
}
