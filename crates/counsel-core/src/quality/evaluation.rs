//! Violation detection and scoring
//!
//! Every detector runs independently on the text it is given. None of them
//! modify the text.

use super::rules::*;
use super::ViolationKind;
use crate::length::content_chars;

/// Score deduction per violation kind present
pub const KIND_PENALTY: u32 = 15;

/// One sentence of a line, split into its parts so the line can be rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SentenceSpan<'a> {
    pub body: &'a str,
    pub terminator: &'a str,
    pub trailing: &'a str,
}

/// Split a single line into sentences.
///
/// A period only ends a sentence when whitespace, a closer or the end of the
/// line follows it, so decimals and dotted abbreviations inside a word stay
/// whole. Concatenating every span reproduces the line exactly.
pub(crate) fn split_sentences(line: &str) -> Vec<SentenceSpan<'_>> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if !is_terminator(c) {
            i += 1;
            continue;
        }

        if c == '.' {
            let next = chars.get(i + 1).map(|(_, n)| *n);
            let ends = match next {
                None => true,
                Some(n) => n.is_whitespace() || is_closer(n) || is_terminator(n),
            };
            if !ends {
                i += 1;
                continue;
            }
        }

        let body_end = pos;
        let mut j = i;
        while j < chars.len() && (is_terminator(chars[j].1) || is_closer(chars[j].1)) {
            j += 1;
        }
        let term_end = chars.get(j).map(|(p, _)| *p).unwrap_or(line.len());
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }
        let end = chars.get(j).map(|(p, _)| *p).unwrap_or(line.len());

        spans.push(SentenceSpan {
            body: &line[start..body_end],
            terminator: &line[body_end..term_end],
            trailing: &line[term_end..end],
        });
        start = end;
        i = j;
    }

    if start < line.len() {
        spans.push(SentenceSpan {
            body: &line[start..],
            terminator: "",
            trailing: "",
        });
    }
    spans
}

/// Index ranges of runs of more than two consecutive short sentences
pub(crate) fn short_sentence_runs(spans: &[SentenceSpan<'_>], min_chars: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start = None;

    for (index, span) in spans.iter().enumerate() {
        let short = content_chars(span.body) < min_chars;
        match (short, run_start) {
            (true, None) => run_start = Some(index),
            (false, Some(start)) => {
                if index - start > 2 {
                    runs.push((start, index));
                }
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        if spans.len() - start > 2 {
            runs.push((start, spans.len()));
        }
    }
    runs
}

pub(crate) fn has_markdown(text: &str) -> bool {
    CODE_FENCE.is_match(text)
        || TABLE_SEPARATOR.is_match(text)
        || TABLE_ROW.is_match(text)
        || LINK.is_match(text)
        || INLINE_CODE.is_match(text)
        || LINE_MARKER.is_match(text)
        || HORIZONTAL_RULE.is_match(text)
        || STAR_EMPHASIS.is_match(text)
        || UNDERSCORE_EMPHASIS.is_match(text)
        || STRIKETHROUGH.is_match(text)
}

pub(crate) fn has_emoji(text: &str) -> bool {
    EMOJI.is_match(text)
}

pub(crate) fn has_odd_whitespace(text: &str) -> bool {
    text.contains('\r')
        || ODD_SPACE.is_match(text)
        || ZERO_WIDTH.is_match(text)
        || BLANK_LINE_RUN.is_match(text)
}

pub(crate) fn has_short_sentence_run(text: &str, min_chars: usize) -> bool {
    text.lines()
        .any(|line| !short_sentence_runs(&split_sentences(line), min_chars).is_empty())
}

/// Matched template placeholders, in order of appearance
pub(crate) fn find_placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub(crate) fn count_verification_notes(text: &str) -> usize {
    VERIFICATION_MARKER.find_iter(text).count()
}

/// Every violation kind present, in declaration order
pub(crate) fn detect(text: &str, min_sentence_chars: usize) -> Vec<ViolationKind> {
    let checks = [
        (ViolationKind::MarkdownSyntax, has_markdown(text)),
        (ViolationKind::EmojiPresent, has_emoji(text)),
        (ViolationKind::PlaceholderToken, PLACEHOLDER.is_match(text)),
        (
            ViolationKind::ExcessiveShortSentenceRun,
            has_short_sentence_run(text, min_sentence_chars),
        ),
        (ViolationKind::NonStandardWhitespace, has_odd_whitespace(text)),
    ];

    checks
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(kind, _)| kind)
        .collect()
}

/// 100 minus 15 per kind present, minus one per annotation past the allowance
pub fn score(kinds_present: usize, annotation_occurrences: usize, allowance: usize) -> u8 {
    let deduction = KIND_PENALTY * kinds_present as u32
        + annotation_occurrences.saturating_sub(allowance) as u32;
    100u32.saturating_sub(deduction) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(spans: &[SentenceSpan<'_>]) -> String {
        spans
            .iter()
            .map(|s| format!("{}{}{}", s.body, s.terminator, s.trailing))
            .collect()
    }

    #[test]
    fn test_split_keeps_decimals() {
        let line = "Tuition rose 3.5 percent. Class size is 16! Really?";
        let spans = split_sentences(line);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].body, "Tuition rose 3.5 percent");
        assert_eq!(spans[2].terminator, "?");
        assert_eq!(rebuild(&spans), line);
    }

    #[test]
    fn test_split_cjk() {
        let line = "他喜欢数学。她也喜欢。“好的！”最后一句";
        let spans = split_sentences(line);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[2].terminator, "！”");
        assert_eq!(spans[3].terminator, "");
        assert_eq!(rebuild(&spans), line);
    }

    #[test]
    fn test_short_runs() {
        let spans = split_sentences("Yes. No. Maybe. This sentence is comfortably long enough.");
        assert_eq!(short_sentence_runs(&spans, 12), vec![(0, 3)]);

        let spans = split_sentences("Yes. No. This sentence is comfortably long enough.");
        assert!(short_sentence_runs(&spans, 12).is_empty());
    }

    #[test]
    fn test_detect_accumulates() {
        let text = "## Overview\nGreat fit 🎓 for {{student_name}}.";
        let kinds = detect(text, 12);
        assert_eq!(
            kinds,
            vec![
                ViolationKind::MarkdownSyntax,
                ViolationKind::EmojiPresent,
                ViolationKind::PlaceholderToken,
            ]
        );
    }

    #[test]
    fn test_whitespace_detection() {
        assert!(has_odd_whitespace("a\u{00A0}b"));
        assert!(has_odd_whitespace("a\tb"));
        assert!(has_odd_whitespace("a\n\n\nb"));
        assert!(!has_odd_whitespace("a\n\nb"));
    }

    #[test]
    fn test_score() {
        assert_eq!(score(0, 0, 3), 100);
        assert_eq!(score(2, 3, 3), 70);
        assert_eq!(score(1, 5, 3), 83);
        assert_eq!(score(7, 0, 3), 0);
    }
}
