//! Deterministic repairs for the repairable violation kinds
//!
//! Each repair is idempotent on its own output. Placeholders are left alone.

use super::evaluation::{has_markdown, short_sentence_runs, split_sentences, SentenceSpan};
use super::rules::*;
use crate::length::is_cjk;
use regex::Captures;

const MAX_MARKDOWN_PASSES: usize = 8;

/// Strip Markdown, keeping the text it decorated
pub(crate) fn strip_markdown(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_MARKDOWN_PASSES {
        if !has_markdown(&current) {
            return current;
        }
        current = markdown_pass(&current);
    }

    if has_markdown(&current) {
        // Markers that survived every pass only ever nest; drop the symbols
        current = current.replace(['*', '`', '|'], "").replace("~~", "").replace("__", "");
        current = LINE_MARKER.replace_all(&current, "").into_owned();
        current = HORIZONTAL_RULE.replace_all(&current, "").into_owned();
        current = LINK.replace_all(&current, "$1").into_owned();
    }
    current
}

fn markdown_pass(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, "");
    let text = TABLE_SEPARATOR.replace_all(&text, "");
    let text = TABLE_ROW.replace_all(&text, |caps: &Captures<'_>| {
        caps[1]
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    });
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = LINE_MARKER.replace_all(&text, "");
    let text = HORIZONTAL_RULE.replace_all(&text, "");
    let text = STAR_EMPHASIS.replace_all(&text, "${lead}${body}");
    let text = UNDERSCORE_EMPHASIS.replace_all(&text, "$1");
    let text = STRIKETHROUGH.replace_all(&text, "$1");
    text.into_owned()
}

/// Remove emoji. An emoji between two words leaves one space behind so the
/// words stay apart; doubled spaces are left to whitespace normalisation.
pub(crate) fn strip_emoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in EMOJI.find_iter(text) {
        out.push_str(&text[last..found.start()]);
        let before = text[..found.start()].chars().next_back();
        let after = text[found.end()..].chars().next();
        let between_words = matches!(
            (before, after),
            (Some(b), Some(a)) if !b.is_whitespace() && starts_word(a)
        );
        if between_words && found.as_str().contains(' ') {
            out.push(' ');
        }
        last = found.end();
    }
    out.push_str(&text[last..]);
    out
}

fn starts_word(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '(' | '"' | '\'' | '“' | '‘')
}

/// Normalise spaces and line breaks
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = ZERO_WIDTH.replace_all(&text, "");
    let text = ODD_SPACE.replace_all(&text, " ");
    let text = SPACE_RUN.replace_all(&text, " ");
    let text = TRAILING_SPACE.replace_all(&text, "");
    let text = BLANK_LINE_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Fold runs of short sentences into one sentence joined by commas
pub(crate) fn merge_short_sentences(text: &str, min_chars: usize) -> String {
    text.split('\n')
        .map(|line| merge_line(line, min_chars))
        .collect::<Vec<_>>()
        .join("\n")
}

fn merge_line(line: &str, min_chars: usize) -> String {
    let spans = split_sentences(line);
    let runs = short_sentence_runs(&spans, min_chars);
    if runs.is_empty() {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    for (index, span) in spans.iter().enumerate() {
        out.push_str(span.body);
        let inside_run = runs
            .iter()
            .any(|(start, end)| index >= *start && index + 1 < *end);
        if inside_run {
            out.push_str(joiner(span));
        } else {
            out.push_str(span.terminator);
            out.push_str(span.trailing);
        }
    }
    out
}

fn joiner(span: &SentenceSpan<'_>) -> &'static str {
    if span.body.chars().any(is_cjk) || span.terminator.chars().any(is_cjk_punctuation) {
        "，"
    } else {
        ", "
    }
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_keeps_content() {
        let text = "# Heading\n- **Strong** STEM programme\n1. See [the site](https://ucc.on.ca)\n```\nplain\n```";
        let clean = strip_markdown(text);
        assert_eq!(clean, "Heading\nStrong STEM programme\nSee the site\nplain\n");
    }

    #[test]
    fn test_table_rows_become_prose() {
        let text = "| School | Ratio |\n|---|---|\n| UCC | 8:1 |";
        assert_eq!(strip_markdown(text), "School; Ratio\nUCC; 8:1");
    }

    #[test]
    fn test_emoji_spacing() {
        assert_eq!(strip_emoji("Great fit 🎓 for him"), "Great fit for him");
        assert_eq!(strip_emoji("🎉 Welcome"), "Welcome");
        assert_eq!(strip_emoji("很好😀。"), "很好。");
        assert_eq!(strip_emoji("Liam loves robotics🤖 and chess."), "Liam loves robotics and chess.");
        assert_eq!(strip_emoji("Liam loves chess 🤖 and robotics."), "Liam loves chess and robotics.");
        assert_eq!(strip_emoji("He made the team 🎉."), "He made the team.");
    }

    #[test]
    fn test_arithmetic_is_not_emphasis() {
        assert_eq!(strip_markdown("A 5*3*2 grid seats thirty."), "A 5*3*2 grid seats thirty.");
        assert_eq!(strip_markdown("(*keen*) and **bold**"), "(keen) and bold");
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(
            normalize_whitespace("a\u{00A0}b\tc\r\n\n\n\nd  "),
            "a b c\n\nd"
        );
    }

    #[test]
    fn test_merge_short_sentences() {
        let merged = merge_short_sentences(
            "Small rooms. Kind staff. Big field. The campus sits on forty acres of parkland.",
            12,
        );
        assert_eq!(
            merged,
            "Small rooms, Kind staff, Big field. The campus sits on forty acres of parkland."
        );

        let merged = merge_short_sentences("数学很好。英语很好。体育也好。", 12);
        assert_eq!(merged, "数学很好，英语很好，体育也好。");
    }

    #[test]
    fn test_repairs_are_idempotent() {
        let text = "Small rooms. Kind staff. Big field.";
        let once = merge_short_sentences(text, 12);
        assert_eq!(merge_short_sentences(&once, 12), once);

        let ws = normalize_whitespace("a\t\tb\n\n\n");
        assert_eq!(normalize_whitespace(&ws), ws);
    }
}
