//! Pattern tables for the quality gate, compiled once

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Code fence lines, removed whole so the fenced content survives
    pub(crate) static ref CODE_FENCE: Regex =
        Regex::new(r"(?m)^[ \t]*(?:```|~~~)[^\n]*(?:\n|\z)").unwrap();

    /// Table separator rows such as `|---|:---:|`
    pub(crate) static ref TABLE_SEPARATOR: Regex = Regex::new(
        r"(?m)^[ \t]*\|?(?:[ \t]*:?-{3,}:?[ \t]*\|)+(?:[ \t]*:?-{3,}:?)?[ \t]*(?:\n|\z)"
    )
    .unwrap();

    /// Table rows delimited by pipes
    pub(crate) static ref TABLE_ROW: Regex =
        Regex::new(r"(?m)^[ \t]*\|([^\n]*)\|[ \t]*$").unwrap();

    /// Links and images; the visible text is kept
    pub(crate) static ref LINK: Regex =
        Regex::new(r"!?\[([^\[\]\n]*)\]\([^()\n]*\)").unwrap();

    pub(crate) static ref INLINE_CODE: Regex = Regex::new(r"`+([^`\n]+?)`+").unwrap();

    /// Heading, bullet, numbered-list and quote markers at the start of a line
    pub(crate) static ref LINE_MARKER: Regex =
        Regex::new(r"(?m)^[ \t]*(?:(?:#{1,6}|[-*+•>]|\d{1,2}[.)])[ \t]+)+").unwrap();

    pub(crate) static ref HORIZONTAL_RULE: Regex =
        Regex::new(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,}|={3,})[ \t]*$").unwrap();

    /// Emphasis markers hug their content on both sides and never follow a
    /// letter or digit, so `5*3*2` stays arithmetic
    pub(crate) static ref STAR_EMPHASIS: Regex = Regex::new(
        r"(?m)(?P<lead>^|[^\p{L}\p{N}*\\])\*{1,3}(?P<body>[^\s*](?:[^*\n]*?[^\s*])?)\*{1,3}"
    )
    .unwrap();
    pub(crate) static ref UNDERSCORE_EMPHASIS: Regex =
        Regex::new(r"__([^\s_](?:[^_\n]*?[^\s_])?)__").unwrap();
    pub(crate) static ref STRIKETHROUGH: Regex =
        Regex::new(r"~~([^\s~](?:[^~\n]*?[^\s~])?)~~").unwrap();

    /// Emoji with at most one space on either side
    pub(crate) static ref EMOJI: Regex = Regex::new(
        r" ?[\x{1F000}-\x{1FAFF}\x{231A}-\x{23FF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE0F}\x{200D}\x{20E3}]+ ?"
    )
    .unwrap();

    /// Whitespace that is never valid in a rendered paragraph
    pub(crate) static ref ODD_SPACE: Regex =
        Regex::new(r"[\x{00A0}\x{2000}-\x{200A}\x{202F}\x{205F}\x{3000}\t]").unwrap();
    pub(crate) static ref ZERO_WIDTH: Regex = Regex::new(r"[\x{200B}\x{2060}\x{FEFF}]").unwrap();

    /// Two or more consecutive blank lines
    pub(crate) static ref BLANK_LINE_RUN: Regex =
        Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap();

    pub(crate) static ref SPACE_RUN: Regex = Regex::new(r" {2,}").unwrap();
    pub(crate) static ref TRAILING_SPACE: Regex = Regex::new(r"(?m)[ ]+$").unwrap();

    /// Unresolved template tokens. One alternation so occurrences never double count.
    pub(crate) static ref PLACEHOLDER: Regex = Regex::new(
        r"(?x)
          \{\{[^{}\n]*\}\}
        | \$\{[^{}\n]*\}
        | \[\s*(?i:tbd|tbc|todo|insert[^\]\n]*|placeholder[^\]\n]*|to\ be\ (?:filled|confirmed|added)[^\]\n]*)\s*\]
        | （\s*(?:由面谈补充|TBD|待定|待补充|待家长确认[^）\n]*)\s*）
        | \((?i:tbd|to\ be\ (?:filled|confirmed|added)[^)\n]*)\)
        | \b(?:TBD|TODO)\b
        "
    )
    .unwrap();

    /// Explicit "needs verification" annotations the writer may leave in prose
    pub(crate) static ref VERIFICATION_MARKER: Regex = Regex::new(
        r"(?i)(?:\b(?:parents?|family)\s+to\s+(?:verify|confirm)\s*:\s*|(?:家长需核实|需家长核实|待核实)[：:]\s*)"
    )
    .unwrap();
}

/// Sentence terminators
pub(crate) fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…')
}

/// Closing punctuation that belongs to the sentence before it
pub(crate) fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | '”' | '’' | '）' | '」' | '』')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_alternation_counts_once() {
        assert_eq!(PLACEHOLDER.find_iter("See [TBD] and TBD.").count(), 2);
        assert_eq!(PLACEHOLDER.find_iter("学费（TBD）").count(), 1);
        assert_eq!(PLACEHOLDER.find_iter("Dear {{parent_name}},").count(), 1);
        assert_eq!(PLACEHOLDER.find_iter("A well-rounded student").count(), 0);
    }

    #[test]
    fn test_verification_marker() {
        assert!(VERIFICATION_MARKER.is_match("Parent to verify: tuition is $68,000."));
        assert!(VERIFICATION_MARKER.is_match("家长需核实：入学考试日期"));
        assert!(!VERIFICATION_MARKER.is_match("The parent verified the dates."));
    }

    #[test]
    fn test_emphasis_needs_tight_markers() {
        assert!(STAR_EMPHASIS.is_match("a **bold** claim"));
        assert!(STAR_EMPHASIS.is_match("(*keen*)"));
        assert!(!STAR_EMPHASIS.is_match("5 * 3 * 2"));
        assert!(!STAR_EMPHASIS.is_match("5*3*2 is thirty"));
    }

    #[test]
    fn test_clock_symbols_are_emoji() {
        for text in ["Apply early ⌚", "Deadlines ⏰ loom", "Waitlist ⏳"] {
            assert!(EMOJI.is_match(text), "{}", text);
        }
    }
}
