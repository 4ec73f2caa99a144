//! Cross-section polish
//!
//! Sections are written independently, so the same boilerplate tends to
//! reappear chapter after chapter. Once every section is accepted this pass
//! drops near-duplicate paragraphs and repeated template sentences. It never
//! takes a section below its minimum length or removes its last paragraph;
//! duplicates it cannot remove are flagged instead. Everything it does is
//! recorded in a [`PolishReport`].

use super::document::SectionDraft;
use crate::length::{content_chars, is_cjk};
use crate::quality::evaluation::{count_verification_notes, split_sentences};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Boilerplate allowed at most once per document
pub const TEMPLATE_BLACKLIST: &[&str] = &[
    "academic excellence, leadership development and a strong alumni network",
    "stands out academically and fits the school's strengths",
    "demonstrates leadership and innovative thinking",
    "whole-person education",
    "holistic education philosophy",
    "highly international",
    "our professional value",
    "guaranteed success",
    "professional team",
    "extensive experience",
    "quality service",
    "学术卓越，领导力培养，校友网络强大",
    "在学术能力方面表现突出，与学校特色高度契合",
    "展现领导力和创新思维",
    "全人教育理念",
    "国际化程度高",
    "我们的专业价值",
    "成功保障",
    "专业团队",
    "丰富经验",
    "优质服务",
];

/// Paragraphs at or below this many characters are never compared
const MIN_PARAGRAPH_CHARS: usize = 20;

/// Token overlap that makes two paragraphs duplicates on its own
const DUPLICATE_OVERLAP: f64 = 0.85;

/// Lower overlap that counts when the paragraphs also share key phrases
const KEY_PHRASE_OVERLAP: f64 = 0.6;
const KEY_PHRASE_CHARS: usize = 30;
const KEY_PHRASE_MIN_SHARED: usize = 3;

/// Limits past which the pass reports an issue
const MAX_REDUCTION_PERCENT: f64 = 8.0;
const MIN_PARAGRAPH_SHARE: f64 = 0.5;

/// Length of the excerpt stored for a paragraph action
const EXCERPT_CHARS: usize = 60;

lazy_static! {
    static ref NAMED_ENTITY: Regex = Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\d+").unwrap();
    static ref MILESTONE: Regex = Regex::new(
        r"(?i)\b(?:completed|achieved|won|led|organi[sz]ed|founded|placed|earned)\b|完成|实现|达到|获得|参与|组织|领导"
    )
    .unwrap();
}

/// What the pass did to one piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolishActionKind {
    DroppedParagraph,
    /// Duplicate kept because its section could not spare it
    FlaggedParagraph,
    RemovedTemplate,
    /// Repeated template kept because its section could not spare it
    FlaggedTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolishAction {
    pub kind: PolishActionKind,
    /// Section that was edited or flagged
    pub section: String,
    /// Section holding the copy that stayed, for paragraph actions
    pub kept_in: Option<String>,
    /// The template phrase, or the opening of the paragraph
    pub detail: String,
}

/// Record of one polish pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolishReport {
    pub actions: Vec<PolishAction>,
    pub chars_before: usize,
    pub chars_after: usize,
    pub paragraphs_before: usize,
    pub paragraphs_after: usize,
    /// Limits the pass exceeded; empty when it stayed within them
    pub issues: Vec<String>,
}

impl PolishReport {
    pub fn count(&self, kind: PolishActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    pub fn meets_criteria(&self) -> bool {
        self.issues.is_empty()
    }

    /// Share of characters removed, as a percentage
    pub fn reduction_percent(&self) -> f64 {
        if self.chars_before == 0 {
            return 0.0;
        }
        (self.chars_before - self.chars_after.min(self.chars_before)) as f64 * 100.0
            / self.chars_before as f64
    }

    fn check_limits(&mut self) {
        self.issues.clear();
        let reduction = self.reduction_percent();
        if reduction > MAX_REDUCTION_PERCENT {
            self.issues
                .push(format!("removed {:.1}% of the text", reduction));
        }
        if (self.paragraphs_after as f64) < self.paragraphs_before as f64 * MIN_PARAGRAPH_SHARE {
            self.issues.push(format!(
                "kept {} of {} paragraphs",
                self.paragraphs_after, self.paragraphs_before
            ));
        }
    }
}

/// Paragraphs of every section with their kept flags
struct Layout {
    paragraphs: Vec<Vec<String>>,
    kept: Vec<Vec<bool>>,
    dirty: Vec<bool>,
}

impl Layout {
    fn new(sections: &[SectionDraft]) -> Self {
        let paragraphs: Vec<Vec<String>> =
            sections.iter().map(|s| split_paragraphs(&s.text)).collect();
        let kept = paragraphs.iter().map(|p| vec![true; p.len()]).collect();
        Self {
            dirty: vec![false; paragraphs.len()],
            paragraphs,
            kept,
        }
    }

    fn kept_chars(&self, section: usize) -> usize {
        self.paragraphs[section]
            .iter()
            .zip(&self.kept[section])
            .filter(|(_, kept)| **kept)
            .map(|(p, _)| content_chars(p))
            .sum()
    }

    fn kept_count(&self, section: usize) -> usize {
        self.kept[section].iter().filter(|k| **k).count()
    }

    fn eligible_count(&self) -> usize {
        self.paragraphs
            .iter()
            .zip(&self.kept)
            .flat_map(|(ps, ks)| ps.iter().zip(ks))
            .filter(|(p, kept)| **kept && is_eligible(p))
            .count()
    }

    /// Whether removing `chars` from the section keeps it at or above `min_chars`
    fn can_spare(&self, section: usize, chars: usize, min_chars: usize) -> bool {
        self.kept_chars(section).saturating_sub(chars) >= min_chars
    }

    fn text(&self, section: usize) -> String {
        self.paragraphs[section]
            .iter()
            .zip(&self.kept[section])
            .filter(|(_, kept)| **kept)
            .map(|(p, _)| p.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Run the polish pass over accepted sections, sorting them into
/// table-of-contents order first
pub fn polish(sections: &mut [SectionDraft]) -> PolishReport {
    sections.sort_by_key(|s| s.spec.order);

    let mut layout = Layout::new(sections);
    let mut report = PolishReport {
        chars_before: sections.iter().map(|s| content_chars(&s.text)).sum(),
        paragraphs_before: layout.eligible_count(),
        ..PolishReport::default()
    };

    drop_duplicate_paragraphs(sections, &mut layout, &mut report);
    remove_repeated_templates(sections, &mut layout, &mut report);

    for (index, section) in sections.iter_mut().enumerate() {
        if !layout.dirty[index] {
            continue;
        }
        section.text = layout.text(index);
        section.char_count = content_chars(&section.text);
        section.within_band = section.spec.accepts(section.char_count);
        section.verification_notes = count_verification_notes(&section.text);
    }

    report.chars_after = sections.iter().map(|s| content_chars(&s.text)).sum();
    report.paragraphs_after = layout.eligible_count();
    report.check_limits();

    info!(
        "Polish pass: {} paragraphs dropped, {} templates removed, {} flagged, {:.1}% shorter",
        report.count(PolishActionKind::DroppedParagraph),
        report.count(PolishActionKind::RemovedTemplate),
        report.count(PolishActionKind::FlaggedParagraph)
            + report.count(PolishActionKind::FlaggedTemplate),
        report.reduction_percent()
    );
    for issue in &report.issues {
        warn!("Polish pass exceeded its limits: {}", issue);
    }
    report
}

fn drop_duplicate_paragraphs(
    sections: &[SectionDraft],
    layout: &mut Layout,
    report: &mut PolishReport,
) {
    let positions: Vec<(usize, usize)> = layout
        .paragraphs
        .iter()
        .enumerate()
        .flat_map(|(s, ps)| {
            ps.iter()
                .enumerate()
                .filter(|(_, p)| is_eligible(p))
                .map(move |(p, _)| (s, p))
        })
        .collect();
    let texts: Vec<String> = positions
        .iter()
        .map(|(s, p)| layout.paragraphs[*s][*p].clone())
        .collect();
    let token_sets: Vec<HashSet<String>> = texts.iter().map(|t| tokens(t)).collect();

    for a in 0..positions.len() {
        for b in (a + 1)..positions.len() {
            let (sa, pa) = positions[a];
            let (sb, pb) = positions[b];
            if !layout.kept[sa][pa] || !layout.kept[sb][pb] {
                continue;
            }

            let overlap = token_overlap(&token_sets[a], &token_sets[b]);
            let duplicate = overlap >= DUPLICATE_OVERLAP
                || (overlap >= KEY_PHRASE_OVERLAP
                    && has_shared_key_phrases(
                        &texts[a],
                        &texts[b],
                        KEY_PHRASE_CHARS,
                        KEY_PHRASE_MIN_SHARED,
                    ));
            if !duplicate {
                continue;
            }

            // The denser paragraph stays; on a tie the earlier one does
            let (keep, drop) = if info_density(&texts[b]) > info_density(&texts[a]) {
                (b, a)
            } else {
                (a, b)
            };
            let (keep_section, _) = positions[keep];
            let (drop_section, drop_paragraph) = positions[drop];
            debug!(
                "Paragraphs in '{}' and '{}' overlap {:.2}",
                sections[sa].spec.name, sections[sb].spec.name, overlap
            );

            let removable = layout.kept_count(drop_section) > 1
                && layout.can_spare(
                    drop_section,
                    content_chars(&texts[drop]),
                    sections[drop_section].spec.min_chars,
                );
            let kind = if removable {
                layout.kept[drop_section][drop_paragraph] = false;
                layout.dirty[drop_section] = true;
                PolishActionKind::DroppedParagraph
            } else {
                PolishActionKind::FlaggedParagraph
            };
            report.actions.push(PolishAction {
                kind,
                section: sections[drop_section].spec.name.clone(),
                kept_in: Some(sections[keep_section].spec.name.clone()),
                detail: excerpt(&texts[drop]),
            });
        }
    }
}

fn remove_repeated_templates(
    sections: &[SectionDraft],
    layout: &mut Layout,
    report: &mut PolishReport,
) {
    let lowered: Vec<String> = TEMPLATE_BLACKLIST.iter().map(|t| t.to_lowercase()).collect();
    let mut seen: HashMap<usize, usize> = HashMap::new();

    for section in 0..layout.paragraphs.len() {
        for paragraph in 0..layout.paragraphs[section].len() {
            if !layout.kept[section][paragraph] {
                continue;
            }
            let original = layout.paragraphs[section][paragraph].clone();
            let mut rebuilt = Vec::new();
            let mut changed = false;

            for line in original.split('\n') {
                let spans = split_sentences(line);
                let mut kept_line = String::with_capacity(line.len());
                let line_sentences = spans.len();
                let mut removed_in_line = 0;

                for span in &spans {
                    let sentence = format!("{}{}", span.body, span.terminator);
                    let lower = sentence.to_lowercase();
                    let mut repeated = None;
                    for (index, template) in lowered.iter().enumerate() {
                        if lower.contains(template.as_str()) {
                            let count = seen.entry(index).or_insert(0);
                            *count += 1;
                            if *count > 1 && repeated.is_none() {
                                repeated = Some(index);
                            }
                        }
                    }

                    let Some(template) = repeated else {
                        kept_line.push_str(&sentence);
                        kept_line.push_str(span.trailing);
                        continue;
                    };

                    let chars = content_chars(&sentence);
                    let removable = removed_in_line + 1 < line_sentences
                        && layout.can_spare(section, chars, sections[section].spec.min_chars);
                    let kind = if removable {
                        removed_in_line += 1;
                        changed = true;
                        // Later checks see the shorter section
                        shrink_paragraph(layout, section, paragraph, &sentence);
                        PolishActionKind::RemovedTemplate
                    } else {
                        kept_line.push_str(&sentence);
                        kept_line.push_str(span.trailing);
                        PolishActionKind::FlaggedTemplate
                    };
                    report.actions.push(PolishAction {
                        kind,
                        section: sections[section].spec.name.clone(),
                        kept_in: None,
                        detail: TEMPLATE_BLACKLIST[template].to_string(),
                    });
                }
                rebuilt.push(kept_line.trim_end().to_string());
            }

            if changed {
                layout.paragraphs[section][paragraph] = rebuilt.join("\n");
                layout.dirty[section] = true;
            }
        }
    }
}

/// Remove one sentence from a stored paragraph so section length checks stay current
fn shrink_paragraph(layout: &mut Layout, section: usize, paragraph: usize, sentence: &str) {
    let text = &mut layout.paragraphs[section][paragraph];
    if let Some(start) = text.find(sentence) {
        text.replace_range(start..start + sentence.len(), "");
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn is_eligible(paragraph: &str) -> bool {
    content_chars(paragraph) > MIN_PARAGRAPH_CHARS
}

/// Lowercased words, with each CJK character as its own token
fn tokens(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.insert(std::mem::take(&mut word));
            }
            out.insert(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }
    out
}

/// Jaccard overlap of two token sets
fn token_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whether two paragraphs share at least `min_count` identical runs of
/// `min_len` characters, ignoring case and whitespace width
pub(crate) fn has_shared_key_phrases(a: &str, b: &str, min_len: usize, min_count: usize) -> bool {
    let first = windows(a, min_len);
    let second = windows(b, min_len);
    first.intersection(&second).count() >= min_count
}

fn windows(text: &str, len: usize) -> HashSet<String> {
    let mut chars: Vec<char> = Vec::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            if chars.last().map_or(false, |last| *last != ' ') {
                chars.push(' ');
            }
        } else {
            chars.push(c);
        }
    }
    if chars.len() < len {
        return HashSet::new();
    }
    chars.windows(len).map(|w| w.iter().collect()).collect()
}

/// Named entities, numbers and milestones per hundred characters
fn info_density(text: &str) -> f64 {
    let length = text.chars().count();
    if length == 0 {
        return 0.0;
    }
    let signals = NAMED_ENTITY.find_iter(text).count()
        + NUMBER.find_iter(text).count()
        + MILESTONE.find_iter(text).count();
    signals as f64 * 100.0 / length as f64
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::attempt::AttemptState;
    use crate::length::SectionSpec;

    fn section(name: &str, order: usize, min_chars: usize, text: &str) -> SectionDraft {
        let char_count = content_chars(text);
        SectionDraft {
            spec: SectionSpec {
                name: name.to_string(),
                min_chars,
                max_chars: 10_000,
                target_chars: min_chars.max(1),
                order,
            },
            text: text.to_string(),
            char_count,
            attempt: 1,
            attempts_made: 1,
            violations: Vec::new(),
            outstanding: Vec::new(),
            score: 100,
            within_band: true,
            verification_notes: count_verification_notes(text),
            state: AttemptState::Accepted,
        }
    }

    const SHARED: &str = "Upper Canada College offers a rigorous academic programme with small classes and dedicated teachers who know every boy by name.";

    #[test]
    fn test_duplicate_paragraph_dropped_from_later_section() {
        let mut sections = vec![
            section(
                "Student-School Matching",
                2,
                10,
                &format!("{}\n\nLiam won the provincial robotics final in 2024.", SHARED),
            ),
            section(
                "School Positioning",
                1,
                10,
                &format!("Two schools lead the list for the family.\n\n{}", SHARED),
            ),
        ];

        let report = polish(&mut sections);

        // Sorted back into table-of-contents order
        assert_eq!(sections[0].spec.name, "School Positioning");
        assert_eq!(report.count(PolishActionKind::DroppedParagraph), 1);
        let action = &report.actions[0];
        assert_eq!(action.section, "Student-School Matching");
        assert_eq!(action.kept_in.as_deref(), Some("School Positioning"));

        assert!(sections[0].text.contains(SHARED));
        assert_eq!(
            sections[1].text,
            "Liam won the provincial robotics final in 2024."
        );
        assert_eq!(sections[1].char_count, content_chars(&sections[1].text));
        assert_eq!(report.chars_after, report.chars_before - content_chars(SHARED));
    }

    #[test]
    fn test_sole_paragraph_is_only_flagged() {
        let mut sections = vec![
            section("School Positioning", 1, 10, SHARED),
            section("Student-School Matching", 2, 10, SHARED),
        ];
        let before: Vec<String> = sections.iter().map(|s| s.text.clone()).collect();

        let report = polish(&mut sections);

        assert_eq!(report.count(PolishActionKind::FlaggedParagraph), 1);
        assert_eq!(report.count(PolishActionKind::DroppedParagraph), 0);
        let after: Vec<String> = sections.iter().map(|s| s.text.clone()).collect();
        assert_eq!(after, before);
    }

    #[test]
    fn test_minimum_length_protects_section() {
        let other = "Liam won the provincial robotics final in 2024.";
        let min = content_chars(SHARED) + content_chars(other);
        let mut sections = vec![
            section("School Positioning", 1, 10, SHARED),
            section(
                "Student-School Matching",
                2,
                min,
                &format!("{}\n\n{}", other, SHARED),
            ),
        ];

        let report = polish(&mut sections);
        assert_eq!(report.count(PolishActionKind::FlaggedParagraph), 1);
        assert!(sections[1].text.contains(SHARED));
        assert!(sections[1].within_band);
    }

    #[test]
    fn test_repeated_template_sentence_removed() {
        let mut sections = vec![
            section(
                "School Positioning",
                1,
                10,
                "Both schools combine academic excellence, leadership development and a strong alumni network. Their campuses sit in midtown Toronto.",
            ),
            section(
                "Student-School Matching",
                2,
                10,
                "Crescent School matches his love of building robots. It also offers academic excellence, leadership development and a strong alumni network. The boarding option suits a family that travels.",
            ),
        ];

        let report = polish(&mut sections);

        assert_eq!(report.count(PolishActionKind::RemovedTemplate), 1);
        assert_eq!(report.actions[0].section, "Student-School Matching");
        assert!(sections[0].text.contains("alumni network"));
        assert_eq!(
            sections[1].text,
            "Crescent School matches his love of building robots. The boarding option suits a family that travels."
        );
    }

    #[test]
    fn test_template_sole_sentence_is_flagged() {
        let mut sections = vec![
            section("School Positioning", 1, 10, "Our professional value is clear to every family we meet."),
            section("Post-Admission Guidance", 5, 10, "Our professional value shows after admission too."),
        ];

        let report = polish(&mut sections);
        assert_eq!(report.count(PolishActionKind::FlaggedTemplate), 1);
        assert_eq!(
            sections[1].text,
            "Our professional value shows after admission too."
        );
    }

    #[test]
    fn test_distinct_sections_untouched() {
        let mut sections = vec![
            section("Family and Student Background", 0, 10, "Liam is a curious grade eight student who builds robots every weekend."),
            section("School Positioning", 1, 10, "Three independent day schools in Toronto fit the family's commute and budget."),
        ];

        let report = polish(&mut sections);
        assert!(report.actions.is_empty());
        assert!(report.meets_criteria());
        assert_eq!(report.chars_before, report.chars_after);
    }

    #[test]
    fn test_large_reduction_is_reported() {
        let mut sections = vec![
            section("School Positioning", 1, 0, &format!("{}\n\nShort closing line here today.", SHARED)),
            section("Student-School Matching", 2, 0, &format!("{}\n\nAnother short closing line.", SHARED)),
        ];

        let report = polish(&mut sections);
        assert_eq!(report.count(PolishActionKind::DroppedParagraph), 1);
        assert!(!report.meets_criteria());
        assert!(report.issues[0].starts_with("removed"));
    }

    #[test]
    fn test_shared_key_phrases() {
        assert!(has_shared_key_phrases(SHARED, &format!("As noted, {}", SHARED), 30, 3));
        assert!(!has_shared_key_phrases(SHARED, "Crescent School is a boys' school in Toronto.", 30, 3));
    }
}
