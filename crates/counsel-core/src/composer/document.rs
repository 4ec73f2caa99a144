//! The document model handed to renderers, and the per-run summary record

use super::attempt::AttemptState;
use super::polish::PolishReport;
use crate::length::{content_chars, word_count, LengthController, SectionSpec};
use crate::quality::ViolationKind;
use crate::scoring::MatchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kept draft for one report section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub spec: SectionSpec,
    /// Cleaned section text
    pub text: String,
    /// Non-whitespace characters in `text`
    pub char_count: usize,
    /// Which attempt produced this draft, starting at 1
    pub attempt: u32,
    /// Generator calls spent on the section
    pub attempts_made: u32,
    /// Kinds detected in the raw draft
    pub violations: Vec<ViolationKind>,
    /// Kinds that survived repair
    pub outstanding: Vec<ViolationKind>,
    pub score: u8,
    pub within_band: bool,
    pub verification_notes: usize,
    pub state: AttemptState,
}

impl SectionDraft {
    pub fn is_clean(&self) -> bool {
        self.state == AttemptState::Accepted
    }
}

/// Document-level figures computed from the accepted sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub target_pages: f64,
    pub char_count: usize,
    pub word_count: usize,
    pub page_estimate: f64,
    pub verification_notes: usize,
    /// What the cross-section polish pass changed
    #[serde(default)]
    pub polish: PolishReport,
}

/// Finished report. Sections are always in table-of-contents order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub sections: Vec<SectionDraft>,
    pub matches: Vec<MatchResult>,
    pub metadata: ReportMetadata,
}

impl ReportDocument {
    /// Build the document, ordering sections by table-of-contents position
    pub fn assemble(
        mut sections: Vec<SectionDraft>,
        matches: Vec<MatchResult>,
        target_pages: f64,
        lengths: &LengthController,
    ) -> Self {
        sections.sort_by_key(|s| s.spec.order);

        let char_count = sections.iter().map(|s| content_chars(&s.text)).sum();
        let words = sections.iter().map(|s| word_count(&s.text)).sum();
        let verification_notes = sections.iter().map(|s| s.verification_notes).sum();

        Self {
            sections,
            matches,
            metadata: ReportMetadata {
                run_id: Uuid::new_v4(),
                generated_at: Utc::now(),
                target_pages,
                char_count,
                word_count: words,
                page_estimate: lengths.estimate_pages(char_count),
                verification_notes,
                polish: PolishReport::default(),
            },
        }
    }

    /// (heading, body) pairs in order, for renderers
    pub fn sections_for_render(&self) -> Vec<(String, String)> {
        self.sections
            .iter()
            .map(|s| (s.spec.name.clone(), s.text.clone()))
            .collect()
    }

    /// Sections kept with violations or out of band
    pub fn degraded_sections(&self) -> impl Iterator<Item = &SectionDraft> {
        self.sections.iter().filter(|s| !s.is_clean())
    }

    pub fn summary(&self, rationale_fallbacks: usize) -> RunSummary {
        RunSummary {
            run_id: self.metadata.run_id,
            generated_at: self.metadata.generated_at,
            target_pages: self.metadata.target_pages,
            page_estimate: self.metadata.page_estimate,
            char_count: self.metadata.char_count,
            verification_notes: self.metadata.verification_notes,
            rationale_fallbacks,
            sections: self.sections.iter().map(SectionRecord::from).collect(),
            polish: self.metadata.polish.clone(),
        }
    }
}

/// Validation record for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub name: String,
    pub char_count: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub attempts: u32,
    pub violations: Vec<ViolationKind>,
    pub score: u8,
    pub verification_notes: usize,
    pub state: AttemptState,
}

impl From<&SectionDraft> for SectionRecord {
    fn from(draft: &SectionDraft) -> Self {
        Self {
            name: draft.spec.name.clone(),
            char_count: draft.char_count,
            min_chars: draft.spec.min_chars,
            max_chars: draft.spec.max_chars,
            attempts: draft.attempts_made,
            violations: draft.violations.clone(),
            score: draft.score,
            verification_notes: draft.verification_notes,
            state: draft.state,
        }
    }
}

/// One persisted record per report run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub target_pages: f64,
    pub page_estimate: f64,
    pub char_count: usize,
    pub verification_notes: usize,
    /// Schools whose rationale fell back to the fixed template
    pub rationale_fallbacks: usize,
    pub sections: Vec<SectionRecord>,
    #[serde(default)]
    pub polish: PolishReport,
}
