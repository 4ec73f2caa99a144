//! Per-section attempt state machine
//!
//! `Pending → Retrying → Accepted | AcceptedWithViolations`. The machine only
//! sees evaluated candidates and generator errors, so it can be driven in
//! tests without a generator.

use super::budget::PlaceholderBudget;
use super::document::SectionDraft;
use crate::error::GenerationError;
use crate::length::{content_chars, SectionSpec};
use crate::quality::{strip_verification_markers, QualityGate, ValidationReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Generator calls per section: the first attempt and one corrective retry
pub const MAX_SECTION_CALLS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Retrying,
    Accepted,
    AcceptedWithViolations,
}

/// What the retry prompt asks the generator to fix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    RemovePlaceholders(Vec<String>),
    Expand(usize),
    Shorten(usize),
    /// Turn verification notes into confident statements, keeping at most `allowed`
    RestateConfidently { allowed: usize },
    /// The call itself failed; the same prompt is sent again
    Regenerate,
}

impl Correction {
    /// Instruction text, or `None` when the prompt is resent unchanged
    pub fn instruction(&self) -> Option<String> {
        match self {
            Correction::RemovePlaceholders(tokens) => Some(format!(
                "Remove placeholder {} and replace it with a concrete statement drawn from the conversation, or leave the point out.",
                tokens.join(", ")
            )),
            Correction::Expand(n) => Some(format!(
                "The previous draft was too short. Expand by about {} characters with substantive detail.",
                n
            )),
            Correction::Shorten(n) => Some(format!(
                "The previous draft was too long. Shorten by about {} characters without dropping key facts.",
                n
            )),
            Correction::RestateConfidently { allowed } => Some(format!(
                "Rewrite verification notes as confident best-effort statements. At most {} \"Parent to verify:\" note(s) may remain.",
                allowed
            )),
            Correction::Regenerate => None,
        }
    }
}

/// One generated draft after the quality gate
#[derive(Debug, Clone)]
pub struct Candidate {
    pub attempt: u32,
    pub report: ValidationReport,
    pub char_count: usize,
    pub within_band: bool,
}

impl Candidate {
    pub fn evaluate(attempt: u32, raw: &str, gate: &QualityGate, spec: &SectionSpec) -> Self {
        let report = gate.validate(raw);
        let char_count = content_chars(&report.clean_text);
        Self {
            attempt,
            within_band: spec.accepts(char_count),
            char_count,
            report,
        }
    }

    /// Placeholder and length fixes this draft needs
    pub fn corrections(&self, spec: &SectionSpec) -> Vec<Correction> {
        let mut corrections = Vec::new();

        if !self.report.placeholders.is_empty() {
            let mut tokens = self.report.placeholders.clone();
            tokens.dedup();
            corrections.push(Correction::RemovePlaceholders(tokens));
        }

        if !self.within_band {
            let distance = spec.target_chars as i64 - self.char_count as i64;
            if distance > 0 {
                corrections.push(Correction::Expand(distance as usize));
            } else {
                corrections.push(Correction::Shorten(distance.unsigned_abs() as usize));
            }
        }
        corrections
    }

    /// Ordering for picking the best attempt: score, then band, then recency
    fn rank_key(&self) -> (u8, bool, u32) {
        (self.report.score, self.within_band, self.attempt)
    }
}

/// Outcome of observing one generator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Retry(Vec<Correction>),
    Done,
}

/// Attempt bookkeeping for one section
#[derive(Debug)]
pub struct SectionAttempt {
    spec: SectionSpec,
    state: AttemptState,
    calls: u32,
    candidates: Vec<Candidate>,
    accepted: Option<usize>,
    last_error: Option<GenerationError>,
}

impl SectionAttempt {
    pub fn new(spec: SectionSpec) -> Self {
        Self {
            spec,
            state: AttemptState::Pending,
            calls: 0,
            candidates: Vec::new(),
            accepted: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn spec(&self) -> &SectionSpec {
        &self.spec
    }

    /// Record one generator call and decide whether to retry.
    ///
    /// A clean, in-band draft is accepted only if its verification notes fit
    /// in the shared budget; otherwise the retry asks for confident statements.
    pub fn observe(
        &mut self,
        outcome: std::result::Result<Candidate, GenerationError>,
        budget: &PlaceholderBudget,
    ) -> Step {
        self.calls += 1;

        let corrections = match outcome {
            Err(error) => {
                warn!(
                    "Section '{}' attempt {} failed: {}",
                    self.spec.name, self.calls, error
                );
                self.last_error = Some(error);
                vec![Correction::Regenerate]
            }
            Ok(candidate) => {
                let mut corrections = candidate.corrections(&self.spec);
                if corrections.is_empty() {
                    let notes = candidate.report.verification_notes;
                    if budget.try_reserve(notes) {
                        self.accepted = Some(self.candidates.len());
                        self.candidates.push(candidate);
                        self.state = AttemptState::Accepted;
                        return Step::Done;
                    }
                    corrections.push(Correction::RestateConfidently {
                        allowed: budget.remaining(),
                    });
                }
                self.candidates.push(candidate);
                corrections
            }
        };

        if self.calls < MAX_SECTION_CALLS {
            debug!(
                "Section '{}' retrying: {:?}",
                self.spec.name, corrections
            );
            self.state = AttemptState::Retrying;
            Step::Retry(corrections)
        } else {
            Step::Done
        }
    }

    /// Turn the attempts into the kept draft.
    ///
    /// Without an accepted draft the best candidate is kept; any verification
    /// notes beyond what the budget still grants are stripped from it. Fails
    /// only when no call produced text at all.
    pub fn finish(
        mut self,
        budget: &PlaceholderBudget,
    ) -> std::result::Result<SectionDraft, GenerationError> {
        if let Some(index) = self.accepted {
            let candidate = self.candidates.swap_remove(index);
            let reserved = candidate.report.verification_notes;
            let draft = self.into_draft(candidate, reserved);
            info!(
                "Section '{}' accepted on attempt {} ({} chars)",
                draft.spec.name, draft.attempt, draft.char_count
            );
            return Ok(draft);
        }

        let best = self
            .candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| c.rank_key())
            .map(|(i, _)| i);
        let Some(index) = best else {
            return Err(self
                .last_error
                .take()
                .unwrap_or_else(|| GenerationError::Malformed("no draft produced".to_string())));
        };

        let candidate = self.candidates.swap_remove(index);
        let draft = self.into_draft(candidate, 0);
        let draft = settle_notes(draft, budget);
        warn!(
            "Section '{}' kept best attempt {} (outstanding {:?}, {} chars, band {}-{})",
            draft.spec.name,
            draft.attempt,
            draft.outstanding,
            draft.char_count,
            draft.spec.min_chars,
            draft.spec.max_chars
        );
        Ok(draft)
    }

    fn into_draft(self, candidate: Candidate, verification_notes: usize) -> SectionDraft {
        let state = if candidate.report.has_outstanding() || !candidate.within_band {
            AttemptState::AcceptedWithViolations
        } else {
            AttemptState::Accepted
        };
        SectionDraft {
            spec: self.spec,
            text: candidate.report.clean_text,
            char_count: candidate.char_count,
            attempt: candidate.attempt,
            attempts_made: self.calls,
            violations: candidate.report.violations,
            outstanding: candidate.report.outstanding,
            score: candidate.report.score,
            within_band: candidate.within_band,
            verification_notes,
            state,
        }
    }
}

/// Reserve a draft's verification notes, stripping the ones the budget refuses
pub(crate) fn settle_notes(mut draft: SectionDraft, budget: &PlaceholderBudget) -> SectionDraft {
    let notes = crate::quality::evaluation::count_verification_notes(&draft.text);
    let granted = budget.reserve_up_to(notes);
    if granted < notes {
        let (text, removed) = strip_verification_markers(&draft.text, granted);
        info!(
            "Section '{}': {} verification note(s) restated over the document cap",
            draft.spec.name, removed
        );
        draft.char_count = content_chars(&text);
        draft.within_band = draft.spec.accepts(draft.char_count);
        draft.text = text;
        if !draft.within_band {
            draft.state = AttemptState::AcceptedWithViolations;
        }
    }
    draft.verification_notes = granted;
    draft
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SectionSpec {
        SectionSpec {
            name: "School Positioning".to_string(),
            min_chars: 40,
            max_chars: 80,
            target_chars: 60,
            order: 1,
        }
    }

    fn candidate(attempt: u32, raw: &str) -> Candidate {
        Candidate::evaluate(attempt, raw, &QualityGate::default(), &spec())
    }

    const IN_BAND: &str = "Both schools suit Liam well, with strong science programmes and small classes.";

    #[test]
    fn test_clean_first_attempt_is_accepted() {
        let budget = PlaceholderBudget::new(3);
        let mut attempt = SectionAttempt::new(spec());

        assert_eq!(attempt.observe(Ok(candidate(1, IN_BAND)), &budget), Step::Done);
        assert_eq!(attempt.state(), AttemptState::Accepted);

        let draft = attempt.finish(&budget).unwrap();
        assert_eq!(draft.attempt, 1);
        assert_eq!(draft.attempts_made, 1);
        assert!(draft.violations.is_empty());
    }

    #[test]
    fn test_placeholder_retries_once_then_keeps_best() {
        let budget = PlaceholderBudget::new(3);
        let mut attempt = SectionAttempt::new(spec());
        let raw = "Both schools suit {{student_name}} well, with strong science programmes.";

        let step = attempt.observe(Ok(candidate(1, raw)), &budget);
        assert_eq!(
            step,
            Step::Retry(vec![Correction::RemovePlaceholders(vec![
                "{{student_name}}".to_string()
            ])])
        );
        assert_eq!(attempt.state(), AttemptState::Retrying);

        assert_eq!(attempt.observe(Ok(candidate(2, raw)), &budget), Step::Done);
        let draft = attempt.finish(&budget).unwrap();
        assert_eq!(draft.state, AttemptState::AcceptedWithViolations);
        assert_eq!(draft.attempts_made, 2);
        assert!(draft.violations.contains(&crate::quality::ViolationKind::PlaceholderToken));
    }

    #[test]
    fn test_length_correction() {
        let budget = PlaceholderBudget::new(3);
        let mut attempt = SectionAttempt::new(spec());
        match attempt.observe(Ok(candidate(1, "Too short.")), &budget) {
            Step::Retry(corrections) => {
                assert_eq!(corrections, vec![Correction::Expand(60 - 9)]);
            }
            Step::Done => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_exhausted_budget_asks_for_confidence() {
        let budget = PlaceholderBudget::new(0);
        let mut attempt = SectionAttempt::new(spec());
        let raw = "Parent to verify: both schools suit Liam well with strong science.";

        let step = attempt.observe(Ok(candidate(1, raw)), &budget);
        assert_eq!(
            step,
            Step::Retry(vec![Correction::RestateConfidently { allowed: 0 }])
        );

        attempt.observe(Ok(candidate(2, raw)), &budget);
        let draft = attempt.finish(&budget).unwrap();
        assert_eq!(draft.verification_notes, 0);
        assert!(!draft.text.contains("Parent to verify"));
        assert!(draft.text.starts_with("Both schools"));
    }

    #[test]
    fn test_generation_failures() {
        let budget = PlaceholderBudget::new(3);
        let mut attempt = SectionAttempt::new(spec());
        let step = attempt.observe(Err(GenerationError::Timeout(100)), &budget);
        assert_eq!(step, Step::Retry(vec![Correction::Regenerate]));
        attempt.observe(Err(GenerationError::Provider("down".to_string())), &budget);

        assert_eq!(
            attempt.finish(&budget).unwrap_err(),
            GenerationError::Provider("down".to_string())
        );
    }

    #[test]
    fn test_best_attempt_prefers_score_then_band() {
        let budget = PlaceholderBudget::new(3);
        let mut attempt = SectionAttempt::new(spec());
        attempt.observe(Ok(candidate(1, "Short 🎓 text {{x}}.")), &budget);
        attempt.observe(Ok(candidate(2, "Too short {{x}}.")), &budget);

        let draft = attempt.finish(&budget).unwrap();
        assert_eq!(draft.attempt, 2);
    }
}
