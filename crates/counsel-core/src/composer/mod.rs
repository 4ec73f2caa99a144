//! Report Composer
//!
//! Turns a finished transcript and a school list into a [`ReportDocument`]:
//! schools are ranked once, the page target is split once, and then every
//! section is generated, gated and retried at most once. Sections run
//! concurrently and share one [`PlaceholderBudget`]; the document always comes
//! back in table-of-contents order. A last [`polish`] pass removes text the
//! sections repeat from each other.

pub mod attempt;
pub mod budget;
pub mod cache;
pub mod document;
pub mod polish;
pub mod prompts;

pub use attempt::{AttemptState, Correction, SectionAttempt};
pub use budget::PlaceholderBudget;
pub use cache::DraftCache;
pub use document::{ReportDocument, ReportMetadata, RunSummary, SectionDraft, SectionRecord};
pub use polish::{PolishAction, PolishActionKind, PolishReport};
pub use prompts::SectionKind;

use crate::config::{ComposerSettings, CounselConfig};
use crate::conversation::{IntakeProfile, Message};
use crate::error::{CounselError, Result};
use crate::generation::{generate_with_timeout, GenerationParams, TextGenerator};
use crate::journal::RunRecordStore;
use crate::length::{LengthController, SectionSpec};
use crate::quality::{strip_verification_markers, QualityGate};
use crate::scoring::{rank, rationale_prompt, MatchResult, SchoolCandidate};
use attempt::{settle_notes, Candidate, Step};
use futures::stream::{self, StreamExt, TryStreamExt};
use prompts::{section_prompt, with_corrections, PromptContext};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Calls spent on one school's rationale before the template is used
const RATIONALE_CALLS: u32 = 2;

/// Composes reports from transcripts
#[derive(Debug)]
pub struct ReportComposer {
    generator: Arc<dyn TextGenerator>,
    gate: QualityGate,
    lengths: LengthController,
    params: GenerationParams,
    timeout: Duration,
    settings: ComposerSettings,
    placeholder_allowance: usize,
    intake: IntakeProfile,
    cache: Option<Arc<DraftCache>>,
    records: Option<RunRecordStore>,
}

impl ReportComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &CounselConfig) -> Self {
        Self {
            generator,
            gate: QualityGate::new(&config.quality),
            lengths: LengthController::new(config.layout.clone()),
            params: GenerationParams::from(&config.generation),
            timeout: Duration::from_secs(config.generation.timeout_secs),
            settings: config.composer.clone(),
            placeholder_allowance: config.quality.placeholder_allowance,
            intake: IntakeProfile::default(),
            cache: None,
            records: None,
        }
    }

    pub fn with_intake(mut self, intake: IntakeProfile) -> Self {
        self.intake = intake;
        self
    }

    /// Reuse drafts across runs with identical inputs
    pub fn with_cache(mut self, cache: Arc<DraftCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Persist one summary record per finished run
    pub fn with_record_store(mut self, records: RunRecordStore) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn lengths(&self) -> &LengthController {
        &self.lengths
    }

    /// Section budgets this composer would use for a page target
    pub fn plan(&self, target_pages: f64) -> Result<Vec<SectionSpec>> {
        self.lengths.allocate(
            target_pages,
            &SectionKind::names(),
            self.settings.section_weights.as_ref(),
        )
    }

    /// Compose a full report.
    ///
    /// Precondition errors from ranking or allocation surface before any
    /// generation call. Cancellation abandons in-flight calls and returns
    /// [`CounselError::Cancelled`]; no partial document is ever returned.
    pub async fn compose(
        &self,
        transcript: &[Message],
        schools: &[SchoolCandidate],
        target_pages: f64,
        cancel: &CancellationToken,
    ) -> Result<ReportDocument> {
        let ranked = rank(schools)?;
        let specs = self.plan(target_pages)?;
        if cancel.is_cancelled() {
            return Err(CounselError::Cancelled);
        }

        info!(
            "Composing report: {} schools, {} sections, {:.1} pages",
            ranked.len(),
            specs.len(),
            target_pages
        );

        let budget = PlaceholderBudget::new(self.placeholder_allowance);
        let work = self.compose_sections(transcript, ranked, &specs, &budget);

        let (mut sections, matches, fallbacks) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Report composition cancelled");
                return Err(CounselError::Cancelled);
            }
            result = work => result?,
        };

        let polish = polish::polish(&mut sections);
        let mut document = ReportDocument::assemble(sections, matches, target_pages, &self.lengths);
        document.metadata.polish = polish;
        info!(
            "Report {} composed: {} chars, {:.1} pages, {} verification notes, {} degraded sections",
            document.metadata.run_id,
            document.metadata.char_count,
            document.metadata.page_estimate,
            document.metadata.verification_notes,
            document.degraded_sections().count()
        );

        if let Some(records) = &self.records {
            if let Err(e) = records.append(document.summary(fallbacks)).await {
                warn!("Failed to store run summary: {}", e);
            }
        }

        Ok(document)
    }

    async fn compose_sections(
        &self,
        transcript: &[Message],
        ranked: Vec<MatchResult>,
        specs: &[SectionSpec],
        budget: &PlaceholderBudget,
    ) -> Result<(Vec<SectionDraft>, Vec<MatchResult>, usize)> {
        let concurrency = self.settings.max_concurrent_sections.max(1);

        let written: Vec<(MatchResult, bool)> =
            stream::iter(ranked.iter().map(|r| self.write_rationale(r)))
                .buffered(concurrency)
                .collect()
                .await;
        let fallbacks = written.iter().filter(|(_, fell_back)| *fell_back).count();
        let matches: Vec<MatchResult> = written.into_iter().map(|(result, _)| result).collect();

        let context = PromptContext {
            transcript,
            matches: &matches,
            intake: &self.intake,
        };
        let sections: Vec<SectionDraft> = stream::iter(
            specs
                .iter()
                .map(|spec| self.compose_section(spec, &context, budget)),
        )
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

        Ok((sections, matches, fallbacks))
    }

    /// Generate one section under the attempt state machine
    async fn compose_section(
        &self,
        spec: &SectionSpec,
        context: &PromptContext<'_>,
        budget: &PlaceholderBudget,
    ) -> Result<SectionDraft> {
        let kind = SectionKind::from_order(spec.order).ok_or_else(|| {
            CounselError::InvalidState(format!("no section at position {}", spec.order))
        })?;
        let base = section_prompt(kind, spec, context);
        let key = cache::cache_key(&base, Some(spec));

        if let Some(draft) = self.cache.as_ref().and_then(|c| c.section(&key)) {
            info!("Section '{}' reused from cache", spec.name);
            return Ok(settle_notes(draft, budget));
        }

        let mut attempt = SectionAttempt::new(spec.clone());
        let mut prompt = base.clone();
        loop {
            let number = attempt.calls() + 1;
            debug!("Section '{}' attempt {}", spec.name, number);
            let outcome = generate_with_timeout(
                self.generator.as_ref(),
                &prompt,
                &self.params,
                self.timeout,
            )
            .await
            .map(|raw| Candidate::evaluate(number, &raw, &self.gate, spec));

            match attempt.observe(outcome, budget) {
                Step::Retry(corrections) => prompt = with_corrections(&base, &corrections),
                Step::Done => break,
            }
        }

        let draft = attempt
            .finish(budget)
            .map_err(|source| CounselError::SectionFailed {
                section: spec.name.clone(),
                source,
            })?;

        if let Some(cache) = &self.cache {
            cache.store_section(key, draft.clone());
        }
        Ok(draft)
    }

    /// Generated rationale for one school, or the deterministic template.
    /// The flag is true when the template was used.
    async fn write_rationale(&self, result: &MatchResult) -> (MatchResult, bool) {
        let prompt = rationale_prompt(result);
        let key = cache::cache_key(&prompt, None);
        if let Some(text) = self.cache.as_ref().and_then(|c| c.rationale(&key)) {
            return (result.with_rationale(text), false);
        }

        for attempt in 1..=RATIONALE_CALLS {
            match self.try_rationale(&prompt).await {
                Ok(text) => {
                    if let Some(cache) = &self.cache {
                        cache.store_rationale(key, text.clone());
                    }
                    return (result.with_rationale(text), false);
                }
                Err(e) => warn!(
                    "Rationale for {} failed on attempt {}: {}",
                    result.school.name, attempt, e
                ),
            }
        }

        info!("Using template rationale for {}", result.school.name);
        (result.clone(), true)
    }

    async fn try_rationale(&self, prompt: &str) -> Result<String> {
        let raw =
            generate_with_timeout(self.generator.as_ref(), prompt, &self.params, self.timeout)
                .await?;
        let report = self.gate.validate(&raw);
        report.ensure_passed()?;

        // Rationales sit outside the sections, so they carry no verification notes
        let (text, _) = strip_verification_markers(&report.clean_text, 0);
        Ok(text)
    }
}
