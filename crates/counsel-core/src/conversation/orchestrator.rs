//! Turn sequencing and stopping rules

use super::gaps::{extract_questions, resolve_gaps, InformationGap};
use super::roles::Role;
use super::summary::compact_summary;
use super::{ConversationState, ConversationStatus, IntakeProfile, Message, TurnFailure};
use crate::config::{ConversationSettings, CounselConfig};
use crate::error::{CounselError, GenerationError, Result};
use crate::generation::{generate_with_timeout, GenerationParams, TextGenerator};
use crate::journal::TranscriptJournal;
use crate::length::LengthController;
use crate::quality::QualityGate;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Calls per turn: the first attempt plus one retry with the same prompt
const TURN_ATTEMPTS: u32 = 2;

/// Rounds an admissions question may stay unanswered before the operator is asked
const STALE_GAP_ROUNDS: u32 = 2;

/// Consecutive fully resolved rounds that end the conversation
const RESOLVED_ROUNDS_TO_COMPLETE: u32 = 2;

/// Drives one conversation from the first question to a terminal status
#[derive(Debug)]
pub struct ConversationOrchestrator {
    generator: Arc<dyn TextGenerator>,
    gate: QualityGate,
    lengths: LengthController,
    settings: ConversationSettings,
    params: GenerationParams,
    timeout: Duration,
    intake: IntakeProfile,
    journal: Option<TranscriptJournal>,
    state: ConversationState,
}

impl ConversationOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        intake: IntakeProfile,
        config: &CounselConfig,
    ) -> Self {
        Self {
            generator,
            gate: QualityGate::new(&config.quality),
            lengths: LengthController::new(config.layout.clone()),
            settings: config.conversation.clone(),
            params: GenerationParams::from(&config.generation),
            timeout: Duration::from_secs(config.generation.timeout_secs),
            intake,
            journal: None,
            state: ConversationState::default(),
        }
    }

    /// Log every appended message to a transcript journal
    pub fn with_journal(mut self, journal: TranscriptJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn into_state(self) -> ConversationState {
        self.state
    }

    pub fn intake(&self) -> &IntakeProfile {
        &self.intake
    }

    /// Run turns until the conversation leaves `in_progress`.
    ///
    /// Cancelling the token aborts the conversation and returns
    /// [`CounselError::Cancelled`].
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<ConversationStatus> {
        while self.state.status == ConversationStatus::InProgress {
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                result = self.advance() => {
                    result?;
                    false
                }
            };
            if cancelled {
                self.abort("cancelled");
                return Err(CounselError::Cancelled);
            }
        }
        Ok(self.state.status)
    }

    /// Take the next turn and return the message it appended
    pub async fn advance(&mut self) -> Result<Message> {
        if self.state.status != ConversationStatus::InProgress {
            return Err(CounselError::InvalidState(format!(
                "cannot take a turn while {:?}",
                self.state.status
            )));
        }

        let role = self.state.next_role;
        let round = self.state.round;
        let prompt = self.build_prompt(role)?;
        debug!("Round {} turn: {}", round, role);

        match self.attempt_turn(&prompt).await {
            Ok(content) => {
                let message = Message::new(role, content, round);
                self.append(message.clone()).await?;
                self.after_turn(&message);
                Ok(message)
            }
            Err(error) => {
                warn!(
                    "{} turn in round {} failed after {} attempts: {}",
                    role, round, TURN_ATTEMPTS, error
                );
                self.state.failures.push(TurnFailure {
                    role,
                    round,
                    attempts: TURN_ATTEMPTS,
                    error: error.to_string(),
                });
                let note = Message::new(
                    Role::System,
                    format!(
                        "The {} turn in round {} was skipped after {} failed attempts ({}).",
                        role.display_name(),
                        round + 1,
                        TURN_ATTEMPTS,
                        error
                    ),
                    round,
                );
                self.append(note.clone()).await?;
                self.close_round();
                Ok(note)
            }
        }
    }

    /// Supply a family answer from outside the conversation.
    ///
    /// Resolves any open gap the answer addresses, whatever its age, and
    /// resumes a conversation that was waiting on the operator.
    pub async fn provide_answer(&mut self, role: Role, text: &str) -> Result<Message> {
        if self.state.status.is_terminal() {
            return Err(CounselError::InvalidState(format!(
                "conversation is {:?}",
                self.state.status
            )));
        }
        if !role.behavior().answers_gaps {
            return Err(CounselError::InvalidState(format!(
                "{} cannot answer family questions",
                role
            )));
        }

        let report = self.gate.validate(text);
        if report.clean_text.trim().is_empty() {
            return Err(CounselError::InvalidState("answer is empty".to_string()));
        }

        let message = Message::new(role, report.clean_text, self.state.round);
        self.append(message.clone()).await?;
        let resolved = resolve_gaps(&mut self.state.open_questions, &message, false);
        info!("Operator answer from {} resolved {} gap(s)", role, resolved);

        self.set_status(ConversationStatus::InProgress);
        Ok(message)
    }

    /// Stop the conversation for good
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.state.status.is_terminal() {
            return;
        }
        let reason = reason.into();
        warn!("Conversation aborted: {}", reason);
        self.state.abort_reason = Some(reason);
        self.set_status(ConversationStatus::Aborted);
    }

    /// Prompt for a role's next turn
    pub fn build_prompt(&self, role: Role) -> Result<String> {
        let behavior = role.behavior();
        let summary = compact_summary(&self.state.transcript, role, &self.settings, &self.lengths)?;

        let mut prompt = format!("{}\n\nFamily intake:\n{}", behavior.persona, self.intake.to_prompt());
        prompt.push_str(&format!("\nConversation so far:\n{}\n", summary));

        let open: Vec<&InformationGap> = self.state.unresolved().collect();
        let recent = &open[open.len().saturating_sub(2)..];
        if !recent.is_empty() {
            prompt.push_str("\nOpen questions:\n");
            for gap in recent {
                prompt.push_str(&format!("{}\n", gap.topic));
            }
        }

        let instruction = match role {
            Role::AdmissionsOfficer => format!(
                "Ask at most {} question(s), each ending with a question mark.",
                self.settings.questions_per_turn
            ),
            Role::Parent | Role::Student => "Answer the open questions directly. If the intake \
                does not say, state plainly that you are not sure instead of inventing details."
                .to_string(),
            Role::Advisor => "Give a short plan update based on the answers so far. Ask a \
                follow-up question only if something essential is missing."
                .to_string(),
            Role::Writer | Role::System => String::new(),
        };
        prompt.push_str(&format!(
            "\n{}\nReply in plain prose without Markdown, lists or emoji.",
            instruction
        ));
        Ok(prompt)
    }

    async fn attempt_turn(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let mut last_error = GenerationError::Malformed("no attempt made".to_string());
        for attempt in 1..=TURN_ATTEMPTS {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    debug!("Turn attempt {} failed: {}", attempt, error);
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    async fn generate_once(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let raw = generate_with_timeout(self.generator.as_ref(), prompt, &self.params, self.timeout).await?;
        let report = self.gate.validate(&raw);
        if !report.placeholders.is_empty() {
            debug!("Utterance carries placeholders: {:?}", report.placeholders);
        }
        if report.clean_text.trim().is_empty() {
            return Err(GenerationError::Malformed(
                "utterance empty after cleaning".to_string(),
            ));
        }
        Ok(report.clean_text)
    }

    async fn append(&mut self, message: Message) -> Result<()> {
        if self.state.status.is_terminal() {
            return Err(CounselError::InvalidState(
                "transcript is closed".to_string(),
            ));
        }
        if let Some(journal) = &self.journal {
            journal.append(&message).await?;
        }
        self.state.transcript.push(message);
        Ok(())
    }

    fn after_turn(&mut self, message: &Message) {
        match message.role {
            Role::AdmissionsOfficer | Role::Advisor => {
                let questions = extract_questions(&message.content, self.settings.questions_per_turn);
                // The advisor's plan update only opens gaps for real questions
                let questions = if message.role == Role::Advisor {
                    questions
                        .into_iter()
                        .filter(|q| q.ends_with(['?', '？']))
                        .collect()
                } else {
                    questions
                };
                for question in questions {
                    debug!("Gap raised by {}: {}", message.role, question);
                    self.state
                        .open_questions
                        .push(InformationGap::new(question, message.role, message.round));
                }
            }
            Role::Parent | Role::Student => {
                let resolved = resolve_gaps(&mut self.state.open_questions, message, true);
                if resolved > 0 {
                    debug!("{} resolved {} gap(s)", message.role, resolved);
                }
            }
            Role::Writer | Role::System => {}
        }

        match message.role.next_in_round() {
            Some(next) => self.state.next_role = next,
            None => self.close_round(),
        }
    }

    fn close_round(&mut self) {
        self.state.round += 1;
        self.state.next_role = Role::AdmissionsOfficer;
        let completed_rounds = self.state.round;

        let gaps = &self.state.open_questions;
        if !gaps.is_empty() && gaps.iter().all(|g| g.resolved) {
            self.state.resolved_streak += 1;
        } else {
            self.state.resolved_streak = 0;
        }

        let stale = gaps.iter().any(|g| {
            g.raised_by == Role::AdmissionsOfficer
                && !g.resolved
                && g.age(completed_rounds) >= STALE_GAP_ROUNDS
        });

        if completed_rounds >= self.settings.max_rounds {
            info!("Round limit {} reached", self.settings.max_rounds);
            self.set_status(ConversationStatus::Completed);
        } else if self.state.resolved_streak >= RESOLVED_ROUNDS_TO_COMPLETE {
            info!("All questions answered for {} rounds", self.state.resolved_streak);
            self.set_status(ConversationStatus::Completed);
        } else if stale {
            info!("Admissions question unanswered for {} rounds", STALE_GAP_ROUNDS);
            self.set_status(ConversationStatus::AwaitingUser);
        }
    }

    fn set_status(&mut self, status: ConversationStatus) {
        if self.state.status.is_terminal() || self.state.status == status {
            return;
        }
        info!("Conversation status {:?} -> {:?}", self.state.status, status);
        self.state.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::ScriptedGenerator;

    fn orchestrator(generator: ScriptedGenerator, max_rounds: u32) -> ConversationOrchestrator {
        let config = CounselConfig::new().with_max_rounds(max_rounds);
        let intake = IntakeProfile {
            student_name: "Liam Chen".to_string(),
            ..Default::default()
        };
        ConversationOrchestrator::new(Arc::new(generator), intake, &config)
    }

    #[tokio::test]
    async fn test_turn_order() {
        let generator = ScriptedGenerator::new("Robotics matters a great deal to our plans.")
            .then_ok("What does Liam enjoy about robotics?");
        let mut orchestrator = orchestrator(generator, 3);

        let mut roles = Vec::new();
        for _ in 0..4 {
            roles.push(orchestrator.advance().await.unwrap().role);
        }
        assert_eq!(roles, Role::TURN_ORDER.to_vec());
        assert_eq!(orchestrator.state().round(), 1);
        assert_eq!(orchestrator.state().next_role(), Role::AdmissionsOfficer);
    }

    #[tokio::test]
    async fn test_turn_prompts_carry_persona_and_open_questions() {
        let generator = Arc::new(
            ScriptedGenerator::new("Robotics matters a great deal to our plans.")
                .then_ok("What does Liam enjoy about robotics?"),
        );
        let intake = IntakeProfile {
            student_name: "Liam Chen".to_string(),
            ..Default::default()
        };
        let mut orchestrator =
            ConversationOrchestrator::new(generator.clone(), intake, &CounselConfig::default());

        orchestrator.advance().await.unwrap();
        orchestrator.advance().await.unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with(Role::AdmissionsOfficer.behavior().persona));
        assert!(prompts[0].contains("Family intake:\nStudent: Liam Chen"));
        assert!(prompts[0].contains("question mark"));
        assert!(!prompts[0].contains("Open questions:"));

        assert!(prompts[1].starts_with(Role::Parent.behavior().persona));
        assert!(prompts[1].contains("Open questions:"));
        assert!(prompts[1].contains("robotics?"));
    }

    #[tokio::test]
    async fn test_rounds_exhausted_beats_open_gaps() {
        // Nobody ever addresses the officer's question
        let generator = ScriptedGenerator::new("Nothing further to add today.")
            .then_ok("How many siblings does Liam have? Which languages are spoken at home?");
        let mut orchestrator = orchestrator(generator, 2);

        let status = orchestrator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(status, ConversationStatus::Completed);
        assert_eq!(orchestrator.state().round(), 2);
        assert!(orchestrator.state().unresolved().count() >= 2);
    }

    #[tokio::test]
    async fn test_stale_question_waits_for_user() {
        let generator = ScriptedGenerator::new("Nothing further to add today.")
            .then_ok("How many siblings does Liam have?");
        let mut orchestrator = orchestrator(generator, 10);

        let status = orchestrator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(status, ConversationStatus::AwaitingUser);
        assert_eq!(orchestrator.state().round(), 2);

        let before = orchestrator.state().transcript().len();
        orchestrator
            .provide_answer(Role::Parent, "Liam has two siblings.")
            .await
            .unwrap();
        assert_eq!(orchestrator.state().status(), ConversationStatus::InProgress);
        assert_eq!(orchestrator.state().transcript().len(), before + 1);
        assert!(orchestrator
            .state()
            .open_questions()
            .iter()
            .find(|g| g.topic.contains("siblings"))
            .map(|g| g.resolved)
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_answered_rounds_complete() {
        let generator = ScriptedGenerator::new("Robotics remains central to the plan.")
            .then_ok("What draws Liam to robotics?")
            .then_ok("Robotics gives him a sense of purpose.")
            .then_ok("I love robotics competitions.")
            .then_ok("We will build the plan around robotics.")
            .then_ok("How has robotics shaped his goals?");
        let mut orchestrator = orchestrator(generator, 10);

        let status = orchestrator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(status, ConversationStatus::Completed);
        assert_eq!(orchestrator.state().round(), 2);
    }

    #[tokio::test]
    async fn test_double_failure_inserts_system_note() {
        let generator = ScriptedGenerator::new("Robotics is his passion.")
            .then_err(GenerationError::Timeout(60_000))
            .then_err(GenerationError::Provider("HTTP 503".to_string()));
        let mut orchestrator = orchestrator(generator, 3);

        let note = orchestrator.advance().await.unwrap();
        assert_eq!(note.role, Role::System);
        assert_eq!(orchestrator.state().failures().len(), 1);
        assert_eq!(orchestrator.state().failures()[0].role, Role::AdmissionsOfficer);
        assert_eq!(orchestrator.state().round(), 1);
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let generator = ScriptedGenerator::new("Robotics is his passion.")
            .then_err(GenerationError::Timeout(60_000))
            .then_ok("What does Liam enjoy?");
        let mut orchestrator = orchestrator(generator, 3);

        let message = orchestrator.advance().await.unwrap();
        assert_eq!(message.role, Role::AdmissionsOfficer);
        assert!(orchestrator.state().failures().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_rejects_turns() {
        let mut orchestrator = orchestrator(ScriptedGenerator::new("Fine."), 3);
        orchestrator.abort("family withdrew");
        assert_eq!(orchestrator.state().status(), ConversationStatus::Aborted);

        assert!(orchestrator.advance().await.is_err());
        assert!(orchestrator
            .provide_answer(Role::Parent, "We are back.")
            .await
            .is_err());
        assert!(orchestrator.state().transcript().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_aborts() {
        let mut orchestrator = orchestrator(ScriptedGenerator::new("Fine."), 3);
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator.run(&token).await;
        assert!(matches!(result, Err(CounselError::Cancelled)));
        assert_eq!(orchestrator.state().status(), ConversationStatus::Aborted);
    }

    #[test]
    fn test_prompt_carries_intake_and_instruction() {
        let orchestrator = orchestrator(ScriptedGenerator::new("Fine."), 3);
        let prompt = orchestrator.build_prompt(Role::AdmissionsOfficer).unwrap();
        assert!(prompt.contains("Student: Liam Chen"));
        assert!(prompt.contains("Ask at most 2 question(s)"));
        assert!(prompt.contains("No conversation yet."));
    }
}
