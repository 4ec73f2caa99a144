//! Conversation Orchestrator
//!
//! Drives the simulated advisory conversation: fixed turn order, gap tracking,
//! stopping rules and generator failure handling. The resulting transcript is
//! the input to report composition.

pub mod gaps;
pub mod orchestrator;
pub mod roles;
pub mod summary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use gaps::InformationGap;
pub use orchestrator::ConversationOrchestrator;
pub use roles::{Role, RoleBehavior};

/// One utterance in the transcript. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, round: u32) -> Self {
        Self {
            role,
            content: content.into(),
            round,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    InProgress,
    /// A question went unanswered; an operator has to supply the answer
    AwaitingUser,
    Completed,
    Aborted,
}

impl ConversationStatus {
    /// Completed and aborted conversations never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationStatus::Completed | ConversationStatus::Aborted)
    }
}

/// Intake details that seed every prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeProfile {
    pub student_name: String,
    pub family_intro: String,
    pub student_profile: String,
    pub target_schools: Vec<String>,
    pub notes: Option<String>,
}

impl IntakeProfile {
    /// Prompt block describing the family
    pub fn to_prompt(&self) -> String {
        let mut block = String::new();
        if !self.student_name.is_empty() {
            block.push_str(&format!("Student: {}\n", self.student_name));
        }
        if !self.family_intro.is_empty() {
            block.push_str(&format!("Family: {}\n", self.family_intro));
        }
        if !self.student_profile.is_empty() {
            block.push_str(&format!("Profile: {}\n", self.student_profile));
        }
        if !self.target_schools.is_empty() {
            block.push_str(&format!(
                "Target schools: {}\n",
                self.target_schools.join(", ")
            ));
        }
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.is_empty()) {
            block.push_str(&format!("Notes: {}\n", notes));
        }
        block
    }
}

/// A turn that failed twice and was replaced by a system note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub role: Role,
    pub round: u32,
    pub attempts: u32,
    pub error: String,
}

/// Everything the orchestrator knows about a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub(crate) transcript: Vec<Message>,
    /// Rounds completed so far
    pub(crate) round: u32,
    pub(crate) open_questions: Vec<InformationGap>,
    pub(crate) status: ConversationStatus,
    pub(crate) next_role: Role,
    pub(crate) resolved_streak: u32,
    pub(crate) failures: Vec<TurnFailure>,
    pub(crate) abort_reason: Option<String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            transcript: Vec::new(),
            round: 0,
            open_questions: Vec::new(),
            status: ConversationStatus::InProgress,
            next_role: Role::AdmissionsOfficer,
            resolved_streak: 0,
            failures: Vec::new(),
            abort_reason: None,
        }
    }
}

impl ConversationState {
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Every gap raised so far, resolved or not
    pub fn open_questions(&self) -> &[InformationGap] {
        &self.open_questions
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &InformationGap> {
        self.open_questions.iter().filter(|g| !g.resolved)
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Role that speaks next while the conversation is in progress
    pub fn next_role(&self) -> Role {
        self.next_role
    }

    /// Turns replaced by a system note after two failed attempts
    pub fn failures(&self) -> &[TurnFailure] {
        &self.failures
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Messages written by any of `roles`, in transcript order
    pub fn messages_from<'a>(&'a self, roles: &'a [Role]) -> impl Iterator<Item = &'a Message> {
        self.transcript.iter().filter(move |m| roles.contains(&m.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ConversationStatus::Completed.is_terminal());
        assert!(ConversationStatus::Aborted.is_terminal());
        assert!(!ConversationStatus::AwaitingUser.is_terminal());
        assert!(!ConversationStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_intake_prompt_skips_empty_fields() {
        let intake = IntakeProfile {
            student_name: "Liam Chen".to_string(),
            target_schools: vec!["Upper Canada College".to_string(), "Crescent School".to_string()],
            ..Default::default()
        };
        let block = intake.to_prompt();
        assert!(block.contains("Student: Liam Chen"));
        assert!(block.contains("Upper Canada College, Crescent School"));
        assert!(!block.contains("Family:"));
        assert!(!block.contains("Notes:"));
    }

    #[test]
    fn test_messages_from() {
        let state = ConversationState {
            transcript: vec![
                Message::new(Role::AdmissionsOfficer, "What does Liam enjoy?", 0),
                Message::new(Role::Parent, "He enjoys chess.", 0),
                Message::new(Role::Student, "I like robotics.", 0),
            ],
            ..Default::default()
        };
        let family: Vec<Role> = state
            .messages_from(&[Role::Parent, Role::Student])
            .map(|m| m.role)
            .collect();
        assert_eq!(family, vec![Role::Parent, Role::Student]);
    }
}
