//! Compact transcript summaries for turn prompts
//!
//! Each turn sees only recent messages from roles it is allowed to see, and
//! each speaker's excerpt is capped by a small page budget split the same way
//! report sections are.

use super::roles::Role;
use super::Message;
use crate::config::ConversationSettings;
use crate::error::Result;
use crate::length::{content_chars, LengthController};

/// Text used when nothing visible has been said yet
pub const EMPTY_SUMMARY: &str = "No conversation yet.";

/// Summarise the transcript as seen by `viewer`
pub fn compact_summary(
    transcript: &[Message],
    viewer: Role,
    settings: &ConversationSettings,
    lengths: &LengthController,
) -> Result<String> {
    let visible: Vec<&Message> = transcript
        .iter()
        .filter(|m| viewer.can_see(m.role))
        .collect();
    let skip = visible.len().saturating_sub(settings.max_summary_messages);
    let recent = &visible[skip..];
    if recent.is_empty() {
        return Ok(EMPTY_SUMMARY.to_string());
    }

    let mut speakers: Vec<Role> = Vec::new();
    for message in recent {
        if !speakers.contains(&message.role) {
            speakers.push(message.role);
        }
    }
    speakers.sort();

    let names: Vec<&str> = speakers.iter().map(|r| r.display_name()).collect();
    let budgets = lengths.allocate(settings.summary_pages, &names, None)?;

    let mut lines = Vec::with_capacity(speakers.len());
    for (role, budget) in speakers.iter().zip(budgets) {
        let said: Vec<&str> = recent
            .iter()
            .filter(|m| m.role == *role)
            .map(|m| m.content.as_str())
            .collect();
        let excerpt = truncate_content(&said.join(" "), budget.max_chars);
        lines.push(format!("{}: {}", role.display_name(), excerpt));
    }
    Ok(lines.join("\n"))
}

/// Keep at most `max_chars` non-whitespace characters, marking the cut
pub(crate) fn truncate_content(text: &str, max_chars: usize) -> String {
    if content_chars(text) <= max_chars {
        return text.to_string();
    }

    let mut kept = 0;
    let mut end = 0;
    for (index, c) in text.char_indices() {
        if !c.is_whitespace() {
            if kept == max_chars {
                break;
            }
            kept += 1;
        }
        end = index + c.len_utf8();
    }
    format!("{}…", text[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_messages: usize) -> ConversationSettings {
        ConversationSettings {
            max_summary_messages: max_messages,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_transcript() {
        let summary = compact_summary(&[], Role::Parent, &settings(8), &LengthController::default()).unwrap();
        assert_eq!(summary, EMPTY_SUMMARY);
    }

    #[test]
    fn test_visibility_is_respected() {
        let transcript = vec![
            Message::new(Role::AdmissionsOfficer, "What does Liam enjoy?", 0),
            Message::new(Role::Parent, "He enjoys chess.", 0),
            Message::new(Role::Student, "I like robotics.", 0),
        ];
        let summary =
            compact_summary(&transcript, Role::Parent, &settings(8), &LengthController::default()).unwrap();
        assert!(summary.contains("Admissions Officer: What does Liam enjoy?"));
        assert!(summary.contains("Parent: He enjoys chess."));
        assert!(!summary.contains("robotics"));
    }

    #[test]
    fn test_only_recent_messages() {
        let transcript: Vec<Message> = (0..12)
            .map(|i| Message::new(Role::Advisor, format!("Note {}.", i), i))
            .collect();
        let summary =
            compact_summary(&transcript, Role::Advisor, &settings(3), &LengthController::default()).unwrap();
        assert!(!summary.contains("Note 8."));
        assert!(summary.contains("Note 9. Note 10. Note 11."));
    }

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("abc def ghi", 5), "abc de…");
    }
}
