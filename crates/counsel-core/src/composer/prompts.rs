//! Section prompts
//!
//! Each section sees only the transcript excerpts and match rows it needs.

use super::attempt::Correction;
use crate::conversation::summary::truncate_content;
use crate::conversation::{IntakeProfile, Message, Role};
use crate::length::{SectionSpec, DEFAULT_SECTION_PROPORTIONS};
use crate::scoring::MatchResult;

/// Cap on the transcript excerpt embedded in one section prompt
pub const MAX_EXCERPT_CHARS: usize = 6_000;

/// The six chapters of a counselling report, in table-of-contents order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Background,
    Positioning,
    Matching,
    AcademicPreparation,
    ProcessStrategy,
    PostAdmission,
}

impl SectionKind {
    pub const ALL: [SectionKind; 6] = [
        SectionKind::Background,
        SectionKind::Positioning,
        SectionKind::Matching,
        SectionKind::AcademicPreparation,
        SectionKind::ProcessStrategy,
        SectionKind::PostAdmission,
    ];

    /// Heading, matching the default proportion table
    pub fn title(&self) -> &'static str {
        DEFAULT_SECTION_PROPORTIONS[self.index()].0
    }

    pub fn index(&self) -> usize {
        match self {
            SectionKind::Background => 0,
            SectionKind::Positioning => 1,
            SectionKind::Matching => 2,
            SectionKind::AcademicPreparation => 3,
            SectionKind::ProcessStrategy => 4,
            SectionKind::PostAdmission => 5,
        }
    }

    pub fn from_order(order: usize) -> Option<Self> {
        Self::ALL.get(order).copied()
    }

    /// Section names in table-of-contents order
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.title()).collect()
    }

    /// Roles whose messages are quoted into this section's prompt
    pub fn source_roles(&self) -> &'static [Role] {
        match self {
            SectionKind::Background => &[Role::Parent, Role::Student],
            SectionKind::Positioning => &[Role::Parent, Role::Advisor],
            SectionKind::Matching => &[
                Role::AdmissionsOfficer,
                Role::Parent,
                Role::Student,
                Role::Advisor,
            ],
            SectionKind::AcademicPreparation => &[Role::Student, Role::Advisor],
            SectionKind::ProcessStrategy => &[Role::AdmissionsOfficer, Role::Advisor],
            SectionKind::PostAdmission => &[Role::Advisor],
        }
    }

    fn brief(&self) -> &'static str {
        match self {
            SectionKind::Background => {
                "Describe the family's values and the student's character, interests and strengths."
            }
            SectionKind::Positioning => {
                "Explain what kind of school suits this family and how the shortlisted schools are positioned."
            }
            SectionKind::Matching => {
                "Analyse how well each shortlisted school matches the student, school by school, using the match figures given."
            }
            SectionKind::AcademicPreparation => {
                "Set out the academic and extracurricular preparation the student needs before applying."
            }
            SectionKind::ProcessStrategy => {
                "Lay out the application timeline, interview preparation and overall strategy."
            }
            SectionKind::PostAdmission => {
                "Give brief guidance for the transition after an offer is accepted."
            }
        }
    }
}

/// Inputs shared by every section prompt of one report
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub transcript: &'a [Message],
    pub matches: &'a [MatchResult],
    pub intake: &'a IntakeProfile,
}

impl<'a> PromptContext<'a> {
    /// Messages from `roles`, oldest first, as "Role: text" lines
    fn excerpt(&self, roles: &[Role]) -> String {
        let lines: Vec<String> = self
            .transcript
            .iter()
            .filter(|m| roles.contains(&m.role))
            .map(|m| format!("{}: {}", m.role.display_name(), m.content))
            .collect();
        truncate_content(&lines.join("\n"), MAX_EXCERPT_CHARS)
    }

    fn school_lines(&self, kind: SectionKind) -> String {
        let rows: Vec<&MatchResult> = match kind {
            SectionKind::Background | SectionKind::AcademicPreparation => Vec::new(),
            SectionKind::PostAdmission => self.matches.iter().take(1).collect(),
            SectionKind::ProcessStrategy => self.matches.iter().take(3).collect(),
            SectionKind::Positioning | SectionKind::Matching => self.matches.iter().collect(),
        };

        let mut block = String::new();
        for result in rows {
            let facts = &result.school.facts;
            match kind {
                SectionKind::Matching => {
                    block.push_str(&format!(
                        "{}. {} ({}): match {:.1}%. {}\n",
                        result.rank,
                        result.school.name,
                        facts.school_type,
                        result.match_percentage,
                        result.rationale
                    ));
                    if let Some(size) = facts.class_size {
                        block.push_str(&format!("   Class size: {}\n", size));
                    }
                    if let Some(ratio) = &facts.student_teacher_ratio {
                        block.push_str(&format!("   Student-teacher ratio: {}\n", ratio));
                    }
                    if let Some(tuition) = facts.tuition {
                        block.push_str(&format!("   Annual tuition: {}\n", tuition));
                    }
                    if !facts.signature_programs.is_empty() {
                        block.push_str(&format!(
                            "   Signature programs: {}\n",
                            facts.signature_programs.join(", ")
                        ));
                    }
                }
                _ => {
                    let location = if facts.location.is_empty() {
                        String::new()
                    } else {
                        format!(", {}", facts.location)
                    };
                    block.push_str(&format!(
                        "{}. {} ({}{})\n",
                        result.rank, result.school.name, facts.school_type, location
                    ));
                }
            }
        }
        block
    }
}

/// First-attempt prompt for one section
pub fn section_prompt(kind: SectionKind, spec: &SectionSpec, context: &PromptContext<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(Role::Writer.behavior().persona);
    prompt.push_str("\n\n");
    prompt.push_str(&format!("Write the report section \"{}\".\n", spec.name));
    prompt.push_str(kind.brief());
    prompt.push_str("\n\nFamily intake:\n");
    prompt.push_str(&context.intake.to_prompt());

    let schools = context.school_lines(kind);
    if !schools.is_empty() {
        prompt.push_str("\nSchools:\n");
        prompt.push_str(&schools);
    }

    let excerpt = context.excerpt(kind.source_roles());
    if !excerpt.is_empty() {
        prompt.push_str("\nFrom the conversation:\n");
        prompt.push_str(&excerpt);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nLength: between {} and {} characters, aiming for about {}.\n",
        spec.min_chars, spec.max_chars, spec.target_chars
    ));
    prompt.push_str(
        "Write flowing paragraphs of plain prose. No headings, lists, tables, Markdown or emoji. \
         Never leave template placeholders. If a fact cannot be confirmed from the conversation, \
         state it once with \"Parent to verify:\" and use that marker sparingly.",
    );
    prompt
}

/// Retry prompt: the original plus the corrective instructions
pub fn with_corrections(base: &str, corrections: &[Correction]) -> String {
    let instructions: Vec<String> = corrections.iter().filter_map(|c| c.instruction()).collect();
    if instructions.is_empty() {
        return base.to_string();
    }

    let mut prompt = String::with_capacity(base.len() + 256);
    prompt.push_str(base);
    prompt.push_str("\n\nCorrections to the previous draft:\n");
    for instruction in instructions {
        prompt.push_str("- ");
        prompt.push_str(&instruction);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{rank, SchoolCandidate, SchoolFacts};

    fn spec(kind: SectionKind) -> SectionSpec {
        SectionSpec {
            name: kind.title().to_string(),
            min_chars: 850,
            max_chars: 1150,
            target_chars: 1000,
            order: kind.index(),
        }
    }

    fn fixture() -> (Vec<Message>, Vec<MatchResult>, IntakeProfile) {
        let transcript = vec![
            Message::new(Role::AdmissionsOfficer, "What does Liam enjoy outside class?", 0),
            Message::new(Role::Parent, "We value independence and reading.", 0),
            Message::new(Role::Student, "I build robots on weekends.", 0),
            Message::new(Role::Advisor, "Prioritise schools with strong STEM clubs.", 0),
        ];
        let schools = vec![
            SchoolCandidate::new("Upper Canada College")
                .with_scores([5, 4, 5, 4])
                .with_facts(SchoolFacts {
                    school_type: "boarding".to_string(),
                    class_size: Some(16),
                    signature_programs: vec!["Robotics".to_string()],
                    ..SchoolFacts::default()
                }),
            SchoolCandidate::new("Branksome Hall").with_scores([4, 4, 3, 3]),
        ];
        let intake = IntakeProfile {
            student_name: "Liam".to_string(),
            ..IntakeProfile::default()
        };
        (transcript, rank(&schools).unwrap(), intake)
    }

    #[test]
    fn test_titles_follow_proportion_table() {
        assert_eq!(SectionKind::names().len(), DEFAULT_SECTION_PROPORTIONS.len());
        assert_eq!(SectionKind::Matching.title(), "Student-School Matching");
        assert_eq!(SectionKind::from_order(5), Some(SectionKind::PostAdmission));
        assert_eq!(SectionKind::from_order(6), None);
    }

    #[test]
    fn test_background_sees_only_family() {
        let (transcript, matches, intake) = fixture();
        let context = PromptContext {
            transcript: &transcript,
            matches: &matches,
            intake: &intake,
        };
        let prompt = section_prompt(SectionKind::Background, &spec(SectionKind::Background), &context);

        assert!(prompt.contains("Parent: We value independence"));
        assert!(prompt.contains("Student: I build robots"));
        assert!(!prompt.contains("Advisor: Prioritise"));
        assert!(!prompt.contains("Admissions Officer:"));
        assert!(!prompt.contains("Upper Canada College"));
        assert!(prompt.contains("between 850 and 1150 characters"));
    }

    #[test]
    fn test_matching_gets_every_row_with_rationale() {
        let (transcript, matches, intake) = fixture();
        let context = PromptContext {
            transcript: &transcript,
            matches: &matches,
            intake: &intake,
        };
        let prompt = section_prompt(SectionKind::Matching, &spec(SectionKind::Matching), &context);

        assert!(prompt.contains("1. Upper Canada College (boarding): match 91.0%."));
        assert!(prompt.contains(&matches[0].rationale));
        assert!(prompt.contains("2. Branksome Hall"));
        assert!(prompt.contains("Class size: 16"));
        assert!(prompt.contains("Signature programs: Robotics"));
    }

    #[test]
    fn test_corrections_are_appended() {
        let base = "Write the section.";
        assert_eq!(with_corrections(base, &[Correction::Regenerate]), base);

        let prompt = with_corrections(
            base,
            &[
                Correction::RemovePlaceholders(vec!["[TBD]".to_string()]),
                Correction::Expand(120),
            ],
        );
        assert!(prompt.starts_with(base));
        assert!(prompt.contains("Remove placeholder [TBD]"));
        assert!(prompt.contains("Expand by about 120 characters"));
    }
}
