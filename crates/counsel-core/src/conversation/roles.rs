//! Conversation roles and their behavior table

use serde::{Deserialize, Serialize};

/// Participants in a counselling conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AdmissionsOfficer,
    Parent,
    Student,
    Advisor,
    Writer,
    System,
}

/// Static behavior of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleBehavior {
    pub display_name: &'static str,
    pub persona: &'static str,
    /// Position in the round, `None` for roles that never take a turn
    pub turn_position: Option<usize>,
    pub speaks_mid_conversation: bool,
    /// Messages from this role can resolve information gaps
    pub answers_gaps: bool,
    /// Roles whose messages this role may see
    pub visible_roles: &'static [Role],
}

const EVERYONE: &[Role] = &[
    Role::AdmissionsOfficer,
    Role::Parent,
    Role::Student,
    Role::Advisor,
];

static BEHAVIORS: [(Role, RoleBehavior); 6] = [
    (
        Role::AdmissionsOfficer,
        RoleBehavior {
            display_name: "Admissions Officer",
            persona: "You are an experienced admissions officer at a selective independent school. \
                      Ask one or two focused questions that uncover the student's readiness, \
                      motivation and fit. Never assume facts the family has not stated.",
            turn_position: Some(0),
            speaks_mid_conversation: true,
            answers_gaps: false,
            visible_roles: EVERYONE,
        },
    ),
    (
        Role::Parent,
        RoleBehavior {
            display_name: "Parent",
            persona: "You are the student's parent. Answer the officer's questions about family \
                      background, values and expectations using only the intake details provided.",
            turn_position: Some(1),
            speaks_mid_conversation: true,
            answers_gaps: true,
            visible_roles: &[Role::AdmissionsOfficer, Role::Parent, Role::Advisor],
        },
    ),
    (
        Role::Student,
        RoleBehavior {
            display_name: "Student",
            persona: "You are the student applying. Answer in your own voice about your interests, \
                      studies and goals, drawing only on the intake profile.",
            turn_position: Some(2),
            speaks_mid_conversation: true,
            answers_gaps: true,
            visible_roles: &[Role::AdmissionsOfficer, Role::Student, Role::Advisor],
        },
    ),
    (
        Role::Advisor,
        RoleBehavior {
            display_name: "Advisor",
            persona: "You are the family's admissions advisor. Turn what the family has said into \
                      a concrete plan update, and ask a follow-up question only where something \
                      essential is still missing.",
            turn_position: Some(3),
            speaks_mid_conversation: true,
            answers_gaps: false,
            visible_roles: EVERYONE,
        },
    ),
    (
        Role::Writer,
        RoleBehavior {
            display_name: "Writer",
            persona: "You are a professional report writer producing a long-form admissions \
                      counselling report in plain, confident prose.",
            turn_position: None,
            speaks_mid_conversation: false,
            answers_gaps: false,
            visible_roles: EVERYONE,
        },
    ),
    (
        Role::System,
        RoleBehavior {
            display_name: "System",
            persona: "",
            turn_position: None,
            speaks_mid_conversation: false,
            answers_gaps: false,
            visible_roles: EVERYONE,
        },
    ),
];

impl Role {
    /// Roles that take turns, in round order
    pub const TURN_ORDER: [Role; 4] = [
        Role::AdmissionsOfficer,
        Role::Parent,
        Role::Student,
        Role::Advisor,
    ];

    pub fn behavior(&self) -> &'static RoleBehavior {
        let index = match self {
            Role::AdmissionsOfficer => 0,
            Role::Parent => 1,
            Role::Student => 2,
            Role::Advisor => 3,
            Role::Writer => 4,
            Role::System => 5,
        };
        &BEHAVIORS[index].1
    }

    pub fn display_name(&self) -> &'static str {
        self.behavior().display_name
    }

    /// Whether this role may see a message written by `author`.
    /// System messages are visible to everyone.
    pub fn can_see(&self, author: Role) -> bool {
        author == Role::System || self.behavior().visible_roles.contains(&author)
    }

    /// The role that speaks after this one, `None` after the last turn of a round
    pub fn next_in_round(&self) -> Option<Role> {
        let position = self.behavior().turn_position?;
        Role::TURN_ORDER.get(position + 1).copied()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
