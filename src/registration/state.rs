//! Registration flow graph: which step the applicant is on and what comes next.

use serde::{Deserialize, Serialize};

use super::model::{Answers, Field, Schema};

/// Profession value that routes through the year-of-study step.
pub const STUDENT: &str = "Student";

/// A node of the registration flow.
///
/// Mostly linear: Name → Phone → Gender → [DateOfBirth] → Profession →
/// [Year] → Residence → Locations → FieldOfStudy → Skills ⇄ CustomSkill →
/// Languages → Portfolio → Experience → Confirm. `Idle` is the menu state
/// outside any registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Name,
    Phone,
    Gender,
    DateOfBirth,
    Profession,
    Year,
    Residence,
    Locations,
    FieldOfStudy,
    Skills,
    CustomSkill,
    Languages,
    Portfolio,
    Experience,
    Confirm,
}

impl FlowState {
    /// Entry node of every registration attempt.
    pub fn first() -> Self {
        Self::Name
    }

    /// The answer field this step fills, if any.
    ///
    /// `Skills` and `CustomSkill` both feed the skills field; the value is only
    /// written when the selection is finalized.
    pub fn field(&self) -> Option<Field> {
        match self {
            Self::Idle | Self::Confirm => None,
            Self::Name => Some(Field::FullName),
            Self::Phone => Some(Field::PhoneNumber),
            Self::Gender => Some(Field::Gender),
            Self::DateOfBirth => Some(Field::DateOfBirth),
            Self::Profession => Some(Field::Profession),
            Self::Year => Some(Field::YearOfStudy),
            Self::Residence => Some(Field::ResidenceArea),
            Self::Locations => Some(Field::PreferredAreas),
            Self::FieldOfStudy => Some(Field::FieldOfStudy),
            Self::Skills | Self::CustomSkill => Some(Field::Skills),
            Self::Languages => Some(Field::Languages),
            Self::Portfolio => Some(Field::Portfolio),
            Self::Experience => Some(Field::TutoringExperience),
        }
    }

    /// Whether a registration is in progress at this node.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether the node collects an answer (everything but idle and confirm).
    pub fn is_data_entry(&self) -> bool {
        self.field().is_some()
    }

    /// Canonical successor once this node's answer has been accepted.
    ///
    /// `Skills` advances to `Languages` on "done"; the detour into
    /// `CustomSkill` is driven by the controller, not by this table.
    pub fn successor(&self, answers: &Answers, schema: &Schema) -> Self {
        match self {
            Self::Idle => Self::Name,
            Self::Name => Self::Phone,
            Self::Phone => Self::Gender,
            Self::Gender if schema.includes(Field::DateOfBirth) => Self::DateOfBirth,
            Self::Gender | Self::DateOfBirth => Self::Profession,
            Self::Profession if answers.get(Field::Profession) == Some(STUDENT) => Self::Year,
            Self::Profession | Self::Year => Self::Residence,
            Self::Residence => Self::Locations,
            Self::Locations => Self::FieldOfStudy,
            Self::FieldOfStudy => Self::Skills,
            Self::Skills => Self::Languages,
            Self::CustomSkill => Self::Skills,
            Self::Languages => Self::Portfolio,
            Self::Portfolio => Self::Experience,
            Self::Experience => Self::Confirm,
            Self::Confirm => Self::Idle,
        }
    }

    /// Check if `self → target` is an edge of the flow graph.
    ///
    /// Restart edges (any active node → `Name`) and cancellation edges (any
    /// node → `Idle`) are always allowed.
    pub fn can_transition_to(&self, target: FlowState) -> bool {
        use FlowState::*;
        if target == Idle || (target == Name && self.is_active()) {
            return true;
        }
        matches!(
            (self, target),
            (Idle, Name)
                | (Name, Phone)
                | (Phone, Gender)
                | (Gender, DateOfBirth)
                | (Gender, Profession)
                | (DateOfBirth, Profession)
                | (Profession, Year)
                | (Profession, Residence)
                | (Year, Residence)
                | (Residence, Locations)
                | (Locations, FieldOfStudy)
                | (FieldOfStudy, Skills)
                | (Skills, CustomSkill)
                | (CustomSkill, Skills)
                | (Skills, Languages)
                | (Languages, Portfolio)
                | (Portfolio, Experience)
                | (Experience, Confirm)
        )
    }
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Gender => "gender",
            Self::DateOfBirth => "date_of_birth",
            Self::Profession => "profession",
            Self::Year => "year",
            Self::Residence => "residence",
            Self::Locations => "locations",
            Self::FieldOfStudy => "field_of_study",
            Self::Skills => "skills",
            Self::CustomSkill => "custom_skill",
            Self::Languages => "languages",
            Self::Portfolio => "portfolio",
            Self::Experience => "experience",
            Self::Confirm => "confirm",
        };
        write!(f, "{s}")
    }
}
