//! Registration schema, collected answers, and submission records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Placeholder stored for a field that does not apply to the applicant.
pub const SENTINEL: &str = "-";

/// One column of the registration sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FullName,
    PhoneNumber,
    Gender,
    DateOfBirth,
    Profession,
    YearOfStudy,
    ResidenceArea,
    PreferredAreas,
    FieldOfStudy,
    Skills,
    Languages,
    Portfolio,
    TutoringExperience,
}

impl Field {
    /// Column header written to the sheet.
    pub fn header(&self) -> &'static str {
        match self {
            Self::FullName => "Full Name",
            Self::PhoneNumber => "Phone Number",
            Self::Gender => "Gender",
            Self::DateOfBirth => "Date of Birth",
            Self::Profession => "Profession",
            Self::YearOfStudy => "Year of Study",
            Self::ResidenceArea => "Residence Area",
            Self::PreferredAreas => "Preferred Areas",
            Self::FieldOfStudy => "Field of Study",
            Self::Skills => "Skills",
            Self::Languages => "Languages",
            Self::Portfolio => "Portfolio",
            Self::TutoringExperience => "Tutoring Experience",
        }
    }

    /// Whether the field may be filled with [`SENTINEL`] when no answer exists.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::YearOfStudy)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header())
    }
}

/// Ordered set of fields that make up one submission row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// The twelve-column schema used by default.
    pub fn standard() -> Self {
        Self {
            fields: vec![
                Field::FullName,
                Field::PhoneNumber,
                Field::Gender,
                Field::Profession,
                Field::YearOfStudy,
                Field::ResidenceArea,
                Field::PreferredAreas,
                Field::FieldOfStudy,
                Field::Skills,
                Field::Languages,
                Field::Portfolio,
                Field::TutoringExperience,
            ],
        }
    }

    /// The standard schema plus a date of birth column after gender.
    pub fn with_date_of_birth() -> Self {
        let mut schema = Self::standard();
        let at = schema
            .fields
            .iter()
            .position(|f| *f == Field::Gender)
            .map_or(0, |i| i + 1);
        schema.fields.insert(at, Field::DateOfBirth);
        schema
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn includes(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    /// Header row, in column order.
    pub fn headers(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.header().to_string()).collect()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::standard()
    }
}

/// Answers confirmed so far, keyed by field.
///
/// Only the dialogue controller writes here, and only with values a
/// validator has already normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answers {
    values: BTreeMap<Field, String>,
}

impl Answers {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub(crate) fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// One finalized registration, ready to be appended to the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// `(field, value)` pairs in schema order; every schema field is present.
    pub values: Vec<(Field, String)>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Build a schema-complete record from the collected answers.
    ///
    /// Optional fields without an answer get [`SENTINEL`]; any other gap is an
    /// error and nothing should be written.
    pub fn from_answers(schema: &Schema, answers: &Answers) -> Result<Self, StorageError> {
        let mut values = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let value = match answers.get(*field) {
                Some(v) => v.to_string(),
                None if field.is_optional() => SENTINEL.to_string(),
                None => {
                    return Err(StorageError::IncompleteRecord {
                        field: field.header().to_string(),
                    });
                }
            };
            values.push((*field, value));
        }
        Ok(Self {
            values,
            submitted_at: Utc::now(),
        })
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Cell values in column order.
    pub fn row(&self) -> Vec<&str> {
        self.values.iter().map(|(_, v)| v.as_str()).collect()
    }

    /// Human-readable `Header: value` lines for the review step.
    pub fn summary(&self) -> String {
        self.values
            .iter()
            .map(|(f, v)| format!("{}: {}", f.header(), v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
