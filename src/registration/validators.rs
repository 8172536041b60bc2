//! Field validators: raw input in, normalized value or rejection out.
//!
//! Every function here is pure. A rejection leaves the session untouched and
//! its `Display` text is relayed to the applicant as the retry prompt.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::channels::Control;

use super::model::Field;

/// Local mobile number: "09" followed by exactly eight digits.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^09\d{8}$").expect("phone pattern is valid"));

/// Date format accepted for the date of birth.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Literal accepted in place of a portfolio.
pub const NO_PORTFOLIO: &str = "None";

/// Why an answer was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("❌ {field} can't be empty. Please enter it again:")]
    Empty { field: Field },

    #[error("❌ Invalid. Please enter again (e.g., 0912345678):")]
    InvalidPhone,

    #[error("❌ Invalid. Use dd/mm/yyyy:")]
    InvalidDate,

    #[error("❌ Please choose one of the buttons below.")]
    NotAnOption { control: Control, value: String },

    #[error("❌ Couldn't save your file ({reason}). Please upload it again or send a link:")]
    UploadFailed { reason: String },
}

/// Full name: trimmed, non-empty.
pub fn name(raw: &str) -> Result<String, Rejection> {
    free_text(Field::FullName, raw)
}

/// Phone number: must match the local pattern exactly after trimming.
pub fn phone(raw: &str) -> Result<String, Rejection> {
    let trimmed = raw.trim();
    if PHONE_PATTERN.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(Rejection::InvalidPhone)
    }
}

/// Date of birth in dd/mm/yyyy; must be a real calendar date.
pub fn date_of_birth(raw: &str) -> Result<String, Rejection> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map(|_| trimmed.to_string())
        .map_err(|_| Rejection::InvalidDate)
}

/// Year of study, asked of students only.
pub fn year_of_study(raw: &str) -> Result<String, Rejection> {
    free_text(Field::YearOfStudy, raw)
}

/// Any free-text field: trimmed, non-empty.
pub fn free_text(field: Field, raw: &str) -> Result<String, Rejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(Rejection::Empty { field })
    } else {
        Ok(trimmed.to_string())
    }
}

/// A discrete choice: the value must belong to the option set of the control
/// that produced it.
pub fn choice(control: Control, value: &str, options: &[&str]) -> Result<String, Rejection> {
    if options.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(Rejection::NotAnOption {
            control,
            value: value.to_string(),
        })
    }
}

/// Portfolio sent as text: a link, a description, or "None".
pub fn portfolio_text(raw: &str) -> Result<String, Rejection> {
    let trimmed = free_text(Field::Portfolio, raw)?;
    if trimmed.eq_ignore_ascii_case(NO_PORTFOLIO) {
        Ok(NO_PORTFOLIO.to_string())
    } else {
        Ok(trimmed)
    }
}
