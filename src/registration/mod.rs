//! Tutor registration: a guided, button-driven questionnaire.
//!
//! Each applicant walks a fixed graph of questions. Answers are validated
//! one at a time and kept in a per-user session until the applicant confirms
//! the review, at which point a single record is appended to the sheet.

pub mod controller;
pub mod model;
pub mod prompts;
pub mod session;
pub mod skills;
pub mod state;
pub mod validators;

pub use controller::{DialogueController, Interrupt};
pub use model::{Answers, Field, Schema, SubmissionRecord};
pub use session::{Session, SessionStore};
pub use skills::SkillSelection;
pub use state::FlowState;
pub use validators::Rejection;
