//! Tutor intake: a conversational registration bot for summer tutors.

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registration;
pub mod store;
