//! Prompt texts and keyboards for each step of the registration flow.

use crate::channels::{Button, ChoiceData, Control, InlineKeyboard, OutgoingMessage};

use super::model::{Schema, SubmissionRecord};
use super::session::Session;
use super::skills;
use super::state::{FlowState, STUDENT};

pub const GENDER_OPTIONS: &[&str] = &["Male", "Female"];
pub const PROFESSION_OPTIONS: &[&str] = &["Graduate", STUDENT];
pub const EXPERIENCE_OPTIONS: &[&str] = &["Yes", "No"];

/// Menu button values.
pub const MENU_START: &str = "start";
pub const MENU_HELP: &str = "help";

/// Review button values.
pub const CONFIRM_SUBMIT: &str = "submit";
pub const CONFIRM_RESTART: &str = "restart";

/// Labels of the persistent keyboard; typing them triggers the interrupts.
pub const INTERRUPT_KEYBOARD: &[&str] = &["Restart", "Quit", "Help"];

pub const WELCOME: &str = "👋 Welcome to Summer Tutor Registration!";
pub const RESTARTING: &str = "🔁 Restarting registration.";
pub const CANCELLED: &str = "❌ Registration cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel. Send /start to register.";
pub const IDLE_HINT: &str = "Send /start to begin registration.";
pub const SUBMITTED: &str = "✅ Thank you! Registration submitted.";
pub const SUBMIT_FAILED: &str =
    "⚠️ Sorry, we couldn't save your registration. Nothing was submitted. Please tap Submit to try again.";
pub const STILL_WORKING: &str = "⏳ Still working on your earlier messages. Please wait a moment and send that again.";
pub const UNRECOGNIZED: &str = "🤔 I didn't understand that. Please answer the question below, or type 'help'.";

pub const HELP: &str = "📋 Available commands:\n\
/start - Begin registration\n\
/restart - Restart registration\n\
/quit - Cancel registration\n\
/help - Show this help message\n\n\
You can also type restart, quit or help at any step.";

/// Welcome menu shown while idle.
pub fn menu() -> OutgoingMessage {
    OutgoingMessage::text(WELCOME).with_inline(
        InlineKeyboard::new()
            .row(vec![Button::new(
                "Start Registration ✅",
                ChoiceData::new(Control::Menu, MENU_START),
            )])
            .row(vec![Button::new(
                "Help ℹ️",
                ChoiceData::new(Control::Menu, MENU_HELP),
            )]),
    )
}

/// Persistent keyboard offered while a registration is in progress.
pub fn interrupt_keyboard(text: &str) -> OutgoingMessage {
    OutgoingMessage::text(text).with_persistent(vec![
        INTERRUPT_KEYBOARD.iter().map(|s| s.to_string()).collect(),
    ])
}

/// One row of buttons, one per option, each carrying its own value.
pub fn choice_keyboard(control: Control, options: &[&str]) -> InlineKeyboard {
    InlineKeyboard::new().row(
        options
            .iter()
            .map(|o| Button::new(*o, ChoiceData::new(control, *o)))
            .collect(),
    )
}

/// Review summary with submit / restart buttons.
pub fn review(record: &SubmissionRecord) -> OutgoingMessage {
    OutgoingMessage::text(format!("✔️ Review:\n\n{}", record.summary())).with_inline(
        InlineKeyboard::new().row(vec![
            Button::new("✅ Submit", ChoiceData::new(Control::Confirm, CONFIRM_SUBMIT)),
            Button::new("🔁 Restart", ChoiceData::new(Control::Confirm, CONFIRM_RESTART)),
        ]),
    )
}

/// The question for the session's current step.
pub fn prompt_for(session: &Session, schema: &Schema) -> OutgoingMessage {
    match session.state {
        FlowState::Idle => menu(),
        FlowState::Name => OutgoingMessage::text("✍️ What's your Full Name?"),
        FlowState::Phone => OutgoingMessage::text("📞 Your Phone Number (e.g., 0912345678):"),
        FlowState::Gender => OutgoingMessage::text("⚧️ Select Gender:")
            .with_inline(choice_keyboard(Control::Gender, GENDER_OPTIONS)),
        FlowState::DateOfBirth => OutgoingMessage::text("📅 Date of Birth (dd/mm/yyyy):"),
        FlowState::Profession => OutgoingMessage::text("🎓 Profession:")
            .with_inline(choice_keyboard(Control::Profession, PROFESSION_OPTIONS)),
        FlowState::Year => OutgoingMessage::text("📘 Year of Study:"),
        FlowState::Residence => OutgoingMessage::text("📍 Residence Area:"),
        FlowState::Locations => OutgoingMessage::text("📌 Preferred tutoring areas:"),
        FlowState::FieldOfStudy => OutgoingMessage::text("📚 Field of Study:"),
        FlowState::Skills => OutgoingMessage::text(
            "🎯 Skills you teach. Tap to select or unselect, then press Done:",
        )
        .with_inline(session.skills.keyboard()),
        FlowState::CustomSkill => OutgoingMessage::text("✏️ Type the skill you'd like to add:"),
        FlowState::Languages => OutgoingMessage::text("🌍 Other languages you speak:"),
        FlowState::Portfolio => {
            OutgoingMessage::text("📁 Upload portfolio (file or link) or type 'None':")
        }
        FlowState::Experience => OutgoingMessage::text("🧑‍🏫 Tutored before?")
            .with_inline(choice_keyboard(Control::Experience, EXPERIENCE_OPTIONS)),
        FlowState::Confirm => match SubmissionRecord::from_answers(schema, &session.answers) {
            Ok(record) => review(&record),
            // Unreachable through the controller; show what we have.
            Err(_) => OutgoingMessage::text("✔️ Review is not available yet."),
        },
    }
}

/// Options accepted from `control`, for set-membership validation.
pub fn options_for(control: Control) -> &'static [&'static str] {
    match control {
        Control::Menu => &[MENU_START, MENU_HELP],
        Control::Gender => GENDER_OPTIONS,
        Control::Profession => PROFESSION_OPTIONS,
        Control::Skill => skills::SKILL_OPTIONS,
        Control::Skills => &[skills::OTHER, skills::DONE],
        Control::Experience => EXPERIENCE_OPTIONS,
        Control::Confirm => &[CONFIRM_SUBMIT, CONFIRM_RESTART],
    }
}
