//! Skills multi-select: an accumulating set edited by repeated toggle presses.

use serde::{Deserialize, Serialize};

use crate::channels::{Button, ChoiceData, Control, InlineKeyboard};

/// Skills offered as toggle buttons.
pub const SKILL_OPTIONS: &[&str] = &[
    "Coding (Programming)",
    "Graphic Design",
    "Music",
    "Art & Drawing",
    "Public Speaking",
    "Photography",
    "Video Editing",
    "Robotics",
];

/// Value of the "type my own" button.
pub const OTHER: &str = "other";
/// Value of the button that finalizes the selection.
pub const DONE: &str = "done";

/// Prefix drawn on every selected entry.
const SELECTED_MARKER: &str = "✅ ";

/// Room left for a custom value after the `skill:` prefix.
const CUSTOM_KEY_MAX_BYTES: usize = 48;

/// Skills picked so far in the current attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSelection {
    options: Vec<String>,
    custom: Vec<String>,
}

impl SkillSelection {
    /// Whether `value` is one of the fixed toggle options.
    pub fn is_option(value: &str) -> bool {
        SKILL_OPTIONS.contains(&value)
    }

    /// Flip a fixed option in or out of the selection.
    ///
    /// Returns `true` if the option is selected afterwards. Values outside
    /// [`SKILL_OPTIONS`] are ignored and return `false`.
    pub fn toggle(&mut self, option: &str) -> bool {
        if !Self::is_option(option) {
            return false;
        }
        if let Some(pos) = self.options.iter().position(|o| o == option) {
            self.options.remove(pos);
            false
        } else {
            self.options.push(option.to_string());
            true
        }
    }

    /// Add a typed-in skill. Blank entries and repeats are ignored; a custom
    /// entry matching a fixed option selects that option instead.
    pub fn add_custom(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if Self::is_option(text) {
            if !self.contains(text) {
                self.toggle(text);
            }
            return;
        }
        if !self.custom.iter().any(|c| c == text) {
            self.custom.push(text.to_string());
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|o| o == value) || self.custom.iter().any(|c| c == value)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.custom.is_empty()
    }

    pub fn clear(&mut self) {
        self.options.clear();
        self.custom.clear();
    }

    /// Selected skills in display order: fixed options in list order, then
    /// custom entries in the order they were typed.
    pub fn selected(&self) -> Vec<&str> {
        SKILL_OPTIONS
            .iter()
            .copied()
            .filter(|o| self.options.iter().any(|s| s == o))
            .chain(self.custom.iter().map(String::as_str))
            .collect()
    }

    /// Comma-joined answer stored in the skills column. Empty when nothing
    /// was picked.
    pub fn finalize(&self) -> String {
        self.selected().join(", ")
    }

    /// Toggle list with a marker on every selected entry.
    ///
    /// Custom entries are shown with a marker but carry no toggle; pressing
    /// them is a no-op redraw.
    pub fn keyboard(&self) -> InlineKeyboard {
        let mut keyboard = InlineKeyboard::new();
        for option in SKILL_OPTIONS {
            let label = if self.options.iter().any(|s| s == option) {
                format!("{SELECTED_MARKER}{option}")
            } else {
                (*option).to_string()
            };
            keyboard = keyboard.row(vec![Button::new(
                label,
                ChoiceData::new(Control::Skill, *option),
            )]);
        }
        for custom in &self.custom {
            keyboard = keyboard.row(vec![Button::new(
                format!("{SELECTED_MARKER}{custom}"),
                ChoiceData::new(Control::Skill, custom_key(custom)),
            )]);
        }
        keyboard.row(vec![
            Button::new("➕ Other", ChoiceData::new(Control::Skills, OTHER)),
            Button::new("✔️ Done", ChoiceData::new(Control::Skills, DONE)),
        ])
    }
}

/// Callback value for a custom row. Truncated to fit the transport's 64-byte
/// payload limit; the leading `+` keeps it from matching a fixed option.
fn custom_key(custom: &str) -> String {
    let mut key = String::from("+");
    for c in custom.chars() {
        if key.len() + c.len_utf8() > CUSTOM_KEY_MAX_BYTES {
            break;
        }
        key.push(c);
    }
    key
}
