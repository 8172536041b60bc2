//! Channel trait and the event/prompt types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Stream of inbound events produced by a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// The button group a choice came from.
///
/// Choice payloads are validated against the control that produced them, so
/// a stale gender button can never answer the profession step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    /// Welcome menu (start / help).
    Menu,
    Gender,
    Profession,
    /// One toggleable skill.
    Skill,
    /// Skills list actions (other / done).
    Skills,
    Experience,
    /// Review step (submit / restart).
    Confirm,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Menu => "menu",
            Self::Gender => "gender",
            Self::Profession => "profession",
            Self::Skill => "skill",
            Self::Skills => "skills",
            Self::Experience => "experience",
            Self::Confirm => "confirm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "menu" => Some(Self::Menu),
            "gender" => Some(Self::Gender),
            "profession" => Some(Self::Profession),
            "skill" => Some(Self::Skill),
            "skills" => Some(Self::Skills),
            "experience" => Some(Self::Experience),
            "confirm" => Some(Self::Confirm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a button press: which control, which value.
///
/// Encoded on the wire as `"<control>:<value>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoiceData {
    pub control: Control,
    pub value: String,
}

impl ChoiceData {
    pub fn new(control: Control, value: impl Into<String>) -> Self {
        Self {
            control,
            value: value.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.control, self.value)
    }

    /// Parse a wire payload. Splits on the first `:` only, so values may
    /// themselves contain colons.
    pub fn parse(raw: &str) -> Option<Self> {
        let (control, value) = raw.split_once(':')?;
        Some(Self::new(Control::parse(control)?, value))
    }
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: ChoiceData,
}

impl Button {
    pub fn new(label: impl Into<String>, data: ChoiceData) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

/// Buttons attached to a single message, row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// Find the button carrying `data`, if present.
    pub fn find(&self, data: &ChoiceData) -> Option<&Button> {
        self.rows.iter().flatten().find(|b| &b.data == data)
    }
}

/// Keyboard attached to an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Markup {
    #[default]
    None,
    /// Buttons under the message; presses arrive as choice events.
    Inline(InlineKeyboard),
    /// Reply keyboard that stays open; presses arrive as plain text.
    Persistent(Vec<Vec<String>>),
    /// Close a previously sent persistent keyboard.
    RemovePersistent,
}

/// A message to deliver to the applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub markup: Markup,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::None,
        }
    }

    pub fn with_inline(mut self, keyboard: InlineKeyboard) -> Self {
        self.markup = Markup::Inline(keyboard);
        self
    }

    pub fn with_persistent(mut self, rows: Vec<Vec<String>>) -> Self {
        self.markup = Markup::Persistent(rows);
        self
    }

    pub fn removing_persistent(mut self) -> Self {
        self.markup = Markup::RemovePersistent;
        self
    }
}

/// Something the controller wants the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Send a new message.
    Send(OutgoingMessage),
    /// Redraw the buttons of a message already sent.
    EditMarkup {
        message_id: i64,
        keyboard: InlineKeyboard,
    },
}

impl From<OutgoingMessage> for Outgoing {
    fn from(msg: OutgoingMessage) -> Self {
        Self::Send(msg)
    }
}

/// Slash command sent by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Restart,
    Quit,
    Help,
    Other(String),
}

impl Command {
    /// Parse `/name` (with an optional `@botname` suffix or arguments).
    /// Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("").to_lowercase();
        Some(match name.as_str() {
            "start" => Self::Start,
            "restart" => Self::Restart,
            "quit" | "cancel" => Self::Quit,
            "help" => Self::Help,
            _ => Self::Other(name),
        })
    }
}

/// Kind of uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Photo,
}

/// Descriptor of an uploaded file; the bytes stay with the transport until
/// fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Transport handle used to fetch the bytes.
    pub file_id: String,
    /// Stable identifier usable in file names, when the transport has one.
    pub unique_id: Option<String>,
    /// Original file name (documents only).
    pub file_name: Option<String>,
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Typed text.
    Text(String),
    /// Pressed an inline button. `message_id` identifies the message the
    /// button belongs to, when the transport knows it.
    Choice {
        data: ChoiceData,
        message_id: Option<i64>,
    },
    /// Uploaded a document or photo.
    Attachment(Attachment),
    /// Sent a slash command.
    Command(Command),
}

/// Where replies to an event go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub chat_id: String,
}

/// An inbound event tagged with the user it came from.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub reply_to: ReplyTarget,
    pub kind: EventKind,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(channel: &str, user_id: &str, chat_id: &str, kind: EventKind) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            reply_to: ReplyTarget {
                chat_id: chat_id.to_string(),
            },
            kind,
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Shorthand for a text event in a private chat (chat id = user id).
    pub fn text(channel: &str, user_id: &str, text: &str) -> Self {
        Self::new(channel, user_id, user_id, EventKind::Text(text.to_string()))
    }

    /// Shorthand for a button press in a private chat.
    pub fn choice(channel: &str, user_id: &str, data: ChoiceData, message_id: Option<i64>) -> Self {
        Self::new(channel, user_id, user_id, EventKind::Choice { data, message_id })
    }

    /// Shorthand for a command in a private chat.
    pub fn command(channel: &str, user_id: &str, command: Command) -> Self {
        Self::new(channel, user_id, user_id, EventKind::Command(command))
    }

    /// Shorthand for an upload in a private chat.
    pub fn attachment(channel: &str, user_id: &str, attachment: Attachment) -> Self {
        Self::new(channel, user_id, user_id, EventKind::Attachment(attachment))
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver one outgoing action.
    async fn send(&self, target: &ReplyTarget, outgoing: Outgoing) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

/// Downloads the bytes behind an attachment descriptor.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError>;
}
