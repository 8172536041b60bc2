//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Input lines:
//! - `/start`, `/restart`, ... are commands
//! - `#2` presses the second button of the last keyboard shown
//! - `#gender:Female` presses a button by its raw payload
//! - `@path/to/file.pdf` uploads a local file
//! - anything else is typed text

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::channels::{
    Attachment, AttachmentKind, Channel, ChoiceData, Command, EventKind, EventStream,
    FileFetcher, InboundEvent, InlineKeyboard, Markup, Outgoing, ReplyTarget,
};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "cli";
const LOCAL_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    /// Buttons of the most recent keyboard, in display order.
    buttons: Arc<Mutex<Vec<ChoiceData>>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let buttons = Arc::clone(&self.buttons);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let kind = {
                            let buttons = buttons.lock().await;
                            parse_line(&line, &buttons)
                        };
                        let Some(kind) = kind else {
                            eprint!("> ");
                            continue;
                        };
                        let event = InboundEvent::new(CHANNEL_NAME, LOCAL_USER, LOCAL_USER, kind);
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!(error = %e, "Error reading stdin");
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _target: &ReplyTarget, outgoing: Outgoing) -> Result<(), ChannelError> {
        let keyboard = match &outgoing {
            Outgoing::Send(msg) => match &msg.markup {
                Markup::Inline(keyboard) => Some(keyboard),
                _ => None,
            },
            Outgoing::EditMarkup { keyboard, .. } => Some(keyboard),
        };
        if let Some(keyboard) = keyboard {
            *self.buttons.lock().await = keyboard.rows.iter().flatten().map(|b| b.data.clone()).collect();
        }

        println!("\n{}\n", render(&outgoing));
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Uploads are local paths; fetching reads the file.
#[async_trait]
impl FileFetcher for CliChannel {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError> {
        tokio::fs::read(&attachment.file_id)
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("{}: {e}", attachment.file_id)))
    }
}

/// Interpret one input line. `buttons` are the payloads of the last keyboard
/// shown, used for `#<n>` shortcuts. Blank lines yield nothing.
pub fn parse_line(line: &str, buttons: &[ChoiceData]) -> Option<EventKind> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(command) = Command::parse(line) {
        return Some(EventKind::Command(command));
    }

    if let Some(choice) = line.strip_prefix('#') {
        let data = match choice.parse::<usize>() {
            Ok(n) if n >= 1 => buttons.get(n - 1).cloned(),
            Ok(_) => None,
            Err(_) => ChoiceData::parse(choice),
        };
        return match data {
            Some(data) => Some(EventKind::Choice {
                data,
                message_id: None,
            }),
            None => {
                eprintln!("No such button: {choice}");
                None
            }
        };
    }

    if let Some(path) = line.strip_prefix('@') {
        let path = path.trim();
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from);
        let is_image = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"));
        return Some(EventKind::Attachment(Attachment {
            kind: if is_image {
                AttachmentKind::Photo
            } else {
                AttachmentKind::Document
            },
            file_id: path.to_string(),
            unique_id: None,
            file_name,
        }));
    }

    Some(EventKind::Text(line.to_string()))
}

/// Plain-text rendering of an outgoing action.
pub fn render(outgoing: &Outgoing) -> String {
    match outgoing {
        Outgoing::Send(msg) => match &msg.markup {
            Markup::None | Markup::RemovePersistent => msg.text.clone(),
            Markup::Inline(keyboard) => format!("{}\n{}", msg.text, render_keyboard(keyboard)),
            Markup::Persistent(rows) => {
                let labels: Vec<&str> = rows.iter().flatten().map(String::as_str).collect();
                format!("{}\n(keyboard: {})", msg.text, labels.join(" | "))
            }
        },
        Outgoing::EditMarkup { keyboard, .. } => render_keyboard(keyboard),
    }
}

fn render_keyboard(keyboard: &InlineKeyboard) -> String {
    let mut n = 0;
    keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| {
                    n += 1;
                    format!("[#{n}] {}", b.label)
                })
                .collect::<Vec<_>>()
                .join("   ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Button, Control, OutgoingMessage};

    fn gender_buttons() -> Vec<ChoiceData> {
        vec![
            ChoiceData::new(Control::Gender, "Male"),
            ChoiceData::new(Control::Gender, "Female"),
        ]
    }

    #[test]
    fn parses_commands_and_text() {
        assert_eq!(
            parse_line("/quit", &[]),
            Some(EventKind::Command(Command::Quit))
        );
        assert_eq!(
            parse_line("  Jane Doe ", &[]),
            Some(EventKind::Text("Jane Doe".into()))
        );
        assert_eq!(parse_line("   ", &[]), None);
    }

    #[test]
    fn numbered_button_press() {
        let event = parse_line("#2", &gender_buttons()).unwrap();
        assert_eq!(
            event,
            EventKind::Choice {
                data: ChoiceData::new(Control::Gender, "Female"),
                message_id: None,
            }
        );
        assert_eq!(parse_line("#3", &gender_buttons()), None);
        assert_eq!(parse_line("#0", &gender_buttons()), None);
    }

    #[test]
    fn raw_payload_press() {
        let event = parse_line("#profession:Student", &[]).unwrap();
        assert!(matches!(
            event,
            EventKind::Choice { ref data, .. } if data.control == Control::Profession && data.value == "Student"
        ));
    }

    #[test]
    fn upload_line() {
        let Some(EventKind::Attachment(att)) = parse_line("@/tmp/work/cv.pdf", &[]) else {
            panic!("expected attachment");
        };
        assert_eq!(att.kind, AttachmentKind::Document);
        assert_eq!(att.file_id, "/tmp/work/cv.pdf");
        assert_eq!(att.file_name.as_deref(), Some("cv.pdf"));

        let Some(EventKind::Attachment(photo)) = parse_line("@shot.PNG", &[]) else {
            panic!("expected attachment");
        };
        assert_eq!(photo.kind, AttachmentKind::Photo);
    }

    #[test]
    fn renders_numbered_buttons() {
        let msg = OutgoingMessage::text("⚧️ Select Gender:").with_inline(
            InlineKeyboard::new()
                .row(vec![
                    Button::new("Male", ChoiceData::new(Control::Gender, "Male")),
                    Button::new("Female", ChoiceData::new(Control::Gender, "Female")),
                ]),
        );
        assert_eq!(
            render(&msg.into()),
            "⚧️ Select Gender:\n[#1] Male   [#2] Female"
        );
    }

    #[tokio::test]
    async fn send_remembers_last_keyboard() {
        let cli = CliChannel::new();
        let keyboard = InlineKeyboard::new().row(vec![Button::new(
            "Done",
            ChoiceData::new(Control::Skills, "done"),
        )]);
        let target = ReplyTarget {
            chat_id: LOCAL_USER.into(),
        };
        cli.send(&target, Outgoing::EditMarkup { message_id: 1, keyboard })
            .await
            .unwrap();
        assert_eq!(
            *cli.buttons.lock().await,
            vec![ChoiceData::new(Control::Skills, "done")]
        );
    }

    #[tokio::test]
    async fn fetch_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let att = Attachment {
            kind: AttachmentKind::Document,
            file_id: path.to_string_lossy().into_owned(),
            unique_id: None,
            file_name: Some("cv.pdf".into()),
        };
        assert_eq!(CliChannel::new().fetch(&att).await.unwrap(), b"%PDF");

        let missing = Attachment {
            file_id: dir.path().join("nope").to_string_lossy().into_owned(),
            ..att
        };
        assert!(CliChannel::new().fetch(&missing).await.is_err());
    }
}
