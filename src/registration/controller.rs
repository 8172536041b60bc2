//! Dialogue controller: maps (session state, inbound event) to the next
//! state and the prompts to send.
//!
//! Every event for a user runs under that user's session lock, start to
//! finish. Validation and event-level failures never leave this module; they
//! become re-prompts. Storage failures change the reply and leave the session
//! where it was so the step can be retried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channels::{
    Attachment, ChoiceData, Command, Control, EventKind, InboundEvent, Markup, Outgoing,
    OutgoingMessage,
};
use crate::error::StorageError;
use crate::store::{PortfolioStore, SubmissionSink};

use super::model::{Field, SENTINEL, Schema, SubmissionRecord};
use super::prompts::{self, options_for};
use super::session::{Session, SessionStore};
use super::skills::{self, SkillSelection};
use super::state::{FlowState, STUDENT};
use super::validators::{self, Rejection};

/// Control requests honored from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Restart,
    Quit,
    Help,
}

impl Interrupt {
    /// Recognize a typed interrupt keyword: `restart`, `quit` or `help`,
    /// case-insensitive, with or without a leading `/`.
    pub fn from_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let word = trimmed.strip_prefix('/').unwrap_or(trimmed).to_lowercase();
        match word.as_str() {
            "restart" => Some(Self::Restart),
            "quit" => Some(Self::Quit),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Command(Command::Restart) => Some(Self::Restart),
            EventKind::Command(Command::Quit) => Some(Self::Quit),
            EventKind::Command(Command::Help) => Some(Self::Help),
            EventKind::Text(text) => Self::from_text(text),
            _ => None,
        }
    }
}

/// Drives registration sessions.
pub struct DialogueController {
    sessions: Arc<SessionStore>,
    sink: Arc<dyn SubmissionSink>,
    portfolios: Arc<dyn PortfolioStore>,
    schema: Schema,
    upload_timeout: Duration,
}

impl DialogueController {
    pub fn new(
        sessions: Arc<SessionStore>,
        sink: Arc<dyn SubmissionSink>,
        portfolios: Arc<dyn PortfolioStore>,
        schema: Schema,
    ) -> Self {
        Self {
            sessions,
            sink,
            portfolios,
            schema,
            upload_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Process one inbound event and return what to send back.
    pub async fn handle(&self, event: &InboundEvent) -> Vec<Outgoing> {
        let handle = self.sessions.session(&event.user_id).await;
        let mut session = handle.lock().await;

        let before = session.state;
        let replies = self.dispatch(&mut session, event).await;
        session.touch();

        if session.state != before {
            debug!(
                user_id = %event.user_id,
                from = %before,
                to = %session.state,
                "Flow transition"
            );
        }
        replies
    }

    async fn dispatch(&self, session: &mut Session, event: &InboundEvent) -> Vec<Outgoing> {
        if let Some(interrupt) = Interrupt::from_event(&event.kind) {
            return self.interrupt(session, interrupt, &event.user_id);
        }

        match &event.kind {
            EventKind::Command(Command::Start) if !session.is_active() => vec![prompts::menu().into()],
            EventKind::Command(Command::Other(name)) if !session.is_active() => {
                debug!(user_id = %event.user_id, command = %name, "Unknown command while idle");
                vec![OutgoingMessage::text(prompts::IDLE_HINT).into()]
            }
            EventKind::Choice { data, .. } if data.control == Control::Menu => {
                match data.value.as_str() {
                    prompts::MENU_START => self.begin(session, &event.user_id),
                    prompts::MENU_HELP => self.interrupt(session, Interrupt::Help, &event.user_id),
                    _ => self.unrecognized(session),
                }
            }
            _ if !session.is_active() => vec![OutgoingMessage::text(prompts::IDLE_HINT).into()],
            _ => self.answer(session, event).await,
        }
    }

    fn interrupt(&self, session: &mut Session, interrupt: Interrupt, user_id: &str) -> Vec<Outgoing> {
        match interrupt {
            Interrupt::Restart if !session.is_active() => self.begin(session, user_id),
            Interrupt::Restart => {
                info!(user_id = %user_id, from = %session.state, "Registration restarted");
                session.restart();
                vec![
                    prompts::interrupt_keyboard(prompts::RESTARTING).into(),
                    self.prompt(session),
                ]
            }
            Interrupt::Quit if !session.is_active() => {
                vec![OutgoingMessage::text(prompts::NOTHING_TO_CANCEL).into()]
            }
            Interrupt::Quit => {
                info!(user_id = %user_id, from = %session.state, "Registration cancelled");
                session.reset_to_idle();
                vec![OutgoingMessage::text(prompts::CANCELLED).removing_persistent().into()]
            }
            Interrupt::Help => vec![OutgoingMessage::text(prompts::HELP).into(), self.prompt(session)],
        }
    }

    /// Start a fresh attempt, discarding any previous one.
    fn begin(&self, session: &mut Session, user_id: &str) -> Vec<Outgoing> {
        info!(user_id = %user_id, "Registration started");
        session.restart();
        vec![
            prompts::interrupt_keyboard(
                "📝 Let's begin! You can restart, quit or ask for help at any time.",
            )
            .into(),
            self.prompt(session),
        ]
    }

    async fn answer(&self, session: &mut Session, event: &InboundEvent) -> Vec<Outgoing> {
        use FlowState as S;

        match (session.state, &event.kind) {
            (S::Name, EventKind::Text(text)) => self.accept(session, validators::name(text)),
            (S::Phone, EventKind::Text(text)) => self.accept(session, validators::phone(text)),
            (S::DateOfBirth, EventKind::Text(text)) => {
                self.accept(session, validators::date_of_birth(text))
            }
            (S::Year, EventKind::Text(text)) => self.accept(session, validators::year_of_study(text)),
            (S::Residence | S::Locations | S::FieldOfStudy | S::Languages, EventKind::Text(text)) => {
                let result = match session.state.field() {
                    Some(field) => validators::free_text(field, text),
                    None => return self.unrecognized(session),
                };
                self.accept(session, result)
            }
            (S::Portfolio, EventKind::Text(text)) => {
                self.accept(session, validators::portfolio_text(text))
            }
            (S::Portfolio, EventKind::Attachment(attachment)) => {
                self.upload(session, attachment, &event.user_id).await
            }
            (S::CustomSkill, EventKind::Text(text)) => self.add_custom_skill(session, text),
            (S::Gender, EventKind::Choice { data, .. }) if data.control == Control::Gender => {
                self.accept_choice(session, data)
            }
            (S::Experience, EventKind::Choice { data, .. })
                if data.control == Control::Experience =>
            {
                self.accept_choice(session, data)
            }
            (S::Profession, EventKind::Choice { data, .. })
                if data.control == Control::Profession =>
            {
                self.accept_profession(session, data)
            }
            (S::Skills, EventKind::Choice { data, message_id }) if data.control == Control::Skill => {
                self.toggle_skill(session, data, *message_id)
            }
            (S::Skills, EventKind::Choice { data, .. }) if data.control == Control::Skills => {
                self.skills_action(session, data)
            }
            (S::Confirm, EventKind::Choice { data, .. }) if data.control == Control::Confirm => {
                match data.value.as_str() {
                    prompts::CONFIRM_SUBMIT => self.submit(session, &event.user_id).await,
                    prompts::CONFIRM_RESTART => {
                        self.interrupt(session, Interrupt::Restart, &event.user_id)
                    }
                    _ => self.reject(session, Rejection::NotAnOption {
                        control: data.control,
                        value: data.value.clone(),
                    }),
                }
            }
            _ => self.unrecognized(session),
        }
    }

    /// Store a validated answer for the current step and move on, or re-prompt.
    fn accept(&self, session: &mut Session, result: Result<String, Rejection>) -> Vec<Outgoing> {
        let Some(field) = session.state.field() else {
            return self.unrecognized(session);
        };
        match result {
            Ok(value) => {
                session.answers.set(field, value);
                self.advance(session)
            }
            Err(rejection) => self.reject(session, rejection),
        }
    }

    fn accept_choice(&self, session: &mut Session, data: &ChoiceData) -> Vec<Outgoing> {
        let result = validators::choice(data.control, &data.value, options_for(data.control));
        self.accept(session, result)
    }

    /// Profession decides whether year of study is asked; graduates get the
    /// sentinel so the column is always filled.
    fn accept_profession(&self, session: &mut Session, data: &ChoiceData) -> Vec<Outgoing> {
        let value = match validators::choice(data.control, &data.value, options_for(data.control)) {
            Ok(value) => value,
            Err(rejection) => return self.reject(session, rejection),
        };
        if value != STUDENT {
            session.answers.set(Field::YearOfStudy, SENTINEL);
        }
        session.answers.set(Field::Profession, value);
        self.advance(session)
    }

    fn toggle_skill(
        &self,
        session: &mut Session,
        data: &ChoiceData,
        message_id: Option<i64>,
    ) -> Vec<Outgoing> {
        if SkillSelection::is_option(&data.value) {
            session.skills.toggle(&data.value);
        } else if !data.value.starts_with('+') {
            // Custom rows ('+…') have no toggle; anything else is foreign.
            return self.reject(session, Rejection::NotAnOption {
                control: data.control,
                value: data.value.clone(),
            });
        }
        match message_id {
            Some(message_id) => vec![Outgoing::EditMarkup {
                message_id,
                keyboard: session.skills.keyboard(),
            }],
            None => vec![self.prompt(session)],
        }
    }

    fn skills_action(&self, session: &mut Session, data: &ChoiceData) -> Vec<Outgoing> {
        match data.value.as_str() {
            skills::OTHER => self.enter(session, FlowState::CustomSkill),
            skills::DONE => {
                let joined = session.skills.finalize();
                session.answers.set(Field::Skills, joined);
                self.advance(session)
            }
            _ => self.reject(session, Rejection::NotAnOption {
                control: data.control,
                value: data.value.clone(),
            }),
        }
    }

    fn add_custom_skill(&self, session: &mut Session, text: &str) -> Vec<Outgoing> {
        match validators::free_text(Field::Skills, text) {
            Ok(skill) => {
                session.skills.add_custom(&skill);
                self.enter(session, FlowState::Skills)
            }
            Err(rejection) => self.reject(session, rejection),
        }
    }

    /// Save an uploaded portfolio. The session only advances once the file
    /// store confirms the write.
    async fn upload(
        &self,
        session: &mut Session,
        attachment: &Attachment,
        user_id: &str,
    ) -> Vec<Outgoing> {
        let applicant = session
            .answers
            .get(Field::FullName)
            .unwrap_or("applicant")
            .to_string();

        let saved = match tokio::time::timeout(
            self.upload_timeout,
            self.portfolios.save(attachment, &applicant),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation: "portfolio upload".to_string(),
                timeout: self.upload_timeout,
            }),
        };

        match saved {
            Ok(path) => self.accept(session, Ok(path)),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    file_id = %attachment.file_id,
                    error = %e,
                    "Portfolio upload failed"
                );
                let reason = match e {
                    StorageError::Timeout { .. } => "upload timed out",
                    _ => "storage error",
                };
                self.reject(session, Rejection::UploadFailed {
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Append the finished record. Success ends the session; failure keeps it
    /// at the review step so the user can retry.
    async fn submit(&self, session: &mut Session, user_id: &str) -> Vec<Outgoing> {
        let record = match SubmissionRecord::from_answers(&self.schema, &session.answers) {
            Ok(record) => record,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Review reached with an incomplete record");
                return vec![OutgoingMessage::text(prompts::SUBMIT_FAILED).into()];
            }
        };

        match self.sink.append(&record).await {
            Ok(()) => {
                info!(
                    user_id = %user_id,
                    submitted_at = %record.submitted_at,
                    "Registration submitted"
                );
                session.reset_to_idle();
                vec![OutgoingMessage::text(prompts::SUBMITTED).removing_persistent().into()]
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to append submission");
                vec![
                    OutgoingMessage::text(prompts::SUBMIT_FAILED).into(),
                    self.prompt(session),
                ]
            }
        }
    }

    fn advance(&self, session: &mut Session) -> Vec<Outgoing> {
        let next = session.state.successor(&session.answers, &self.schema);
        self.enter(session, next)
    }

    fn enter(&self, session: &mut Session, next: FlowState) -> Vec<Outgoing> {
        debug_assert!(
            session.state.can_transition_to(next),
            "{} -> {} is not an edge",
            session.state,
            next
        );
        if next == FlowState::FieldOfStudy {
            session.skills.clear();
        }
        session.state = next;
        vec![self.prompt(session)]
    }

    /// Relay the rejection; steps answered with buttons also get their
    /// buttons again.
    fn reject(&self, session: &Session, rejection: Rejection) -> Vec<Outgoing> {
        debug!(state = %session.state, reason = ?rejection, "Answer rejected");
        let mut replies = vec![OutgoingMessage::text(rejection.to_string()).into()];
        let prompt = prompts::prompt_for(session, &self.schema);
        if matches!(prompt.markup, Markup::Inline(_)) {
            replies.push(prompt.into());
        }
        replies
    }

    fn unrecognized(&self, session: &Session) -> Vec<Outgoing> {
        debug!(state = %session.state, "Unrecognized event");
        vec![
            OutgoingMessage::text(prompts::UNRECOGNIZED).into(),
            self.prompt(session),
        ]
    }

    fn prompt(&self, session: &Session) -> Outgoing {
        prompts::prompt_for(session, &self.schema).into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::AttachmentKind;

    const USER: &str = "42";

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<SubmissionRecord>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SubmissionSink for MemorySink {
        async fn append(&self, record: &SubmissionRecord) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubPortfolios {
        fail: AtomicBool,
        slow: AtomicBool,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl PortfolioStore for StubPortfolios {
        async fn save(
            &self,
            attachment: &Attachment,
            applicant_name: &str,
        ) -> Result<String, StorageError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("read-only")));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(format!(
                "portfolios/{}_{}.pdf",
                applicant_name.replace(' ', "_"),
                attachment.file_id
            ))
        }
    }

    struct Harness {
        controller: DialogueController,
        sink: Arc<MemorySink>,
        portfolios: Arc<StubPortfolios>,
    }

    impl Harness {
        fn new(schema: Schema) -> Self {
            let sink = Arc::new(MemorySink::default());
            let portfolios = Arc::new(StubPortfolios::default());
            let controller = DialogueController::new(
                Arc::new(SessionStore::new()),
                sink.clone(),
                portfolios.clone(),
                schema,
            )
            .with_upload_timeout(Duration::from_millis(100));
            Self {
                controller,
                sink,
                portfolios,
            }
        }

        async fn text(&self, text: &str) -> Vec<Outgoing> {
            self.controller
                .handle(&InboundEvent::text("test", USER, text))
                .await
        }

        async fn press(&self, control: Control, value: &str) -> Vec<Outgoing> {
            self.controller
                .handle(&InboundEvent::choice(
                    "test",
                    USER,
                    ChoiceData::new(control, value),
                    Some(7),
                ))
                .await
        }

        async fn command(&self, command: Command) -> Vec<Outgoing> {
            self.controller
                .handle(&InboundEvent::command("test", USER, command))
                .await
        }

        async fn session(&self) -> Session {
            self.controller.sessions().get(USER).await.unwrap()
        }

        async fn state(&self) -> FlowState {
            self.session().await.state
        }

        /// Drive a fresh session up to `target` along the student path.
        async fn reach(&self, target: FlowState) {
            self.press(Control::Menu, prompts::MENU_START).await;
            for (state, step) in STUDENT_PATH {
                if self.state().await == target {
                    return;
                }
                assert_eq!(self.state().await, state);
                match step {
                    Step::Type(text) => self.text(text).await,
                    Step::Press(control, value) => self.press(control, value).await,
                };
            }
            assert_eq!(self.state().await, target);
        }
    }

    #[derive(Clone, Copy)]
    enum Step {
        Type(&'static str),
        Press(Control, &'static str),
    }

    const STUDENT_PATH: [(FlowState, Step); 12] = [
        (FlowState::Name, Step::Type("Jane Doe")),
        (FlowState::Phone, Step::Type("0912345678")),
        (FlowState::Gender, Step::Press(Control::Gender, "Female")),
        (FlowState::Profession, Step::Press(Control::Profession, STUDENT)),
        (FlowState::Year, Step::Type("2")),
        (FlowState::Residence, Step::Type("Downtown")),
        (FlowState::Locations, Step::Type("Downtown, Midtown")),
        (FlowState::FieldOfStudy, Step::Type("Computer Science")),
        (FlowState::Skills, Step::Press(Control::Skills, skills::DONE)),
        (FlowState::Languages, Step::Type("English, French")),
        (FlowState::Portfolio, Step::Type("None")),
        (FlowState::Experience, Step::Press(Control::Experience, "No")),
    ];

    fn texts(replies: &[Outgoing]) -> Vec<&str> {
        replies
            .iter()
            .filter_map(|o| match o {
                Outgoing::Send(msg) => Some(msg.text.as_str()),
                Outgoing::EditMarkup { .. } => None,
            })
            .collect()
    }

    const ACTIVE_STEPS: [FlowState; 15] = [
        FlowState::Name,
        FlowState::Phone,
        FlowState::Gender,
        FlowState::DateOfBirth,
        FlowState::Profession,
        FlowState::Year,
        FlowState::Residence,
        FlowState::Locations,
        FlowState::FieldOfStudy,
        FlowState::Skills,
        FlowState::CustomSkill,
        FlowState::Languages,
        FlowState::Portfolio,
        FlowState::Experience,
        FlowState::Confirm,
    ];

    /// A session parked at `state`, with a skill already toggled wherever the
    /// multi-select is open. Date of birth is only asked with its schema.
    async fn harness_at(state: FlowState) -> Harness {
        match state {
            FlowState::DateOfBirth => {
                let h = Harness::new(Schema::with_date_of_birth());
                h.press(Control::Menu, prompts::MENU_START).await;
                h.text("Jane Doe").await;
                h.text("0912345678").await;
                h.press(Control::Gender, "Female").await;
                assert_eq!(h.state().await, FlowState::DateOfBirth);
                h
            }
            FlowState::Skills | FlowState::CustomSkill => {
                let h = Harness::new(Schema::standard());
                h.reach(FlowState::Skills).await;
                h.press(Control::Skill, "Music").await;
                if state == FlowState::CustomSkill {
                    h.press(Control::Skills, skills::OTHER).await;
                    assert_eq!(h.state().await, FlowState::CustomSkill);
                }
                h
            }
            _ => {
                let h = Harness::new(Schema::standard());
                h.reach(state).await;
                h
            }
        }
    }

    #[tokio::test]
    async fn start_shows_menu_without_session() {
        let h = Harness::new(Schema::standard());
        let replies = h.command(Command::Start).await;
        assert_eq!(texts(&replies), vec![prompts::WELCOME]);
        assert!(!h.session().await.is_active());
    }

    #[tokio::test]
    async fn idle_text_gets_hint() {
        let h = Harness::new(Schema::standard());
        let replies = h.text("hello").await;
        assert_eq!(texts(&replies), vec![prompts::IDLE_HINT]);
        assert_eq!(h.state().await, FlowState::Idle);
    }

    #[tokio::test]
    async fn begin_enters_name_with_interrupt_keyboard() {
        let h = Harness::new(Schema::standard());
        let replies = h.press(Control::Menu, prompts::MENU_START).await;
        assert_eq!(h.state().await, FlowState::Name);
        assert!(matches!(
            &replies[0],
            Outgoing::Send(OutgoingMessage { markup: Markup::Persistent(_), .. })
        ));
        assert!(texts(&replies)[1].contains("Full Name"));
    }

    #[tokio::test]
    async fn invalid_phone_reprompts_without_mutation() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Phone).await;
        let before = h.session().await.answers;

        for bad in ["12345678", "091234567", "09123456789"] {
            let replies = h.text(bad).await;
            assert_eq!(texts(&replies), vec![Rejection::InvalidPhone.to_string()]);
            assert_eq!(h.state().await, FlowState::Phone);
            assert_eq!(h.session().await.answers, before);
        }

        h.text("0912345678").await;
        assert_eq!(h.state().await, FlowState::Gender);
        assert_eq!(
            h.session().await.answers.get(Field::PhoneNumber),
            Some("0912345678")
        );
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Name).await;
        h.text("   ").await;
        assert_eq!(h.state().await, FlowState::Name);
        assert!(h.session().await.answers.is_empty());
    }

    #[tokio::test]
    async fn choice_from_wrong_control_is_unrecognized() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Gender).await;

        let replies = h.press(Control::Profession, "Female").await;
        assert_eq!(texts(&replies)[0], prompts::UNRECOGNIZED);
        assert_eq!(h.state().await, FlowState::Gender);

        // Typed text where a button is expected.
        h.text("Female").await;
        assert_eq!(h.state().await, FlowState::Gender);
        assert!(!h.session().await.answers.contains(Field::Gender));
    }

    #[tokio::test]
    async fn choice_outside_option_set_rejected() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Gender).await;
        let replies = h.press(Control::Gender, "Other").await;
        assert_eq!(h.state().await, FlowState::Gender);
        // Rejection plus the buttons again.
        assert_eq!(replies.len(), 2);
    }

    #[tokio::test]
    async fn graduate_gets_year_sentinel() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Profession).await;
        h.press(Control::Profession, "Graduate").await;
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Residence);
        assert_eq!(session.answers.get(Field::YearOfStudy), Some(SENTINEL));
    }

    #[tokio::test]
    async fn student_must_give_year() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Profession).await;
        h.press(Control::Profession, STUDENT).await;
        assert_eq!(h.state().await, FlowState::Year);

        h.text("  ").await;
        assert_eq!(h.state().await, FlowState::Year);
        assert!(!h.session().await.answers.contains(Field::YearOfStudy));

        h.text("3").await;
        assert_eq!(h.state().await, FlowState::Residence);
        assert_eq!(h.session().await.answers.get(Field::YearOfStudy), Some("3"));
    }

    #[tokio::test]
    async fn dob_schema_asks_for_date() {
        let h = Harness::new(Schema::with_date_of_birth());
        h.press(Control::Menu, prompts::MENU_START).await;
        h.text("Jane").await;
        h.text("0912345678").await;
        h.press(Control::Gender, "Female").await;
        assert_eq!(h.state().await, FlowState::DateOfBirth);

        h.text("31/02/2001").await;
        assert_eq!(h.state().await, FlowState::DateOfBirth);
        h.text("05/11/2001").await;
        assert_eq!(h.state().await, FlowState::Profession);
        assert_eq!(
            h.session().await.answers.get(Field::DateOfBirth),
            Some("05/11/2001")
        );
    }

    #[tokio::test]
    async fn skill_toggle_redraws_in_place() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Skills).await;

        let replies = h.press(Control::Skill, "Music").await;
        assert_eq!(h.state().await, FlowState::Skills);
        let Outgoing::EditMarkup { message_id, keyboard } = &replies[0] else {
            panic!("expected a redraw, got {replies:?}");
        };
        assert_eq!(*message_id, 7);
        assert!(keyboard
            .find(&ChoiceData::new(Control::Skill, "Music"))
            .is_some_and(|b| b.label.starts_with("✅")));

        // Toggling twice restores the selection.
        h.press(Control::Skill, "Music").await;
        assert!(h.session().await.skills.is_empty());
        assert!(!h.session().await.answers.contains(Field::Skills));
    }

    #[tokio::test]
    async fn skill_toggle_without_message_id_resends_list() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Skills).await;
        let replies = h
            .controller
            .handle(&InboundEvent::choice(
                "test",
                USER,
                ChoiceData::new(Control::Skill, "Robotics"),
                None,
            ))
            .await;
        assert!(matches!(&replies[0], Outgoing::Send(msg) if matches!(msg.markup, Markup::Inline(_))));
        assert!(h.session().await.skills.contains("Robotics"));
    }

    #[tokio::test]
    async fn custom_skill_round_trip() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Skills).await;

        h.press(Control::Skills, skills::OTHER).await;
        assert_eq!(h.state().await, FlowState::CustomSkill);

        h.text("   ").await;
        assert_eq!(h.state().await, FlowState::CustomSkill);

        h.text("Chess").await;
        assert_eq!(h.state().await, FlowState::Skills);
        assert!(h.session().await.skills.contains("Chess"));

        // The custom row has no toggle.
        h.press(Control::Skill, "+Chess").await;
        assert!(h.session().await.skills.contains("Chess"));

        h.press(Control::Skill, "Music").await;
        h.press(Control::Skills, skills::DONE).await;
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Languages);
        assert_eq!(session.answers.get(Field::Skills), Some("Music, Chess"));
    }

    #[tokio::test]
    async fn done_with_nothing_selected_is_empty() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Skills).await;
        h.press(Control::Skills, skills::DONE).await;
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Languages);
        assert_eq!(session.answers.get(Field::Skills), Some(""));
    }

    #[tokio::test]
    async fn help_from_every_state_does_not_mutate() {
        for state in ACTIVE_STEPS {
            let h = harness_at(state).await;
            let before = h.session().await;

            let replies = h.text("help").await;
            assert_eq!(texts(&replies)[0], prompts::HELP, "help at {state}");

            let after = h.session().await;
            assert_eq!(after.state, before.state);
            assert_eq!(after.answers, before.answers);
            assert_eq!(after.skills, before.skills);
        }
    }

    #[tokio::test]
    async fn restart_from_every_state_clears_everything() {
        for state in ACTIVE_STEPS {
            let h = harness_at(state).await;
            h.text("Restart").await;
            let session = h.session().await;
            assert_eq!(session.state, FlowState::Name, "restart at {state}");
            assert!(session.answers.is_empty());
            assert!(session.skills.is_empty());
        }
    }

    #[tokio::test]
    async fn quit_from_every_state_goes_idle() {
        for state in ACTIVE_STEPS {
            let h = harness_at(state).await;
            let replies = h.command(Command::Quit).await;
            assert_eq!(texts(&replies), vec![prompts::CANCELLED]);
            let session = h.session().await;
            assert!(!session.is_active(), "quit at {state}");
            assert!(session.answers.is_empty());
        }
    }

    #[tokio::test]
    async fn quit_while_idle() {
        let h = Harness::new(Schema::standard());
        let replies = h.text("quit").await;
        assert_eq!(texts(&replies), vec![prompts::NOTHING_TO_CANCEL]);
    }

    #[tokio::test]
    async fn portfolio_upload_stores_path() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Portfolio).await;
        let attachment = Attachment {
            kind: AttachmentKind::Document,
            file_id: "doc1".into(),
            unique_id: None,
            file_name: Some("cv.pdf".into()),
        };
        h.controller
            .handle(&InboundEvent::attachment("test", USER, attachment))
            .await;
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Experience);
        assert_eq!(
            session.answers.get(Field::Portfolio),
            Some("portfolios/Jane_Doe_doc1.pdf")
        );
        assert_eq!(h.portfolios.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn portfolio_upload_failure_reprompts() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Portfolio).await;
        h.portfolios.fail.store(true, Ordering::SeqCst);

        let attachment = Attachment {
            kind: AttachmentKind::Photo,
            file_id: "p1".into(),
            unique_id: Some("u1".into()),
            file_name: None,
        };
        let replies = h
            .controller
            .handle(&InboundEvent::attachment("test", USER, attachment))
            .await;
        assert!(texts(&replies)[0].contains("Couldn't save your file"));
        assert_eq!(h.state().await, FlowState::Portfolio);
        assert!(!h.session().await.answers.contains(Field::Portfolio));
    }

    #[tokio::test]
    async fn portfolio_upload_timeout_reprompts() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Portfolio).await;
        h.portfolios.slow.store(true, Ordering::SeqCst);

        let attachment = Attachment {
            kind: AttachmentKind::Document,
            file_id: "doc1".into(),
            unique_id: None,
            file_name: None,
        };
        let replies = h
            .controller
            .handle(&InboundEvent::attachment("test", USER, attachment))
            .await;
        assert!(texts(&replies)[0].contains("timed out"));
        assert_eq!(h.state().await, FlowState::Portfolio);
    }

    #[tokio::test]
    async fn attachment_outside_portfolio_is_unrecognized() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Languages).await;
        let attachment = Attachment {
            kind: AttachmentKind::Photo,
            file_id: "p1".into(),
            unique_id: None,
            file_name: None,
        };
        let replies = h
            .controller
            .handle(&InboundEvent::attachment("test", USER, attachment))
            .await;
        assert_eq!(texts(&replies)[0], prompts::UNRECOGNIZED);
        assert_eq!(h.portfolios.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_appends_once_and_resets() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Confirm).await;

        let replies = h.press(Control::Confirm, prompts::CONFIRM_SUBMIT).await;
        assert_eq!(texts(&replies), vec![prompts::SUBMITTED]);
        assert!(!h.session().await.is_active());

        // A second tap lands on an idle session.
        h.press(Control::Confirm, prompts::CONFIRM_SUBMIT).await;
        assert_eq!(h.sink.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_append_keeps_session_for_retry() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Confirm).await;
        h.sink.fail.store(true, Ordering::SeqCst);

        let replies = h.press(Control::Confirm, prompts::CONFIRM_SUBMIT).await;
        assert_eq!(texts(&replies)[0], prompts::SUBMIT_FAILED);
        assert!(!texts(&replies).contains(&prompts::SUBMITTED));
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Confirm);
        assert_eq!(session.answers.get(Field::FullName), Some("Jane Doe"));
        assert!(h.sink.rows.lock().unwrap().is_empty());

        h.sink.fail.store(false, Ordering::SeqCst);
        h.press(Control::Confirm, prompts::CONFIRM_SUBMIT).await;
        assert_eq!(h.sink.rows.lock().unwrap().len(), 1);
        assert!(!h.session().await.is_active());
    }

    #[tokio::test]
    async fn confirm_restart_button_restarts() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Confirm).await;
        h.press(Control::Confirm, prompts::CONFIRM_RESTART).await;
        let session = h.session().await;
        assert_eq!(session.state, FlowState::Name);
        assert!(session.answers.is_empty());
        assert!(h.sink.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_command_mid_flow_is_unrecognized() {
        let h = Harness::new(Schema::standard());
        h.reach(FlowState::Residence).await;
        let replies = h.command(Command::Start).await;
        assert_eq!(texts(&replies)[0], prompts::UNRECOGNIZED);
        assert_eq!(h.state().await, FlowState::Residence);
    }

    #[test]
    fn interrupt_keywords() {
        assert_eq!(Interrupt::from_text("restart"), Some(Interrupt::Restart));
        assert_eq!(Interrupt::from_text(" QUIT "), Some(Interrupt::Quit));
        assert_eq!(Interrupt::from_text("/help"), Some(Interrupt::Help));
        assert_eq!(Interrupt::from_text("helpful"), None);
        assert_eq!(Interrupt::from_text("please restart"), None);
    }
}
