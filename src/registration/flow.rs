use crate::backend::{UserBackend, UserPatch};
use crate::communication::error_handler::backend_error_to_user_message;
use crate::communication::notifier::{Choice, Notify};
use crate::registration::session::{ChatLocks, Field, Mode, Session, SessionStore, Step};
use crate::registration::validators::{is_valid_email, is_valid_phone, parse_birthday};
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub const START_COMMAND: &str = "/start";
pub const NO_EMAIL_CALLBACK: &str = "no_email";

// Typing the button label instead of tapping it counts as the same waiver.
const NO_EMAIL_TEXT: &str = "No email";

const NAME_PROMPT: &str = "👋 Welcome! What's your *name*?";
const NAME_ERROR: &str = "❌ Name can't be empty. What's your *name*?";
const EMAIL_PROMPT: &str = "📧 Please enter your *email* (e.g., name@example.com):";
const PHONE_PROMPT: &str = "📱 Please enter your *phone number* (digits only, e.g., 9876543210):";
const PHONE_ERROR: &str = "❌ Invalid phone number. Enter digits only (7-15 digits, e.g., 9876543210):";
const BIRTHDAY_PROMPT: &str =
    "🎂 Enter your *birthday* in `DD-MM` format (e.g., 25-12 for 25th December):";
const BIRTHDAY_ERROR: &str = "❌ Invalid format. Enter your birthday in `DD-MM` format (e.g., 25-12):";
const SAVED_MESSAGE: &str = "✅ Your details have been saved. Thank you!";
const FIELD_MENU_PROMPT: &str = "🔧 You're already registered! What would you like to update?";
const RETRY_MESSAGE: &str = "⚠️ Something went wrong. Please try /start again.";

// The near-duplicate webhook handlers of this bot's lineage differ only in
// these two switches; everything else is the same machine.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub allow_skip_email: bool,
    pub update_mode: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            allow_skip_email: true,
            update_mode: true,
        }
    }
}

// A webhook update reduced to what the state machine cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message { chat: ChatId, text: String },
    Choice { chat: ChatId, data: String },
}

pub struct RegistrationFlow {
    sessions: Arc<dyn SessionStore>,
    backend: Arc<dyn UserBackend>,
    notifier: Arc<dyn Notify>,
    options: FlowOptions,
    locks: ChatLocks,
    error_sender: mpsc::Sender<String>,
}

impl RegistrationFlow {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        backend: Arc<dyn UserBackend>,
        notifier: Arc<dyn Notify>,
        options: FlowOptions,
        error_sender: mpsc::Sender<String>,
    ) -> Self {
        Self {
            sessions,
            backend,
            notifier,
            options,
            locks: ChatLocks::new(),
            error_sender,
        }
    }

    // Entry point for every classified webhook event. Events for the same
    // chat are serialized here; concurrent deliveries would otherwise race
    // on the session's read-modify-write.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message { chat, text } => {
                let _guard = self.locks.acquire(chat).await;
                self.on_message(chat, text.trim()).await;
            }
            InboundEvent::Choice { chat, data } => {
                let _guard = self.locks.acquire(chat).await;
                self.on_choice(chat, &data).await;
            }
        }
    }

    async fn on_message(&self, chat: ChatId, text: &str) {
        if text == START_COMMAND {
            self.start(chat).await;
            return;
        }

        let Some(session) = self.sessions.get(chat) else {
            debug!(chat_id = %chat, "Ignoring message for chat with no active session");
            return;
        };

        match session.step.clone() {
            Step::AskName => self.collect_name(chat, session, text).await,
            Step::AskEmail => self.collect_email(chat, session, text).await,
            Step::AskPhone => self.collect_phone(chat, session, text).await,
            Step::AskBirthday => self.collect_birthday(chat, session, text).await,
            Step::FieldMenu => self.send_field_menu(chat, &session).await,
            Step::AwaitingFieldUpdate(field) => self.collect_field_update(chat, field, text).await,
        }
    }

    async fn on_choice(&self, chat: ChatId, data: &str) {
        let Some(mut session) = self.sessions.get(chat) else {
            debug!(chat_id = %chat, "Ignoring choice for chat with no active session");
            return;
        };

        match (session.step.clone(), data) {
            (Step::AskEmail, NO_EMAIL_CALLBACK) if self.options.allow_skip_email => {
                session.draft.email = None;
                session.step = Step::AskPhone;
                self.sessions.set(chat, session);
                self.notifier.prompt(chat, PHONE_PROMPT, &[]).await;
            }
            (Step::AwaitingFieldUpdate(Field::Email), NO_EMAIL_CALLBACK)
                if self.options.allow_skip_email =>
            {
                self.apply_update(chat, Field::Email, UserPatch::email(None))
                    .await;
            }
            (Step::FieldMenu, data) => {
                let Some(field) = Field::from_callback_data(data) else {
                    debug!(chat_id = %chat, data, "Ignoring unknown menu choice");
                    return;
                };
                session.step = Step::AwaitingFieldUpdate(field);
                self.sessions.set(chat, session);
                self.prompt_for_field(chat, field).await;
            }
            _ => {
                debug!(chat_id = %chat, data, "Ignoring choice with no matching transition");
            }
        }
    }

    // A start trigger always resets: last-writer-wins on the session.
    async fn start(&self, chat: ChatId) {
        if self.options.update_mode {
            match self.backend.fetch(chat).await {
                Ok(Some(record)) => {
                    let session = Session::updating(record);
                    self.sessions.set(chat, session.clone());
                    self.send_field_menu(chat, &session).await;
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(chat_id = %chat, error = %e, "Failed to look up existing user");
                    let _ = self.error_sender.try_send(format!(
                        "❌ User lookup failed\n\nChat: {}\nError: {}",
                        chat, e
                    ));
                    self.notifier.prompt(chat, RETRY_MESSAGE, &[]).await;
                    return;
                }
            }
        }

        self.sessions.set(chat, Session::creating());
        self.notifier.prompt(chat, NAME_PROMPT, &[]).await;
    }

    async fn collect_name(&self, chat: ChatId, mut session: Session, text: &str) {
        if text.is_empty() {
            self.notifier.prompt(chat, NAME_ERROR, &[]).await;
            return;
        }

        session.draft.name = Some(text.to_string());
        session.step = Step::AskEmail;
        self.sessions.set(chat, session);
        self.notifier
            .prompt(chat, EMAIL_PROMPT, &self.email_choices())
            .await;
    }

    async fn collect_email(&self, chat: ChatId, mut session: Session, text: &str) {
        let email = if self.options.allow_skip_email && text == NO_EMAIL_TEXT {
            None
        } else if is_valid_email(text) {
            Some(text.to_string())
        } else {
            self.notifier
                .prompt(chat, self.invalid_email_message(), &self.email_choices())
                .await;
            return;
        };

        session.draft.email = email;
        session.step = Step::AskPhone;
        self.sessions.set(chat, session);
        self.notifier.prompt(chat, PHONE_PROMPT, &[]).await;
    }

    async fn collect_phone(&self, chat: ChatId, mut session: Session, text: &str) {
        if !is_valid_phone(text) {
            self.notifier.prompt(chat, PHONE_ERROR, &[]).await;
            return;
        }

        session.draft.phone = Some(text.to_string());
        session.step = Step::AskBirthday;
        self.sessions.set(chat, session);
        self.notifier.prompt(chat, BIRTHDAY_PROMPT, &[]).await;
    }

    async fn collect_birthday(&self, chat: ChatId, mut session: Session, text: &str) {
        let Some((day, month)) = parse_birthday(text) else {
            self.notifier.prompt(chat, BIRTHDAY_ERROR, &[]).await;
            return;
        };

        session.draft.birthday_day = Some(day);
        session.draft.birthday_month = Some(month);
        self.sessions.set(chat, session.clone());

        let Some(record) = session.draft.into_record(chat) else {
            // A session only reaches AskBirthday with name and phone already
            // collected; anything else is a corrupted session.
            error!(chat_id = %chat, "Session reached AskBirthday with an incomplete draft");
            self.sessions.delete(chat);
            self.notifier.prompt(chat, RETRY_MESSAGE, &[]).await;
            return;
        };

        match self.backend.create(&record).await {
            Ok(()) => {
                self.notifier.prompt(chat, SAVED_MESSAGE, &[]).await;
                self.sessions.delete(chat);
            }
            Err(e) => {
                error!(chat_id = %chat, error = %e, "Failed to save user");
                let _ = self.error_sender.try_send(format!(
                    "❌ Registration save failed\n\nChat: {}\nError: {}",
                    chat, e
                ));
                self.notifier
                    .prompt(chat, &format!("⚠️ {}", backend_error_to_user_message(&e)), &[])
                    .await;
                // Session stays at AskBirthday so resending the answer
                // retries the save.
            }
        }
    }

    async fn collect_field_update(&self, chat: ChatId, field: Field, text: &str) {
        let patch = match field {
            Field::Name => {
                if text.is_empty() {
                    self.notifier.prompt(chat, NAME_ERROR, &[]).await;
                    return;
                }
                UserPatch::name(text.to_string())
            }
            Field::Email => {
                if self.options.allow_skip_email && text == NO_EMAIL_TEXT {
                    UserPatch::email(None)
                } else if is_valid_email(text) {
                    UserPatch::email(Some(text.to_string()))
                } else {
                    self.notifier
                        .prompt(chat, self.invalid_email_message(), &self.email_choices())
                        .await;
                    return;
                }
            }
            Field::Phone => {
                if !is_valid_phone(text) {
                    self.notifier.prompt(chat, PHONE_ERROR, &[]).await;
                    return;
                }
                UserPatch::phone(text.to_string())
            }
            Field::Birthday => {
                let Some((day, month)) = parse_birthday(text) else {
                    self.notifier.prompt(chat, BIRTHDAY_ERROR, &[]).await;
                    return;
                };
                UserPatch::birthday(day, month)
            }
        };

        self.apply_update(chat, field, patch).await;
    }

    async fn apply_update(&self, chat: ChatId, field: Field, patch: UserPatch) {
        match self.backend.update(chat, &patch).await {
            Ok(()) => {
                self.notifier
                    .prompt(
                        chat,
                        &format!(
                            "✅ Your {} has been updated. Thank you!",
                            field.label().to_lowercase()
                        ),
                        &[],
                    )
                    .await;
                self.sessions.delete(chat);
            }
            Err(e) => {
                error!(chat_id = %chat, error = %e, "Failed to update user");
                let _ = self.error_sender.try_send(format!(
                    "❌ Profile update failed\n\nChat: {}\nError: {}",
                    chat, e
                ));
                self.notifier
                    .prompt(chat, &format!("⚠️ {}", backend_error_to_user_message(&e)), &[])
                    .await;
                // Session is retained so the user can resend the value.
            }
        }
    }

    async fn send_field_menu(&self, chat: ChatId, session: &Session) {
        let text = match &session.mode {
            Mode::Updating(record) => format!(
                "🔧 You're already registered, *{}*! What would you like to update?",
                record.name
            ),
            Mode::Creating => FIELD_MENU_PROMPT.to_string(),
        };
        let choices: Vec<Choice> = Field::ALL
            .iter()
            .map(|field| Choice::new(field.label(), field.callback_data()))
            .collect();

        self.notifier.prompt(chat, &text, &choices).await;
    }

    async fn prompt_for_field(&self, chat: ChatId, field: Field) {
        match field {
            Field::Name => self.notifier.prompt(chat, "✏️ Enter your new *name*:", &[]).await,
            Field::Email => {
                self.notifier
                    .prompt(chat, EMAIL_PROMPT, &self.email_choices())
                    .await
            }
            Field::Phone => self.notifier.prompt(chat, PHONE_PROMPT, &[]).await,
            Field::Birthday => self.notifier.prompt(chat, BIRTHDAY_PROMPT, &[]).await,
        }
    }

    fn email_choices(&self) -> Vec<Choice> {
        if self.options.allow_skip_email {
            vec![Choice::new(NO_EMAIL_TEXT, NO_EMAIL_CALLBACK)]
        } else {
            Vec::new()
        }
    }

    fn invalid_email_message(&self) -> &'static str {
        if self.options.allow_skip_email {
            "❌ Invalid email format. Enter a valid email or click 'No email':"
        } else {
            "❌ Invalid email format. Enter a valid email (e.g., name@example.com):"
        }
    }
}
