use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tokio::sync::mpsc;
use tracing::error;
use url::Url;

// An inline option offered with a prompt; selecting it comes back through
// the webhook as a choice callback carrying `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: String,
    pub data: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

// Fire-and-forget messaging. Delivery failures are logged and alerted,
// never surfaced to the state machine.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn prompt(&self, chat: ChatId, text: &str, choices: &[Choice]);
    async fn ack_choice(&self, callback_id: &str);
}

pub fn build_bot(token: &str, api_url: &str) -> Bot {
    let bot = Bot::new(token.to_string());
    match Url::parse(api_url) {
        Ok(url) => bot.set_api_url(url),
        Err(e) => {
            error!(api_url, error = %e, "Invalid Telegram API URL, using the default");
            bot
        }
    }
}

pub struct TelegramNotifier {
    bot: Bot,
    error_sender: mpsc::Sender<String>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, error_sender: mpsc::Sender<String>) -> Self {
        Self { bot, error_sender }
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn prompt(&self, chat: ChatId, text: &str, choices: &[Choice]) {
        let request = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Markdown);

        let request = if choices.is_empty() {
            request
        } else {
            let row: Vec<InlineKeyboardButton> = choices
                .iter()
                .map(|choice| {
                    InlineKeyboardButton::callback(choice.label.clone(), choice.data.clone())
                })
                .collect();
            request.reply_markup(InlineKeyboardMarkup::new(vec![row]))
        };

        if let Err(e) = request.await {
            error!(chat_id = %chat, error = %e, "Failed to send Telegram message");
            let _ = self.error_sender.try_send(format!(
                "❌ Error sending telegram message\n\nChat: {}\nError: {}",
                chat, e
            ));
        }
    }

    async fn ack_choice(&self, callback_id: &str) {
        if let Err(e) = self.bot.answer_callback_query(callback_id.to_string()).await {
            error!(callback_id, error = %e, "Failed to answer callback query");
        }
    }
}
