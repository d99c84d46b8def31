use crate::communication::notifier::build_bot;
use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, ServiceWithErrorReceiver};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

// Forwards operator-facing error reports to the configured Telegram
// channel. Without a configured channel the reports are only logged.
pub struct ErrorAlertService {
    bot: Bot,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    error_channel_id: Option<i64>,
}

#[async_trait]
impl ServiceWithErrorReceiver for ErrorAlertService {
    type Context = Context;

    async fn new(context: Context, error_receiver: Arc<Mutex<mpsc::Receiver<String>>>) -> Self {
        let bot = build_bot(
            &context.config.bot_token,
            &context.config.telegram_api_url,
        );

        Self {
            bot,
            receiver: error_receiver,
            error_channel_id: context.config.error_channel_id,
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        loop {
            let mut rx = self.receiver.lock().await;
            let Some(message) = rx.recv().await else {
                return Ok(());
            };
            drop(rx);

            let Some(channel_id) = self.error_channel_id else {
                warn!(alert = %message, "Error alert (no error channel configured)");
                continue;
            };

            if let Err(e) = self.bot.send_message(ChatId(channel_id), &message).await {
                error!(error = %e, "Failed to send error alert");
            }
        }
    }
}
