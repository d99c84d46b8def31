use crate::backend::UserBackend;
use crate::communication::notifier::{build_bot, Notify, TelegramNotifier};
use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, ServiceWithErrorSender};
use crate::registration::flow::{FlowOptions, InboundEvent, RegistrationFlow};
use crate::registration::session::InMemorySessions;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

const LIVENESS_MESSAGE: &str = "Telegram bot webhook running 🚀";

#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<RegistrationFlow>,
    pub notifier: Arc<dyn Notify>,
}

pub struct WebhookService {
    port: u16,
    state: AppState,
}

#[async_trait]
impl ServiceWithErrorSender for WebhookService {
    type Context = Context;

    async fn new(context: Context, error_sender: mpsc::Sender<String>) -> Self {
        let config = &context.config;
        let bot = build_bot(&config.bot_token, &config.telegram_api_url);
        let notifier: Arc<dyn Notify> =
            Arc::new(TelegramNotifier::new(bot, error_sender.clone()));
        let sessions = Arc::new(InMemorySessions::new(Duration::from_secs(
            config.session_ttl_secs,
        )));
        let backend: Arc<dyn UserBackend> = context.backend.clone();
        let options = FlowOptions {
            allow_skip_email: config.skip_email_enabled,
            update_mode: config.update_mode_enabled,
        };
        let flow = RegistrationFlow::new(
            sessions,
            backend,
            notifier.clone(),
            options,
            error_sender,
        );

        Self {
            port: config.webhook_port,
            state: AppState {
                flow: Arc::new(flow),
                notifier,
            },
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        let app = router(self.state);

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .map_err(|e| ServiceManagerError::new(&format!("Failed to bind port: {}", e)))?;

        info!("Webhook server running on port {}", self.port);

        axum::serve(listener, app)
            .await
            .map_err(|e| ServiceManagerError::new(&format!("HTTP server error: {}", e)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook", get(liveness).post(webhook_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

// The subset of a Telegram update this bot cares about.
#[derive(Debug, Deserialize)]
struct WebhookUpdate {
    #[serde(default)]
    message: Option<IncomingMessage>,
    #[serde(default)]
    callback_query: Option<IncomingCallback>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: IncomingChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingChat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct IncomingCallback {
    id: String,
    from: CallbackSender,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackSender {
    id: ChatId,
}

async fn webhook_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if body.is_empty() {
        return (StatusCode::OK, "No body received");
    }

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to parse webhook body");
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // A shape we don't recognize is not a delivery failure; anything but a
    // 200 here would make Telegram retry the update.
    let update: WebhookUpdate = match serde_json::from_value(value) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, "Discarding update with unexpected shape");
            return (StatusCode::OK, "OK");
        }
    };

    if let Some(callback) = update.callback_query {
        if let Some(data) = callback.data {
            state
                .flow
                .handle(InboundEvent::Choice {
                    chat: callback.from.id,
                    data,
                })
                .await;
        }
        state.notifier.ack_choice(&callback.id).await;
        return (StatusCode::OK, "OK");
    }

    if let Some(message) = update.message {
        if let Some(text) = message.text {
            state
                .flow
                .handle(InboundEvent::Message {
                    chat: message.chat.id,
                    text,
                })
                .await;
        }
    }

    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_plain_message_update() {
        let update: WebhookUpdate = serde_json::from_value(json!({
            "message": { "chat": { "id": 42 }, "text": "/start" }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.chat.id, ChatId(42));
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn parses_a_callback_update() {
        let update: WebhookUpdate = serde_json::from_value(json!({
            "callback_query": { "id": "cb1", "from": { "id": 42 }, "data": "no_email" }
        }))
        .unwrap();

        let callback = update.callback_query.unwrap();
        assert_eq!(callback.id, "cb1");
        assert_eq!(callback.from.id, ChatId(42));
        assert_eq!(callback.data.as_deref(), Some("no_email"));
    }

    #[test]
    fn tolerates_extra_fields_and_missing_text() {
        let update: WebhookUpdate = serde_json::from_value(json!({
            "update_id": 123456,
            "message": { "message_id": 9, "chat": { "id": 42, "type": "private" } }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.text, None);
    }

    #[test]
    fn rejects_a_message_without_a_chat_id() {
        let result = serde_json::from_value::<WebhookUpdate>(json!({
            "message": { "chat": {}, "text": "hi" }
        }));

        assert!(result.is_err());
    }
}
