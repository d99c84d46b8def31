use dotenvy::dotenv;
use regbot::communication::error_alert::ErrorAlertService;
use regbot::communication::webhook::WebhookService;
use regbot::configuration::Context;
use regbot::core::ServiceManager;
use regbot::AppError;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let context = Context::new().map_err(|e| AppError::ConfigError(e.to_string()))?;

    let log_level = Level::from_str(&context.config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .init();
    tracing::info!("Starting registration bot");

    let mut service_manager = ServiceManager::new(context);
    let (error_sender, error_receiver) = mpsc::channel::<String>(100);
    let shared_error_receiver = Arc::new(Mutex::new(error_receiver));

    service_manager.spawn_with_error_receiver::<ErrorAlertService>(shared_error_receiver);
    service_manager.spawn_with_error_sender::<WebhookService>(error_sender);

    service_manager
        .wait()
        .await
        .map_err(|_| AppError::ServiceError)
}
