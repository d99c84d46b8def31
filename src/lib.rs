pub mod backend;
pub mod communication;
pub mod configuration;
pub mod core;
pub mod registration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config Error:{0}")]
    ConfigError(String),

    #[error("Service error")]
    ServiceError,
}
