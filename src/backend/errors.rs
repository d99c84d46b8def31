use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP client error: {0}")]
    ClientError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Backend rejected request: {0}")]
    Rejected(String),
}
