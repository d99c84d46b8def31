use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use teloxide::types::ChatId;

pub mod errors;
pub mod types;

pub use errors::BackendError;
pub use types::{UserPatch, UserRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait UserBackend: Send + Sync {
    async fn create(&self, record: &UserRecord) -> Result<(), BackendError>;
    async fn fetch(&self, chat_id: ChatId) -> Result<Option<UserRecord>, BackendError>;
    async fn update(&self, chat_id: ChatId, patch: &UserPatch) -> Result<(), BackendError>;
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    // Turns a non-2xx response into a Rejected error carrying the backend's
    // own message when the body has one.
    async fn rejection(response: reqwest::Response) -> BackendError {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body["message"].as_str().map(|m| m.to_string()))
            .unwrap_or_else(|| format!("request failed with status {}", status));

        BackendError::Rejected(message)
    }
}

#[async_trait]
impl UserBackend for BackendClient {
    async fn create(&self, record: &UserRecord) -> Result<(), BackendError> {
        let response = self
            .client
            .post(format!("{}/createUser", self.base_url))
            .json(record)
            .send()
            .await
            .map_err(|e| BackendError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }

    async fn fetch(&self, chat_id: ChatId) -> Result<Option<UserRecord>, BackendError> {
        let response = self
            .client
            .get(format!("{}/getUser/{}", self.base_url, chat_id))
            .send()
            .await
            .map_err(|e| BackendError::RequestError(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let record: UserRecord = response
            .json()
            .await
            .map_err(|e| BackendError::RequestError(e.to_string()))?;

        Ok(Some(record))
    }

    async fn update(&self, chat_id: ChatId, patch: &UserPatch) -> Result<(), BackendError> {
        let response = self
            .client
            .patch(format!("{}/updateUser/{}", self.base_url, chat_id))
            .json(patch)
            .send()
            .await
            .map_err(|e| BackendError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn sample_record() -> UserRecord {
        UserRecord {
            chat_id: ChatId(42),
            name: "Ada".to_string(),
            email: Some("ada@example.com".to_string()),
            phone: "9876543210".to_string(),
            birthday_day: 31,
            birthday_month: 2,
        }
    }

    #[tokio::test]
    async fn create_posts_camel_case_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/createUser")
            .match_body(Matcher::Json(json!({
                "chatId": 42,
                "name": "Ada",
                "email": "ada@example.com",
                "phone": "9876543210",
                "birthdayDay": 31,
                "birthdayMonth": 2,
            })))
            .with_status(200)
            .create_async()
            .await;

        let backend = BackendClient::new(&server.url()).unwrap();
        let result = backend.create(&sample_record()).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_surfaces_backend_message_on_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/createUser")
            .with_status(500)
            .with_body(r#"{"message":"user already exists"}"#)
            .create_async()
            .await;

        let backend = BackendClient::new(&server.url()).unwrap();
        let result = backend.create(&sample_record()).await;

        assert!(
            matches!(result, Err(BackendError::Rejected(ref m)) if m == "user already exists")
        );
    }

    #[tokio::test]
    async fn fetch_returns_none_on_404() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/getUser/42")
            .with_status(404)
            .create_async()
            .await;

        let backend = BackendClient::new(&server.url()).unwrap();
        let result = backend.fetch(ChatId(42)).await.unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn fetch_parses_existing_record() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/getUser/42")
            .with_status(200)
            .with_body(
                json!({
                    "chatId": 42,
                    "name": "Ada",
                    "email": null,
                    "phone": "9876543210",
                    "birthdayDay": 25,
                    "birthdayMonth": 12,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let backend = BackendClient::new(&server.url()).unwrap();
        let record = backend.fetch(ChatId(42)).await.unwrap().unwrap();

        assert_eq!(record.name, "Ada");
        assert_eq!(record.email, None);
        assert_eq!(record.phone, "9876543210");
    }

    #[tokio::test]
    async fn update_sends_only_the_patched_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/updateUser/42")
            .match_body(Matcher::Json(json!({ "email": null })))
            .with_status(200)
            .create_async()
            .await;

        let backend = BackendClient::new(&server.url()).unwrap();
        let result = backend.update(ChatId(42), &UserPatch::email(None)).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }
}
