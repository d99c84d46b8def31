use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

// The durable user entity held by the backend, keyed by chat id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub chat_id: ChatId,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub birthday_day: u8,
    pub birthday_month: u8,
}

// Partial update sent to the backend. Absent fields are left untouched;
// `email: Some(None)` serializes as an explicit null and clears the
// stored email.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday_day: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday_month: Option<u8>,
}

impl UserPatch {
    pub fn name(value: String) -> Self {
        Self {
            name: Some(value),
            ..Self::default()
        }
    }

    pub fn email(value: Option<String>) -> Self {
        Self {
            email: Some(value),
            ..Self::default()
        }
    }

    pub fn phone(value: String) -> Self {
        Self {
            phone: Some(value),
            ..Self::default()
        }
    }

    pub fn birthday(day: u8, month: u8) -> Self {
        Self {
            birthday_day: Some(day),
            birthday_month: Some(month),
            ..Self::default()
        }
    }
}
