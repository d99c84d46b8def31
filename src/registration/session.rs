use crate::backend::UserRecord;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;
use tokio::sync::{Mutex, OwnedMutexGuard};

// Which profile field an update-mode session is editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Phone,
    Birthday,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Name, Field::Email, Field::Phone, Field::Birthday];

    pub fn callback_data(self) -> &'static str {
        match self {
            Field::Name => "update_name",
            Field::Email => "update_email",
            Field::Phone => "update_phone",
            Field::Birthday => "update_birthday",
        }
    }

    pub fn from_callback_data(data: &str) -> Option<Field> {
        match data {
            "update_name" => Some(Field::Name),
            "update_email" => Some(Field::Email),
            "update_phone" => Some(Field::Phone),
            "update_birthday" => Some(Field::Birthday),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Email => "Email",
            Field::Phone => "Phone",
            Field::Birthday => "Birthday",
        }
    }
}

// The question the conversation is currently waiting on. A chat with no
// session is idle; there is no stored variant for that.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    AskName,
    AskEmail,
    AskPhone,
    AskBirthday,
    FieldMenu,
    AwaitingFieldUpdate(Field),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday_day: Option<u8>,
    pub birthday_month: Option<u8>,
}

impl Draft {
    // Complete drafts only; email stays optional.
    pub fn into_record(self, chat_id: ChatId) -> Option<UserRecord> {
        Some(UserRecord {
            chat_id,
            name: self.name?,
            email: self.email,
            phone: self.phone?,
            birthday_day: self.birthday_day?,
            birthday_month: self.birthday_month?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Creating,
    Updating(UserRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub step: Step,
    pub draft: Draft,
    pub mode: Mode,
}

impl Session {
    pub fn creating() -> Self {
        Self {
            step: Step::AskName,
            draft: Draft::default(),
            mode: Mode::Creating,
        }
    }

    pub fn updating(record: UserRecord) -> Self {
        Self {
            step: Step::FieldMenu,
            draft: Draft::default(),
            mode: Mode::Updating(record),
        }
    }
}

pub trait SessionStore: Send + Sync {
    fn get(&self, id: ChatId) -> Option<Session>;
    fn set(&self, id: ChatId, session: Session);
    fn delete(&self, id: ChatId);
}

// In-memory store. Sessions idle longer than the TTL are evicted, which
// doubles as abandonment cleanup. A process restart drops every in-flight
// conversation.
pub struct InMemorySessions {
    cache: Cache<ChatId, Session>,
}

impl InMemorySessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(ttl)
                .build(),
        }
    }
}

impl SessionStore for InMemorySessions {
    fn get(&self, id: ChatId) -> Option<Session> {
        self.cache.get(&id)
    }

    fn set(&self, id: ChatId, session: Session) {
        self.cache.insert(id, session);
    }

    fn delete(&self, id: ChatId) {
        self.cache.invalidate(&id);
    }
}

// One async mutex per chat. Rapid double-sends race on the session's
// read-modify-write; the flow takes the chat's lock before touching it.
pub struct ChatLocks {
    locks: Cache<ChatId, Arc<Mutex<()>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }

    pub async fn acquire(&self, id: ChatId) -> OwnedMutexGuard<()> {
        self.locks
            .get_with(id, || Arc::new(Mutex::new(())))
            .lock_owned()
            .await
    }
}

impl Default for ChatLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn store() -> InMemorySessions {
        InMemorySessions::new(Duration::from_secs(60))
    }

    #[test]
    fn get_returns_what_was_set() {
        let sessions = store();
        sessions.set(ChatId(1), Session::creating());

        let session = sessions.get(ChatId(1)).unwrap();
        assert_eq!(session.step, Step::AskName);
        assert_eq!(session.draft, Draft::default());
        assert_eq!(sessions.get(ChatId(2)), None);
    }

    #[test]
    fn set_overwrites_the_previous_session() {
        let sessions = store();
        let mut first = Session::creating();
        first.draft.name = Some("Ada".to_string());
        first.step = Step::AskEmail;

        sessions.set(ChatId(1), first);
        sessions.set(ChatId(1), Session::creating());

        let session = sessions.get(ChatId(1)).unwrap();
        assert_eq!(session.step, Step::AskName);
        assert_eq!(session.draft.name, None);
    }

    #[test]
    fn delete_removes_the_session() {
        let sessions = store();
        sessions.set(ChatId(1), Session::creating());
        sessions.delete(ChatId(1));

        assert_eq!(sessions.get(ChatId(1)), None);
    }

    #[tokio::test]
    async fn chat_lock_serializes_the_same_chat() {
        let locks = ChatLocks::new();
        let guard = locks.acquire(ChatId(1)).await;

        let blocked = timeout(Duration::from_millis(50), locks.acquire(ChatId(1))).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = timeout(Duration::from_millis(50), locks.acquire(ChatId(1))).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn chat_lock_does_not_block_other_chats() {
        let locks = ChatLocks::new();
        let _guard = locks.acquire(ChatId(1)).await;

        let other = timeout(Duration::from_millis(50), locks.acquire(ChatId(2))).await;
        assert!(other.is_ok());
    }

    #[test]
    fn complete_draft_becomes_a_record() {
        let draft = Draft {
            name: Some("Ada".to_string()),
            email: None,
            phone: Some("9876543210".to_string()),
            birthday_day: Some(31),
            birthday_month: Some(2),
        };

        let record = draft.into_record(ChatId(42)).unwrap();
        assert_eq!(record.chat_id, ChatId(42));
        assert_eq!(record.name, "Ada");
        assert_eq!(record.email, None);
        assert_eq!(record.birthday_day, 31);
        assert_eq!(record.birthday_month, 2);
    }

    #[test]
    fn incomplete_draft_is_rejected() {
        let draft = Draft {
            name: Some("Ada".to_string()),
            ..Draft::default()
        };

        assert_eq!(draft.into_record(ChatId(42)), None);
    }

    #[test]
    fn field_callback_data_round_trips() {
        for field in Field::ALL {
            assert_eq!(Field::from_callback_data(field.callback_data()), Some(field));
        }
        assert_eq!(Field::from_callback_data("no_email"), None);
    }
}
