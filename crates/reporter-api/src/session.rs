use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use reporter_types::capabilities::AccountCredentials;
use reporter_types::platforms::Platform;

/// Conversation steps, in the order a complete report walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    PhoneNumber,
    ApiId,
    ApiHash,
    AuthCode,
    ChooseLanguage,
    ChoosePlatform,
    CustomPlatform,
    SetPlatformToken,
    ChooseCategory,
    ReportDetails,
    /// Report saved; waiting for `/start`.
    Start,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneNumber => "phone_number",
            Self::ApiId => "api_id",
            Self::ApiHash => "api_hash",
            Self::AuthCode => "auth_code",
            Self::ChooseLanguage => "choose_language",
            Self::ChoosePlatform => "choose_platform",
            Self::CustomPlatform => "custom_platform",
            Self::SetPlatformToken => "set_platform_token",
            Self::ChooseCategory => "choose_category",
            Self::ReportDetails => "report_details",
            Self::Start => "start",
        }
    }
}

/// Per-chat conversation state. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub step: Step,
    pub phone_number: Option<String>,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub language: String,
    pub platform: Option<Platform>,
    pub custom_platform: Option<String>,
    pub category: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            step: Step::PhoneNumber,
            phone_number: None,
            api_id: None,
            api_hash: None,
            language: "en".to_string(),
            platform: None,
            custom_platform: None,
            category: None,
        }
    }

    /// Onboarding details, once all three have been collected.
    pub fn account(&self) -> Option<AccountCredentials> {
        Some(AccountCredentials {
            phone_number: self.phone_number.clone()?,
            api_id: self.api_id.clone()?,
            api_hash: self.api_hash.clone()?,
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions keyed by chat id. Each session sits behind its own lock, and a
/// handler holds that lock for the whole event, so a session only ever has
/// one writer.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat_id: i64) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    /// Begin onboarding from scratch, replacing any session in progress.
    pub async fn start(&self, chat_id: i64) -> Arc<Mutex<Session>> {
        let slot = self
            .sessions
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .clone();
        *slot.lock().await = Session::new();
        slot
    }

    /// Forget a chat whose report is already filed. Sessions still in the
    /// middle of a conversation, or currently locked, are kept.
    pub async fn evict_finished(&self, chat_id: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        let finished = match sessions.get(&chat_id) {
            Some(slot) => slot
                .try_lock()
                .map(|session| session.step == Step::Start)
                .unwrap_or(false),
            None => false,
        };
        if finished {
            sessions.remove(&chat_id);
        }
        finished
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_resets_existing_session() {
        let store = SessionStore::new();
        assert!(store.get(1).await.is_none());

        let slot = store.start(1).await;
        {
            let mut session = slot.lock().await;
            session.step = Step::ChooseCategory;
            session.platform = Some(Platform::Reddit);
        }

        store.start(1).await;
        let session = store.get(1).await.unwrap();
        assert_eq!(*session.lock().await, Session::new());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn only_finished_sessions_are_evicted() {
        let store = SessionStore::new();
        store.start(1).await;
        store.start(2).await.lock().await.step = Step::Start;

        assert!(!store.evict_finished(1).await);
        assert!(store.evict_finished(2).await);
        assert!(!store.evict_finished(3).await);

        assert!(store.get(1).await.is_some());
        assert!(store.get(2).await.is_none());
    }

    #[test]
    fn account_needs_all_fields() {
        let mut session = Session::new();
        session.phone_number = Some("+15550001111".into());
        session.api_id = Some("1".into());
        assert!(session.account().is_none());

        session.api_hash = Some("0123456789abcdef0123456789abcdef".into());
        assert_eq!(session.account().unwrap().api_id, "1");
    }
}
