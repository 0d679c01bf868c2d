use crate::agent::Event;
use crate::error::{Result, SlackAgentError};
use crate::slack::ChannelId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::fmt;

pub type SessionId = String;

/// Session state key holding the Slack channel the conversation lives in
pub const STATE_SLACK_CHANNEL: &str = "slack_channel";

/// Session ID for a channel-wide conversation
///
/// Format: slack-{channel_id}
/// Example: slack-C09NNKZ8SPP
pub fn session_id_for_channel(channel_id: &ChannelId) -> SessionId {
    format!("slack-{}", channel_id.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<SessionId>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey, state: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            key,
            state,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for conversation sessions
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Fails with `SessionExists` if the key is taken
    async fn create_session(&self, key: SessionKey, state: Map<String, Value>) -> Result<Session>;

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()>;

    /// Returns whether a session was removed
    async fn delete_session(&self, key: &SessionKey) -> Result<bool>;

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionKey>>;
}

/// Return the session for `key`, creating it with `state` if absent
pub async fn ensure_session(
    service: &dyn SessionService,
    key: &SessionKey,
    state: Map<String, Value>,
) -> Result<Session> {
    if let Some(session) = service.get_session(key).await? {
        return Ok(session);
    }

    tracing::info!(session = %key, "Creating session");
    match service.create_session(key.clone(), state).await {
        Ok(session) => Ok(session),
        // Lost a race with a concurrent creator
        Err(SlackAgentError::SessionExists(_)) => service
            .get_session(key)
            .await?
            .ok_or_else(|| SlackAgentError::SessionNotFound(key.to_string())),
        Err(e) => Err(e),
    }
}

/// Process-local session storage; contents are lost on restart
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: DashMap<SessionKey, Session>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        Ok(self.sessions.get(key).map(|s| s.clone()))
    }

    async fn create_session(&self, key: SessionKey, state: Map<String, Value>) -> Result<Session> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(key) {
            Entry::Occupied(entry) => Err(SlackAgentError::SessionExists(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let session = Session::new(entry.key().clone(), state);
                entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(key)
            .ok_or_else(|| SlackAgentError::SessionNotFound(key.to_string()))?;
        session.updated_at = event.timestamp;
        session.events.push(event);
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<bool> {
        Ok(self.sessions.remove(key).is_some())
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionKey>> {
        Ok(self
            .sessions
            .iter()
            .filter(|e| e.key().app_name == app_name && e.key().user_id == user_id)
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Content;
    use serde_json::json;

    fn key(user: &str) -> SessionKey {
        SessionKey::new("slack_app", user, "slack-C09NNKZ8SPP")
    }

    #[test]
    fn test_session_id_format() {
        let channel = ChannelId::new("C09NNKZ8SPP");
        assert_eq!(session_id_for_channel(&channel), "slack-C09NNKZ8SPP");
    }

    #[tokio::test]
    async fn test_ensure_session_creates_once() {
        let service = InMemorySessionService::new();
        let mut state = Map::new();
        state.insert(STATE_SLACK_CHANNEL.to_string(), json!("C09NNKZ8SPP"));

        let first = ensure_session(&service, &key("U1"), state.clone()).await.unwrap();
        service
            .append_event(&key("U1"), Event::new("inv", "user", Content::user("hi")))
            .await
            .unwrap();
        let second = ensure_session(&service, &key("U1"), Map::new()).await.unwrap();

        assert_eq!(service.len(), 1);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.state.get(STATE_SLACK_CHANNEL), Some(&json!("C09NNKZ8SPP")));
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_by_user() {
        let service = InMemorySessionService::new();
        ensure_session(&service, &key("U1"), Map::new()).await.unwrap();

        assert!(service.get_session(&key("U2")).await.unwrap().is_none());
        ensure_session(&service, &key("U2"), Map::new()).await.unwrap();
        assert_eq!(service.len(), 2);
        assert_eq!(service.list_sessions("slack_app", "U1").await.unwrap(), vec![key("U1")]);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let service = InMemorySessionService::new();
        service.create_session(key("U1"), Map::new()).await.unwrap();
        let err = service.create_session(key("U1"), Map::new()).await.unwrap_err();
        assert!(matches!(err, SlackAgentError::SessionExists(_)));
    }

    #[tokio::test]
    async fn test_append_to_missing_session() {
        let service = InMemorySessionService::new();
        let err = service
            .append_event(&key("U1"), Event::new("inv", "user", Content::user("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, SlackAgentError::SessionNotFound(_)));
    }

    #[test]
    fn test_delete_session() {
        let service = InMemorySessionService::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(ensure_session(&service, &key("U1"), Map::new()).await);

            assert!(tokio_test::assert_ok!(service.delete_session(&key("U1")).await));
            assert!(!tokio_test::assert_ok!(service.delete_session(&key("U1")).await));
        });
        assert!(service.is_empty());
    }
}
