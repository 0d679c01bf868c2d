use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in human-readable log lines
    pub fn log_format(&self) -> String {
        format!("channel={}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTs(pub String);

impl ThreadTs {
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTs(pub String);

impl MessageTs {
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A user message the bot should answer
#[derive(Debug, Clone)]
pub struct SlackMessage {
    pub channel: ChannelId,
    pub user: UserId,
    pub text: String,
    pub thread_ts: Option<ThreadTs>,
    pub ts: MessageTs,
}

impl SlackMessage {
    /// Thread to answer in: the existing thread, or a new one under this message
    pub fn reply_thread(&self) -> ThreadTs {
        self.thread_ts
            .clone()
            .unwrap_or_else(|| ThreadTs::new(self.ts.as_str()))
    }
}
