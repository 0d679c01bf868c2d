use crate::error::Result;
use crate::session::{SessionKey, SessionService};
use crate::slack::{SlackMessage, SlackPoster};
use std::sync::Arc;

const HELP_TEXT: &str = r#"📚 *Available Commands*

`/help` - Show this help message
`/session` - Show the conversation session for this channel
`/new-session` - Start a fresh conversation (clears context)

Anything else you send is answered by the assistant.

*Note:* Commands must be sent as a message to the bot (mention me or DM), not as Slack's built-in slash commands."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    SessionInfo,
    NewSession,
    Unknown(String),
}

impl BotCommand {
    /// `None` when the text is not a command
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let name = text.split_whitespace().next().unwrap_or(text);
        Some(match name {
            "/help" => BotCommand::Help,
            "/session" => BotCommand::SessionInfo,
            "/new-session" => BotCommand::NewSession,
            other => BotCommand::Unknown(other.to_string()),
        })
    }
}

pub struct SlackCommandHandler {
    poster: Arc<dyn SlackPoster>,
    sessions: Arc<dyn SessionService>,
}

impl SlackCommandHandler {
    pub fn new(poster: Arc<dyn SlackPoster>, sessions: Arc<dyn SessionService>) -> Self {
        Self { poster, sessions }
    }

    pub async fn handle_command(
        &self,
        command: BotCommand,
        message: &SlackMessage,
        key: &SessionKey,
    ) -> Result<()> {
        tracing::info!(
            "🎯 Handling command {} command={:?}",
            message.channel.log_format(),
            command
        );

        let reply = match &command {
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::SessionInfo => self.session_info(key).await?,
            BotCommand::NewSession => self.new_session(key).await?,
            BotCommand::Unknown(name) => {
                tracing::warn!(
                    "  ❓ Unknown command {} command='{}'",
                    message.channel.log_format(),
                    name
                );
                format!("❓ Unknown command: `{}`\n\nType `/help` for available commands.", name)
            }
        };

        let thread = message.reply_thread();
        self.poster
            .post_message(&message.channel, &reply, Some(&thread))
            .await?;
        Ok(())
    }

    async fn session_info(&self, key: &SessionKey) -> Result<String> {
        Ok(match self.sessions.get_session(key).await? {
            Some(session) => format!(
                "🧵 *Session* `{}`\n• Events: {}\n• Started: {}",
                key.session_id,
                session.events.len(),
                session.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => format!("🧵 No conversation yet for session `{}`", key.session_id),
        })
    }

    async fn new_session(&self, key: &SessionKey) -> Result<String> {
        let removed = self.sessions.delete_session(key).await?;
        tracing::info!(session = %key, removed = removed, "Session reset");
        Ok(if removed {
            "🔄 *New session started* - previous conversation context cleared.".to_string()
        } else {
            "🔄 Nothing to clear - the next message starts a new session.".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionService, ensure_session};
    use crate::slack::testing::RecordingPoster;
    use crate::slack::{ChannelId, MessageTs, UserId};
    use serde_json::Map;

    fn message(text: &str) -> SlackMessage {
        SlackMessage {
            channel: ChannelId::new("C1"),
            user: UserId::new("U1"),
            text: text.to_string(),
            thread_ts: None,
            ts: MessageTs::new("1.0"),
        }
    }

    fn key() -> SessionKey {
        SessionKey::new("slack_app", "U1", "slack-C1")
    }

    #[test]
    fn test_parse() {
        assert_eq!(BotCommand::parse("hello"), None);
        assert_eq!(BotCommand::parse(" /help "), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/new-session now"), Some(BotCommand::NewSession));
        assert_eq!(
            BotCommand::parse("/deploy"),
            Some(BotCommand::Unknown("/deploy".to_string()))
        );
    }

    #[tokio::test]
    async fn test_new_session_clears_context() {
        let poster = Arc::new(RecordingPoster::default());
        let sessions = Arc::new(InMemorySessionService::new());
        ensure_session(sessions.as_ref(), &key(), Map::new()).await.unwrap();
        let handler = SlackCommandHandler::new(poster.clone(), sessions.clone());

        handler
            .handle_command(BotCommand::NewSession, &message("/new-session"), &key())
            .await
            .unwrap();

        assert!(sessions.is_empty());
        let posts = poster.posts();
        assert!(posts[0].text.contains("New session started"));
        assert_eq!(posts[0].thread_ts.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_session_info() {
        let poster = Arc::new(RecordingPoster::default());
        let sessions = Arc::new(InMemorySessionService::new());
        let handler = SlackCommandHandler::new(poster.clone(), sessions.clone());

        handler
            .handle_command(BotCommand::SessionInfo, &message("/session"), &key())
            .await
            .unwrap();
        assert!(poster.posts()[0].text.contains("No conversation yet"));

        ensure_session(sessions.as_ref(), &key(), Map::new()).await.unwrap();
        handler
            .handle_command(BotCommand::SessionInfo, &message("/session"), &key())
            .await
            .unwrap();
        assert!(poster.posts()[1].text.contains("Events: 0"));
    }
}
