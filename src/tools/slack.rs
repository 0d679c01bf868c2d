use crate::agent::{Tool, ToolContext};
use crate::error::{Result, SlackAgentError};
use crate::session::STATE_SLACK_CHANNEL;
use crate::slack::{ChannelId, SlackPoster, ThreadTs};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub const POST_MESSAGE_TOOL: &str = "chat_postMessage";

/// Wrapper around Slack's `chat.postMessage` operation
pub struct SlackPostMessageTool {
    poster: Arc<dyn SlackPoster>,
}

impl SlackPostMessageTool {
    pub fn new(poster: Arc<dyn SlackPoster>) -> Self {
        Self { poster }
    }
}

#[async_trait]
impl Tool for SlackPostMessageTool {
    fn name(&self) -> &str {
        POST_MESSAGE_TOOL
    }

    fn description(&self) -> &str {
        "Sends a message to a Slack channel. Defaults to the channel of the current conversation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {
                    "type": "string",
                    "description": "Channel ID to post to, e.g. C1234567890"
                },
                "text": {
                    "type": "string",
                    "description": "Message text, Slack mrkdwn allowed"
                },
                "thread_ts": {
                    "type": "string",
                    "description": "Timestamp of the parent message to reply in a thread"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SlackAgentError::Tool("missing `text` argument".to_string()))?;

        let channel = args
            .get("channel")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .or_else(|| ctx.state_str(STATE_SLACK_CHANNEL))
            .map(ChannelId::new)
            .ok_or_else(|| {
                SlackAgentError::Tool(
                    "no `channel` given and none bound to the session".to_string(),
                )
            })?;

        let thread_ts = args
            .get("thread_ts")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(ThreadTs::new);

        tracing::info!(
            "📨 Agent posting to {} text_len={}",
            channel.log_format(),
            text.len()
        );

        let ts = self
            .poster
            .post_message(&channel, text, thread_ts.as_ref())
            .await?;

        Ok(json!({
            "ok": true,
            "channel": channel.as_str(),
            "ts": ts.as_str(),
        }))
    }
}
