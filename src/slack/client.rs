use crate::config::SlackConfig;
use crate::error::{Result, SlackAgentError};
use crate::slack::{ChannelId, MessageTs, ThreadTs};
use async_trait::async_trait;
use slack_morphism::prelude::*;
use std::sync::Arc;

/// Outbound message seam shared by the event bridge and the posting tool
#[async_trait]
pub trait SlackPoster: Send + Sync {
    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&ThreadTs>,
    ) -> Result<MessageTs>;
}

pub struct SlackClient {
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    app_token: Option<SlackApiToken>,
    signing_secret: SlackSigningSecret,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperConnector::new()
            .map_err(|e| SlackAgentError::SlackApi(e.to_string()))?;

        let client = Arc::new(slack_morphism::SlackClient::new(connector));
        let token = SlackApiToken::new(config.bot_token.into());
        let app_token = config.app_token.map(|t| SlackApiToken::new(t.into()));
        let signing_secret = config.signing_secret.into();

        Ok(Self {
            client,
            token,
            app_token,
            signing_secret,
        })
    }

    pub fn get_client(&self) -> Arc<SlackHyperClient> {
        self.client.clone()
    }

    /// App-level token; present only when Socket Mode is configured
    pub fn app_token(&self) -> Option<&SlackApiToken> {
        self.app_token.as_ref()
    }

    pub fn signing_secret(&self) -> &SlackSigningSecret {
        &self.signing_secret
    }

    /// Send a message to a channel, optionally as a thread reply
    pub async fn send_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&ThreadTs>,
    ) -> Result<MessageTs> {
        let session = self.client.open_session(&self.token);

        let mut request = SlackApiChatPostMessageRequest::new(
            channel.as_str().into(),
            SlackMessageContent::new().with_text(text.into()),
        );

        if let Some(ts) = thread_ts {
            request.thread_ts = Some(ts.as_str().into());
        }

        // Reference lists would otherwise expand into a wall of previews
        request.unfurl_links = Some(false);
        request.unfurl_media = Some(false);

        let response = session
            .chat_post_message(&request)
            .await
            .map_err(|e| SlackAgentError::SlackApi(e.to_string()))?;

        Ok(MessageTs::new(response.ts.to_string()))
    }
}

#[async_trait]
impl SlackPoster for SlackClient {
    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&ThreadTs>,
    ) -> Result<MessageTs> {
        self.send_message(channel, text, thread_ts).await
    }
}
