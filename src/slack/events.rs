use crate::error::{Result, SlackAgentError};
use crate::logging::preview;
use crate::slack::{
    ChannelId, MessageProcessor, MessageTs, SlackClient, SlackMessage, ThreadTs, UserId,
};
use axum::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use slack_morphism::prelude::*;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

const EVENTS_PATH: &str = "/slack/events";
const DEDUP_TTL: Duration = Duration::from_secs(3600);

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+(?:\|[^>]*)?>[ \t]*").expect("mention regex"));

#[derive(Clone)]
struct BotState {
    message_processor: Arc<MessageProcessor>,
    processed_events: Arc<DashMap<String, Instant>>,
}

pub struct EventHandler {
    slack_client: Arc<SlackClient>,
    message_processor: Arc<MessageProcessor>,
    port: u16,
}

impl EventHandler {
    pub fn new(
        slack_client: Arc<SlackClient>,
        message_processor: Arc<MessageProcessor>,
        port: u16,
    ) -> Self {
        Self {
            slack_client,
            message_processor,
            port,
        }
    }

    /// Listen for Slack events
    ///
    /// Uses Socket Mode when an app token is configured, otherwise serves the
    /// Events API over HTTP.
    pub async fn start(self) -> Result<()> {
        tracing::info!("Initializing event handler components");

        let bot_state = BotState {
            message_processor: self.message_processor.clone(),
            processed_events: Arc::new(DashMap::new()),
        };

        let listener_environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(self.slack_client.get_client())
                .with_error_handler(Self::error_handler)
                .with_user_state(bot_state.clone()),
        );

        match self.slack_client.app_token() {
            Some(app_token) => {
                Self::serve_socket_mode(listener_environment, app_token.clone()).await
            }
            None => self.serve_http(listener_environment, bot_state).await,
        }
    }

    async fn serve_socket_mode(
        listener_environment: Arc<SlackHyperListenerEnvironment>,
        app_token: SlackApiToken,
    ) -> Result<()> {
        tracing::debug!("Configuring Socket Mode callbacks");
        let callbacks =
            SlackSocketModeListenerCallbacks::new().with_push_events(Self::handle_push_event);

        let socket_mode_listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment,
            callbacks,
        );

        tracing::info!("Connecting to Slack via Socket Mode");
        socket_mode_listener
            .listen_for(&app_token)
            .await
            .map_err(|e| SlackAgentError::SlackApi(e.to_string()))?;

        tracing::info!("Connected to Slack Socket Mode");
        tracing::info!("Bot is ready to receive messages");

        socket_mode_listener.serve().await;

        Ok(())
    }

    async fn serve_http(
        &self,
        listener_environment: Arc<SlackHyperListenerEnvironment>,
        bot_state: BotState,
    ) -> Result<()> {
        let listener = SlackEventsAxumListener::new(listener_environment);

        let app = axum::Router::new()
            .route(
                EVENTS_PATH,
                axum::routing::post(Self::handle_http_event).layer(
                    listener
                        .events_layer(self.slack_client.signing_secret())
                        .with_event_extractor(SlackEventsExtractors::push_event()),
                ),
            )
            .layer(Extension(bot_state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let tcp = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            addr = %addr,
            path = EVENTS_PATH,
            "Listening for Slack events over HTTP"
        );
        tracing::info!("Bot is ready to receive messages");

        axum::serve(tcp, app).await?;

        Ok(())
    }

    async fn handle_http_event(
        Extension(state): Extension<BotState>,
        Extension(event): Extension<SlackPushEvent>,
    ) -> Response {
        match event {
            SlackPushEvent::UrlVerification(verification) => {
                tracing::info!("Answering URL verification challenge");
                verification.challenge.into_response()
            }
            SlackPushEvent::EventCallback(callback) => {
                Self::dispatch(callback, state);
                StatusCode::OK.into_response()
            }
            other => {
                tracing::debug!(event = ?other, "Ignoring push event");
                StatusCode::OK.into_response()
            }
        }
    }

    async fn handle_push_event(
        event: SlackPushEventCallback,
        _client: Arc<SlackHyperClient>,
        user_state: SlackClientEventsUserState,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let state: BotState = {
            let storage = user_state.read().await;
            storage
                .get_user_state::<BotState>()
                .cloned()
                .ok_or("event handler state is missing")?
        };

        Self::dispatch(event, state);
        Ok(())
    }

    /// Acknowledge right away; Slack retries anything slower than 3 seconds
    fn dispatch(event: SlackPushEventCallback, state: BotState) {
        let Some(message) = accept_event(&state.processed_events, &event.event) else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = state.message_processor.process_message(message).await {
                tracing::error!(error = %e, "Message processing failed");
            }
        });
    }

    fn error_handler(
        err: Box<dyn std::error::Error + Send + Sync>,
        _client: Arc<SlackHyperClient>,
        _states: SlackClientEventsUserState,
    ) -> HttpStatusCode {
        tracing::error!(
            error = %err,
            error_kind = std::any::type_name_of_val(&*err),
            "Slack event error"
        );
        HttpStatusCode::OK
    }
}

/// Pull the user message out of an `app_mention` or plain `message` event
///
/// Bot messages, edits and other subtypes are skipped.
fn incoming_message(body: &SlackEventCallbackBody) -> Option<(&'static str, SlackMessage)> {
    match body {
        SlackEventCallbackBody::AppMention(mention) => {
            let text = mention.content.text.as_deref().unwrap_or_default();
            Some((
                "app_mention",
                SlackMessage {
                    channel: ChannelId::new(mention.channel.to_string()),
                    user: UserId::new(mention.user.to_string()),
                    text: clean_mention_text(text),
                    thread_ts: mention
                        .origin
                        .thread_ts
                        .as_ref()
                        .map(|t| ThreadTs::new(t.to_string())),
                    ts: MessageTs::new(mention.origin.ts.to_string()),
                },
            ))
        }
        SlackEventCallbackBody::Message(message) => {
            if message.sender.bot_id.is_some() {
                tracing::debug!("Ignoring bot message");
                return None;
            }
            if message.subtype.is_some() {
                tracing::debug!(subtype = ?message.subtype, "Ignoring message subtype");
                return None;
            }
            let channel = message.origin.channel.as_ref()?;
            let user = message.sender.user.as_ref()?;
            let text = message
                .content
                .as_ref()
                .and_then(|c| c.text.as_deref())
                .unwrap_or_default();
            Some((
                "message",
                SlackMessage {
                    channel: ChannelId::new(channel.to_string()),
                    user: UserId::new(user.to_string()),
                    text: clean_mention_text(text),
                    thread_ts: message
                        .origin
                        .thread_ts
                        .as_ref()
                        .map(|t| ThreadTs::new(t.to_string())),
                    ts: MessageTs::new(message.origin.ts.to_string()),
                },
            ))
        }
        _ => {
            tracing::debug!("Unhandled event type");
            None
        }
    }
}

/// Filter, dedup and convert one delivered event
///
/// Returns `None` for events that are not user messages and for messages
/// already seen under the same `{channel}:{ts}`.
fn accept_event(
    processed: &DashMap<String, Instant>,
    body: &SlackEventCallbackBody,
) -> Option<SlackMessage> {
    cleanup_old_events(processed);

    let (kind, message) = incoming_message(body)?;

    let key = event_key(&message.channel, &message.ts);
    match processed.entry(key.clone()) {
        Entry::Occupied(seen) => {
            tracing::debug!(
                event_key = %key,
                event_type = kind,
                last_seen_ms = seen.get().elapsed().as_millis() as u64,
                "Duplicate event detected, skipping"
            );
            return None;
        }
        Entry::Vacant(slot) => {
            slot.insert(Instant::now());
        }
    }

    tracing::info!(
        event_type = kind,
        message = %preview(&message.text, 150),
        "Received message in {}",
        message.channel.log_format()
    );
    Some(message)
}

fn cleanup_old_events(events: &DashMap<String, Instant>) {
    let mut removed = 0;

    events.retain(|_key, instant| {
        let keep = instant.elapsed() < DEDUP_TTL;
        if !keep {
            removed += 1;
        }
        keep
    });

    if removed > 0 {
        tracing::debug!(removed_count = removed, "Cleaned up old events from cache");
    }
}

/// Strip `<@U…>` mention tokens, keeping the rest of the text as written
fn clean_mention_text(text: &str) -> String {
    MENTION_RE.replace_all(text, "").trim().to_string()
}

fn event_key(channel: &ChannelId, ts: &MessageTs) -> String {
    format!("{}:{}", channel.as_str(), ts.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{ScriptedModel, text_response};
    use crate::agent::{Agent, AgentProfile, App, Runner};
    use crate::config::AgentConfig;
    use crate::session::InMemorySessionService;
    use crate::slack::testing::RecordingPoster;
    use serde_json::json;

    fn body(value: serde_json::Value) -> SlackEventCallbackBody {
        serde_json::from_value(value).unwrap()
    }

    fn mention(ts: &str) -> SlackEventCallbackBody {
        body(json!({
            "type": "app_mention",
            "user": "U1",
            "channel": "C1",
            "text": "<@UBOT> what changed?",
            "ts": ts
        }))
    }

    fn channel_message(ts: &str) -> SlackEventCallbackBody {
        body(json!({
            "type": "message",
            "channel": "C1",
            "user": "U1",
            "text": "<@UBOT> what changed?",
            "ts": ts,
            "channel_type": "channel"
        }))
    }

    fn bot_state() -> BotState {
        let sessions = Arc::new(InMemorySessionService::new());
        let model = Arc::new(ScriptedModel::new(vec![text_response("unused")]));
        let runner = Runner::new(
            App::new("slack_app", Agent::builder("slack_assistant").build()),
            sessions,
            model,
        );
        let config = AgentConfig {
            app_name: "slack_app".to_string(),
            profile: AgentProfile::Web,
            max_llm_calls: 5,
            run_timeout_secs: 5,
            session_busy_timeout_secs: 0,
        };
        let poster = Arc::new(RecordingPoster::default());
        BotState {
            message_processor: Arc::new(MessageProcessor::new(runner, poster, &config)),
            processed_events: Arc::new(DashMap::new()),
        }
    }

    #[test]
    fn test_clean_mention_text() {
        assert_eq!(
            clean_mention_text("<@U123ABC> what is our PTO policy?"),
            "what is our PTO policy?"
        );
        assert_eq!(clean_mention_text("hi <@U1|alice> there "), "hi there");
        assert_eq!(clean_mention_text("<@U1>"), "");
    }

    #[test]
    fn test_clean_mention_keeps_layout() {
        let text = "<@UBOT> fix this:\n```\nfn main() {\n    println!(\"hi\");\n}\n```";
        assert_eq!(
            clean_mention_text(text),
            "fix this:\n```\nfn main() {\n    println!(\"hi\");\n}\n```"
        );
    }

    #[test]
    fn test_event_key() {
        let key = event_key(&ChannelId::new("C1"), &MessageTs::new("1700000000.000100"));
        assert_eq!(key, "C1:1700000000.000100");
    }

    #[test]
    fn test_app_mention_extracted() {
        let event = body(json!({
            "type": "app_mention",
            "user": "U1",
            "channel": "C1",
            "text": "<@UBOT> summarize the launch doc",
            "ts": "1700000000.000100",
            "thread_ts": "1699999999.000001"
        }));

        let (kind, message) = incoming_message(&event).unwrap();
        assert_eq!(kind, "app_mention");
        assert_eq!(message.channel, ChannelId::new("C1"));
        assert_eq!(message.user, UserId::new("U1"));
        assert_eq!(message.text, "summarize the launch doc");
        assert_eq!(message.reply_thread(), ThreadTs::new("1699999999.000001"));
    }

    #[test]
    fn test_plain_message_extracted() {
        let event = body(json!({
            "type": "message",
            "channel": "D1",
            "user": "U2",
            "text": "hello",
            "ts": "1700000000.000200"
        }));

        let (kind, message) = incoming_message(&event).unwrap();
        assert_eq!(kind, "message");
        assert_eq!(message.text, "hello");
        assert_eq!(message.reply_thread(), ThreadTs::new("1700000000.000200"));
    }

    #[test]
    fn test_bot_message_skipped() {
        let event = body(json!({
            "type": "message",
            "channel": "C1",
            "bot_id": "B1",
            "text": "I am a bot",
            "ts": "1700000000.000300"
        }));

        assert!(incoming_message(&event).is_none());
    }

    #[test]
    fn test_subtype_skipped() {
        let event = body(json!({
            "type": "message",
            "subtype": "channel_join",
            "channel": "C1",
            "user": "U1",
            "text": "<@U1> has joined the channel",
            "ts": "1700000000.000400"
        }));

        assert!(incoming_message(&event).is_none());
    }

    #[test]
    fn test_mention_and_message_answered_once() {
        let processed = DashMap::new();

        let first = accept_event(&processed, &mention("1700000000.000500"));
        assert_eq!(first.unwrap().text, "what changed?");
        assert!(accept_event(&processed, &channel_message("1700000000.000500")).is_none());
        assert!(accept_event(&processed, &mention("1700000000.000500")).is_none());

        assert!(accept_event(&processed, &channel_message("1700000000.000600")).is_some());
        assert_eq!(processed.len(), 2);
    }

    #[test]
    fn test_cleanup_old_events() {
        let events = DashMap::new();
        events.insert("fresh".to_string(), Instant::now());
        if let Some(old) = Instant::now().checked_sub(DEDUP_TTL + Duration::from_secs(1)) {
            events.insert("stale".to_string(), old);
            cleanup_old_events(&events);
            assert!(!events.contains_key("stale"));
        }
        assert!(events.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_url_verification_challenge() {
        let event: SlackPushEvent = serde_json::from_value(json!({
            "type": "url_verification",
            "token": "legacy-token",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        }))
        .unwrap();

        let response =
            EventHandler::handle_http_event(Extension(bot_state()), Extension(event)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P");
    }
}
