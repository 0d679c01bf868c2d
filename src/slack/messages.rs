use crate::agent::{Content, Event, Runner};
use crate::config::AgentConfig;
use crate::error::{Result, SlackAgentError};
use crate::logging::{Timer, log_error, preview};
use crate::session::{STATE_SLACK_CHANNEL, SessionKey, ensure_session, session_id_for_channel};
use crate::slack::commands::{BotCommand, SlackCommandHandler};
use crate::slack::markdown::split_message;
use crate::slack::{ChannelId, SlackMessage, SlackPoster, ThreadTs, markdown_to_slack};
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Map, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, oneshot};
use tokio::time::timeout;
use tracing::Instrument;

// Slack rejects messages over 40KB; leave some margin
const MAX_SLACK_MESSAGE_SIZE: usize = 39000;

const BUSY_TEXT: &str = "⏳ *Still working on a previous message in this conversation*\n\n\
     Your message has been received, but the assistant is busy. Please try again in a moment.";

/// Bridges Slack messages to the agent runner and posts the answers back
pub struct MessageProcessor {
    runner: Runner,
    poster: Arc<dyn SlackPoster>,
    commands: SlackCommandHandler,
    session_locks: DashMap<SessionKey, Arc<Mutex<()>>>,
    run_timeout: Duration,
    busy_timeout: Duration,
}

impl MessageProcessor {
    pub fn new(runner: Runner, poster: Arc<dyn SlackPoster>, config: &AgentConfig) -> Self {
        let commands = SlackCommandHandler::new(poster.clone(), runner.sessions());
        Self {
            runner,
            poster,
            commands,
            session_locks: DashMap::new(),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            busy_timeout: Duration::from_secs(config.session_busy_timeout_secs),
        }
    }

    /// Answer one user message in its thread
    ///
    /// Agent failures are reported into the thread rather than returned; only
    /// failures to talk to Slack surface as errors.
    pub async fn process_message(&self, message: SlackMessage) -> Result<()> {
        let _timer = Timer::new("process_message");

        if message.text.trim().is_empty() {
            tracing::debug!("Ignoring message without text");
            return Ok(());
        }

        let key = SessionKey::new(
            self.runner.app().name.clone(),
            message.user.as_str(),
            session_id_for_channel(&message.channel),
        );

        let span = tracing::info_span!(
            "process_message",
            channel_id = %message.channel.as_str(),
            user_id = %message.user.as_str(),
            session_id = %key.session_id,
            has_thread = message.thread_ts.is_some(),
        );

        self.handle(message, key).instrument(span).await
    }

    async fn handle(&self, message: SlackMessage, key: SessionKey) -> Result<()> {
        tracing::info!(
            message = %preview(&message.text, 150),
            "Message from {} in {}",
            message.user.as_str(),
            message.channel.log_format()
        );

        if let Some(command) = BotCommand::parse(&message.text) {
            return self.commands.handle_command(command, &message, &key).await;
        }

        let thread = message.reply_thread();
        self.prune_idle_locks();
        let lock = self.session_lock(&key);
        let Ok(session_guard) = timeout(self.busy_timeout, lock.lock_owned()).await else {
            tracing::warn!(
                timeout_secs = self.busy_timeout.as_secs(),
                "Session busy, asking user to retry"
            );
            self.poster
                .post_message(&message.channel, BUSY_TEXT, Some(&thread))
                .await?;
            return Ok(());
        };

        match self.answer(&message, &key, session_guard).await {
            Ok(Some(reply)) => self.send_reply(&message.channel, &reply, &thread).await,
            Ok(None) => {
                tracing::warn!("No response text received from agent");
                Ok(())
            }
            Err(e) => {
                log_error("process_message", &e);
                self.poster
                    .post_message(
                        &message.channel,
                        &format!("I encountered an error: {}", e),
                        Some(&thread),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Make sure the session exists, run the agent and pick out the reply
    ///
    /// The run is drained on its own task, which keeps the session lock until
    /// the invocation is complete. The run timeout only bounds the wait for
    /// the reply, so a slow run never leaves a half-written history behind.
    async fn answer(
        &self,
        message: &SlackMessage,
        key: &SessionKey,
        session_guard: OwnedMutexGuard<()>,
    ) -> Result<Option<String>> {
        let mut state = Map::new();
        state.insert(
            STATE_SLACK_CHANNEL.to_string(),
            json!(message.channel.as_str()),
        );
        ensure_session(self.runner.sessions().as_ref(), key, state).await?;

        tracing::info!(session = %key, "Running agent");
        let stream = self
            .runner
            .run(&key.user_id, &key.session_id, Content::user(message.text.clone()));

        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::spawn(
            async move {
                drain_events(stream, reply_tx).await;
                drop(session_guard);
            }
            .in_current_span(),
        );

        match timeout(self.run_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SlackAgentError::Internal(
                "agent run ended without a result".to_string(),
            )),
            Err(_) => Err(SlackAgentError::Timeout(self.run_timeout.as_secs())),
        }
    }

    async fn send_reply(&self, channel: &ChannelId, reply: &str, thread: &ThreadTs) -> Result<()> {
        let formatted = markdown_to_slack(reply);
        let chunks = split_message(&formatted, MAX_SLACK_MESSAGE_SIZE);
        let total = chunks.len();

        if total > 1 {
            tracing::warn!(
                message_len = formatted.len(),
                chunk_count = total,
                "Message exceeds size limit, splitting into chunks"
            );
        }

        for (i, chunk) in chunks.into_iter().enumerate() {
            let text = if i == 0 {
                chunk
            } else {
                format!("*(continued {}/{})*\n\n{}", i + 1, total, chunk)
            };
            self.poster.post_message(channel, &text, Some(thread)).await?;
        }

        tracing::info!(message_len = formatted.len(), "Response sent");
        Ok(())
    }

    pub(crate) fn session_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.session_locks.entry(key.clone()).or_default().clone()
    }

    /// Drop locks that nobody holds or waits on
    pub(crate) fn prune_idle_locks(&self) {
        let before = self.session_locks.len();
        self.session_locks.retain(|_key, lock| Arc::strong_count(lock) > 1);

        let removed = before.saturating_sub(self.session_locks.len());
        if removed > 0 {
            tracing::debug!(removed_count = removed, "Pruned idle session locks");
        }
    }
}

/// Drain the event stream and return the text of the first model-authored
/// event that has any.
///
/// The stream is always read to the end so the session history is complete.
/// An error after the reply was found is logged and otherwise ignored.
pub async fn first_model_text(stream: BoxStream<'static, Result<Event>>) -> Result<Option<String>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    drain_events(stream, reply_tx).await;
    reply_rx.await.unwrap_or(Ok(None))
}

/// Read the stream to the end, sending the reply as soon as it is known
async fn drain_events(
    mut stream: BoxStream<'static, Result<Event>>,
    reply_tx: oneshot::Sender<Result<Option<String>>>,
) {
    let mut reply_tx = Some(reply_tx);
    let mut count = 0;

    while let Some(event) = stream.next().await {
        count += 1;
        let event = match event {
            Ok(event) => event,
            Err(e) => match reply_tx.take() {
                Some(tx) => {
                    let _ = tx.send(Err(e));
                    return;
                }
                None => {
                    tracing::warn!(error = %e, "Agent failed after replying");
                    return;
                }
            },
        };

        tracing::debug!(
            event_num = count,
            author = %event.author,
            function_calls = event.function_calls().len(),
            "Received agent event"
        );

        let Some(text) = event.model_text() else {
            continue;
        };
        match reply_tx.take() {
            Some(tx) => {
                tracing::debug!(text_len = text.len(), "Found model reply");
                if tx.send(Ok(Some(text))).is_err() {
                    tracing::warn!("Reply arrived after the run timeout, dropping it");
                }
            }
            None => tracing::debug!(text_len = text.len(), "Skipping later model text"),
        }
    }

    if let Some(tx) = reply_tx {
        let _ = tx.send(Ok(None));
    }
    tracing::debug!(event_count = count, "Agent run complete");
}
