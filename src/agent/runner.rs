use crate::agent::flow::{call_model, execute_calls};
use crate::agent::{App, Content, Event, FunctionCall, Model, ROLE_USER, ToolContext};
use crate::error::{Result, SlackAgentError};
use crate::session::{SessionKey, SessionService};
use async_stream::try_stream;
use futures::stream::BoxStream;
use std::sync::Arc;

const DEFAULT_MAX_LLM_CALLS: usize = 20;

/// Executes the app's root agent against a session
#[derive(Clone)]
pub struct Runner {
    app: App,
    sessions: Arc<dyn SessionService>,
    model: Arc<dyn Model>,
    max_llm_calls: usize,
}

impl Runner {
    pub fn new(app: App, sessions: Arc<dyn SessionService>, model: Arc<dyn Model>) -> Self {
        Self {
            app,
            sessions,
            model,
            max_llm_calls: DEFAULT_MAX_LLM_CALLS,
        }
    }

    pub fn with_max_llm_calls(mut self, max_llm_calls: usize) -> Self {
        self.max_llm_calls = max_llm_calls.max(1);
        self
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn sessions(&self) -> Arc<dyn SessionService> {
        self.sessions.clone()
    }

    /// Append `new_message` to the session and drive the root agent until it
    /// answers without calling tools.
    ///
    /// Yields every model event and every batch of tool results, in order.
    /// Each yielded event is already persisted to the session. The session
    /// must exist before calling.
    pub fn run(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> BoxStream<'static, Result<Event>> {
        let runner = self.clone();
        let key = SessionKey::new(self.app.name.clone(), user_id, session_id);

        Box::pin(try_stream! {
            let session = runner
                .sessions
                .get_session(&key)
                .await?
                .ok_or_else(|| SlackAgentError::SessionNotFound(key.to_string()))?;

            let invocation_id = format!("e-{}", uuid::Uuid::new_v4());
            let agent = runner.app.root_agent.clone();
            let ctx = ToolContext {
                invocation_id: invocation_id.clone(),
                session: key.clone(),
                state: session.state.clone(),
                model: runner.model.clone(),
                max_llm_calls: runner.max_llm_calls,
            };
            tracing::debug!(
                session = %key,
                invocation_id = %invocation_id,
                history = session.events.len(),
                "Starting invocation"
            );

            let mut contents: Vec<Content> = session
                .events
                .iter()
                .filter_map(|e| e.content.clone())
                .filter(|c| !c.parts.is_empty())
                .collect();

            runner
                .sessions
                .append_event(&key, Event::new(&invocation_id, ROLE_USER, new_message.clone()))
                .await?;
            contents.push(new_message);

            let mut finished = false;
            for _ in 0..runner.max_llm_calls {
                let response = call_model(&agent, contents.clone(), &ctx).await?;
                if response.content.parts.is_empty() {
                    tracing::warn!(
                        finish_reason = ?response.finish_reason,
                        "Model returned an empty message, ending invocation"
                    );
                    finished = true;
                    break;
                }

                let event = Event::new(&invocation_id, &agent.name, response.content.clone())
                    .with_usage(response.usage);
                runner.sessions.append_event(&key, event.clone()).await?;

                let calls: Vec<FunctionCall> = response
                    .content
                    .function_calls()
                    .into_iter()
                    .cloned()
                    .collect();
                contents.push(response.content);
                yield event;

                if calls.is_empty() {
                    finished = true;
                    break;
                }

                let results = execute_calls(&agent, &calls, &ctx).await;
                let event = Event::new(&invocation_id, &agent.name, results.clone());
                runner.sessions.append_event(&key, event.clone()).await?;
                contents.push(results);
                yield event;
            }

            if !finished {
                Err(SlackAgentError::Model(format!(
                    "{} exceeded {} model calls",
                    agent.name, runner.max_llm_calls
                )))?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{EchoTool, ScriptedModel, call_response, text_response};
    use crate::agent::{Agent, AgentTool, ModelResponse, ROLE_MODEL};
    use crate::session::{InMemorySessionService, ensure_session};
    use futures::StreamExt;
    use serde_json::{Map, json};

    fn runner_with(
        model: Arc<ScriptedModel>,
        agent: Agent,
    ) -> (Runner, Arc<InMemorySessionService>) {
        let sessions = Arc::new(InMemorySessionService::new());
        let runner = Runner::new(App::new("slack_app", agent), sessions.clone(), model);
        (runner, sessions)
    }

    async fn collect(runner: &Runner, text: &str) -> Vec<Result<Event>> {
        runner
            .run("U1", "slack-C1", Content::user(text))
            .collect::<Vec<_>>()
            .await
    }

    async fn collect_ok(runner: &Runner, text: &str) -> Vec<Event> {
        collect(runner, text)
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect()
    }

    fn key() -> SessionKey {
        SessionKey::new("slack_app", "U1", "slack-C1")
    }

    async fn ensure(sessions: &InMemorySessionService) {
        ensure_session(sessions, &key(), Map::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_session_is_error() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (runner, _) = runner_with(model, Agent::builder("root").build());

        let events = collect(&runner, "hi").await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(SlackAgentError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("Hello!")]));
        let agent = Agent::builder("root").instruction("Be nice").build();
        let (runner, sessions) = runner_with(model.clone(), agent);
        ensure(&sessions).await;

        let events: Vec<Event> = collect_ok(&runner, "hi").await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].author, "root");
        assert_eq!(events[0].model_text().as_deref(), Some("Hello!"));

        let requests = model.requests();
        assert_eq!(requests[0].system_instruction.as_deref(), Some("Be nice"));
        assert_eq!(requests[0].contents, vec![Content::user("hi")]);

        let session = sessions.get_session(&key()).await.unwrap().unwrap();
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[0].author, "user");
    }

    #[tokio::test]
    async fn test_history_carries_over() {
        let model = Arc::new(ScriptedModel::new(vec![
            text_response("one"),
            text_response("two"),
        ]));
        let (runner, sessions) = runner_with(model.clone(), Agent::builder("root").build());
        ensure(&sessions).await;

        collect(&runner, "first").await;
        collect(&runner, "second").await;

        let second = &model.requests()[1];
        assert_eq!(
            second.contents,
            vec![
                Content::user("first"),
                Content::model("one"),
                Content::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let model = Arc::new(ScriptedModel::new(vec![
            call_response("echo", json!({"value": "ping"})),
            text_response("Echoed ping"),
        ]));
        let agent = Agent::builder("root").tool(Arc::new(EchoTool)).build();
        let (runner, sessions) = runner_with(model.clone(), agent);
        ensure(&sessions).await;

        let events: Vec<Event> = collect_ok(&runner, "echo ping").await;

        assert_eq!(events.len(), 3);
        assert!(events[0].model_text().is_none());
        let reply = events[1].content.as_ref().unwrap();
        assert_eq!(reply.role, "user");
        assert_eq!(
            reply.parts[0].function_response.as_ref().unwrap().response,
            json!({"echo": "ping"})
        );
        assert_eq!(events[2].model_text().as_deref(), Some("Echoed ping"));

        let requests = model.requests();
        assert_eq!(requests[0].functions[0].name, "echo");
        assert_eq!(requests[1].contents.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            call_response("missing", json!({})),
            text_response("sorry"),
        ]));
        let (runner, sessions) = runner_with(model, Agent::builder("root").build());
        ensure(&sessions).await;

        let events: Vec<Event> = collect_ok(&runner, "x").await;
        let response = &events[1].content.as_ref().unwrap().parts[0]
            .function_response
            .as_ref()
            .unwrap()
            .response;
        assert_eq!(response["error"], "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_call_budget_exhausted() {
        let model = Arc::new(ScriptedModel::new(vec![
            call_response("echo", json!({"value": "1"})),
            call_response("echo", json!({"value": "2"})),
        ]));
        let agent = Agent::builder("root").tool(Arc::new(EchoTool)).build();
        let (runner, sessions) = runner_with(model, agent);
        let runner = runner.with_max_llm_calls(2);
        ensure(&sessions).await;

        let events = collect(&runner, "loop").await;
        assert_eq!(events.len(), 5);
        assert!(matches!(events.last(), Some(Err(SlackAgentError::Model(_)))));
    }

    #[tokio::test]
    async fn test_agent_tool_delegation() {
        let model = Arc::new(ScriptedModel::new(vec![
            call_response("search_agent", json!({"request": "rust news"})),
            text_response("Rust 2024 is out"),
            text_response("Here is what I found: Rust 2024 is out"),
        ]));
        let sub = Agent::builder("search_agent")
            .description("Searches the web")
            .tool(crate::tools::google_search())
            .build();
        let root = Agent::builder("root")
            .tool(Arc::new(AgentTool::new(sub)))
            .build();
        let (runner, sessions) = runner_with(model.clone(), root);
        ensure(&sessions).await;

        let events: Vec<Event> = collect_ok(&runner, "news?").await;

        let tool_reply = &events[1].content.as_ref().unwrap().parts[0]
            .function_response
            .as_ref()
            .unwrap()
            .response;
        assert_eq!(tool_reply["result"], "Rust 2024 is out");

        let requests = model.requests();
        assert_eq!(requests[1].contents, vec![Content::user("rust news")]);
        assert!(requests[1].functions.is_empty());
        assert_eq!(requests[1].builtins.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_not_persisted() {
        let empty = ModelResponse {
            content: Content {
                role: ROLE_MODEL.to_string(),
                parts: vec![],
            },
            finish_reason: Some("MAX_TOKENS".to_string()),
            usage: None,
        };
        let model = Arc::new(ScriptedModel::new(vec![empty, text_response("two")]));
        let (runner, sessions) = runner_with(model.clone(), Agent::builder("root").build());
        ensure(&sessions).await;

        assert!(collect_ok(&runner, "first").await.is_empty());
        let session = sessions.get_session(&key()).await.unwrap().unwrap();
        assert_eq!(session.events.len(), 1);

        collect_ok(&runner, "second").await;
        assert_eq!(
            model.requests()[1].contents,
            vec![Content::user("first"), Content::user("second")]
        );
    }
}
