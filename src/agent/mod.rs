mod agent_tool;
mod assistant;
mod definition;
mod flow;
mod gemini;
mod model;
mod runner;
mod tool;
mod types;

pub use agent_tool::AgentTool;
pub use assistant::{
    AgentProfile, MODEL_NAME, build_app, search_agent, slack_assistant, vertex_ai_search_agent,
};
pub use definition::{Agent, AgentBuilder, App, ToolBinding};
pub use gemini::GeminiClient;
pub use model::{BuiltinTool, FunctionDeclaration, Model, ModelRequest, ModelResponse};
pub use runner::Runner;
pub use tool::{Tool, ToolContext};
pub use types::{
    Content, Event, FunctionCall, FunctionResponse, Part, ROLE_MODEL, ROLE_USER, UsageMetadata,
};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Result, SlackAgentError};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    pub struct ScriptedModel {
        script: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<ModelRequest>>,
        failure: Option<String>,
    }

    impl ScriptedModel {
        pub fn new(script: Vec<ModelResponse>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
                failure: None,
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                failure: Some(message.to_string()),
                ..Self::new(vec![])
            }
        }

        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate(&self, request: ModelRequest) -> Result<ModelResponse> {
            self.requests.lock().unwrap().push(request);
            if let Some(message) = &self.failure {
                return Err(SlackAgentError::Model(message.clone()));
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SlackAgentError::Model("script exhausted".to_string()))
        }
    }

    pub fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            content: Content::model(text),
            finish_reason: Some("STOP".to_string()),
            usage: None,
        }
    }

    pub fn call_response(name: &str, args: Value) -> ModelResponse {
        ModelResponse {
            content: Content {
                role: ROLE_MODEL.to_string(),
                parts: vec![Part::function_call(name, args)],
            },
            finish_reason: Some("STOP".to_string()),
            usage: None,
        }
    }

    pub struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the value back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"value": {"type": "string"}}})
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
            Ok(json!({ "echo": args["value"] }))
        }
    }
}
