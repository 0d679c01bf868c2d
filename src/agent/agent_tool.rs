use crate::agent::flow::{call_model, execute_calls};
use crate::agent::{Agent, Content, Tool, ToolContext};
use crate::error::{Result, SlackAgentError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Exposes a sub-agent to its parent as a callable tool
///
/// Each call runs the sub-agent in a fresh conversation seeded with the
/// `request` argument; only the sub-agent's final text is returned.
pub struct AgentTool {
    agent: Arc<Agent>,
}

impl AgentTool {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn description(&self) -> &str {
        &self.agent.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The question or task to hand to this agent"
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let request = args
            .get("request")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SlackAgentError::Tool("missing `request` argument".to_string()))?;

        tracing::info!(agent = %self.agent.name, "Delegating to sub-agent");
        let mut contents = vec![Content::user(request)];

        for _ in 0..ctx.max_llm_calls {
            let response = call_model(&self.agent, contents.clone(), ctx).await?;
            let calls: Vec<_> = response.content.function_calls().into_iter().cloned().collect();
            contents.push(response.content);

            if calls.is_empty() {
                let text = contents.last().map(Content::text).unwrap_or_default();
                tracing::debug!(
                    agent = %self.agent.name,
                    result_len = text.len(),
                    "Sub-agent finished"
                );
                return Ok(json!({ "result": text }));
            }

            contents.push(execute_calls(&self.agent, &calls, ctx).await);
        }

        Err(SlackAgentError::Model(format!(
            "{} exceeded {} model calls",
            self.agent.name, ctx.max_llm_calls
        )))
    }
}
