use crate::agent::Model;
use crate::error::Result;
use crate::session::SessionKey;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Everything a tool can see about the invocation that called it
#[derive(Clone)]
pub struct ToolContext {
    pub invocation_id: String,
    pub session: SessionKey,
    /// Snapshot of the session state taken when the invocation started
    pub state: Map<String, Value>,
    pub model: Arc<dyn Model>,
    pub max_llm_calls: usize,
}

impl ToolContext {
    pub fn state_str(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(Value::as_str)
    }
}

/// A function the model may call by name
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the call arguments
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value>;
}
