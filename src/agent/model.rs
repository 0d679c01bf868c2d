use crate::agent::{Content, UsageMetadata};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Function signature advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tools executed on the model side rather than by the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinTool {
    GoogleSearch,
    VertexAiSearch { data_store: String },
}

impl BuiltinTool {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::GoogleSearch => "google_search",
            BuiltinTool::VertexAiSearch { .. } => "vertex_ai_search",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub functions: Vec<FunctionDeclaration>,
    pub builtins: Vec<BuiltinTool>,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: Content,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageMetadata>,
}

/// A backend that turns a conversation into the model's next message
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse>;
}
