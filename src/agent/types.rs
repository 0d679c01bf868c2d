use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

/// A function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The result of a function call, sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// One piece of a message. Exactly one payload field is set in practice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                id: None,
                name: name.into(),
                args,
            }),
            ..Default::default()
        }
    }

    pub fn function_response(call: &FunctionCall, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response,
            }),
            ..Default::default()
        }
    }

    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_MODEL.to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all non-thought parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| !p.is_thought())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .collect()
    }

    pub fn is_model(&self) -> bool {
        self.role == ROLE_MODEL
    }
}

/// Token accounting reported by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

/// One entry in a session's history, and one item of the runner's output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    pub content: Option<Content>,
    pub usage: Option<UsageMetadata>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        invocation_id: impl Into<String>,
        author: impl Into<String>,
        content: Content,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: Some(content),
            usage: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_usage(mut self, usage: Option<UsageMetadata>) -> Self {
        self.usage = usage;
        self
    }

    /// Text of a model-authored event, if it carries any
    pub fn model_text(&self) -> Option<String> {
        let content = self.content.as_ref().filter(|c| c.is_model())?;
        let text = content.text();
        if text.is_empty() { None } else { Some(text) }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.content
            .as_ref()
            .map(|c| c.function_calls())
            .unwrap_or_default()
    }
}
