//! Gemini `generateContent` client
//!
//! Talks to either Vertex AI (bearer token, project/location scoped URL) or the
//! Gemini developer API (API key). Grounding tools are passed through to the
//! service; function calls come back as `functionCall` parts for the runner.

use crate::agent::model::{BuiltinTool, FunctionDeclaration, Model, ModelRequest, ModelResponse};
use crate::agent::{Content, Part, ROLE_MODEL, UsageMetadata};
use crate::config::ModelConfig;
use crate::error::{Result, SlackAgentError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const DEVELOPER_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
enum Auth {
    ApiKey(String),
    Bearer(String),
}

#[derive(Debug, Clone)]
enum Endpoint {
    Vertex { project: String, location: String },
    Developer,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    endpoint: Endpoint,
    auth: Auth,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let (endpoint, auth, default_base) = if config.use_vertex_ai {
            let project = config.project.clone().ok_or_else(|| {
                SlackAgentError::Config("GOOGLE_CLOUD_PROJECT not set".to_string())
            })?;
            let token = config.access_token.clone().ok_or_else(|| {
                SlackAgentError::Config("GOOGLE_CLOUD_ACCESS_TOKEN not set".to_string())
            })?;
            let host = if config.location == "global" {
                "aiplatform.googleapis.com".to_string()
            } else {
                format!("{}-aiplatform.googleapis.com", config.location)
            };
            (
                Endpoint::Vertex {
                    project,
                    location: config.location.clone(),
                },
                Auth::Bearer(token),
                format!("https://{}/v1", host),
            )
        } else {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| SlackAgentError::Config("GOOGLE_API_KEY not set".to_string()))?;
            (Endpoint::Developer, Auth::ApiKey(key), DEVELOPER_API_BASE.to_string())
        };

        let base_url = config
            .base_url
            .clone()
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();

        tracing::debug!(
            base_url = %base_url,
            vertex = config.use_vertex_ai,
            "Gemini client configured"
        );

        Ok(Self {
            client,
            base_url,
            endpoint,
            auth,
        })
    }

    fn url(&self, model: &str) -> String {
        match &self.endpoint {
            Endpoint::Vertex { project, location } => format!(
                "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                self.base_url, project, location, model
            ),
            Endpoint::Developer => format!("{}/models/{}:generateContent", self.base_url, model),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn tools_payload(functions: &[FunctionDeclaration], builtins: &[BuiltinTool]) -> Vec<Value> {
    let mut tools = Vec::new();
    if !functions.is_empty() {
        tools.push(json!({ "functionDeclarations": functions }));
    }
    for builtin in builtins {
        tools.push(match builtin {
            BuiltinTool::GoogleSearch => json!({ "googleSearch": {} }),
            BuiltinTool::VertexAiSearch { data_store } => {
                json!({ "retrieval": { "vertexAiSearch": { "datastore": data_store } } })
            }
        });
    }
    tools
}

fn build_body(request: &ModelRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: &request.contents,
        system_instruction: request
            .system_instruction
            .as_ref()
            .map(|text| json!({ "parts": [{ "text": text }] })),
        tools: tools_payload(&request.functions, &request.builtins),
    }
}

#[async_trait]
impl Model for GeminiClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse> {
        let url = self.url(&request.model);
        tracing::debug!(
            model = %request.model,
            contents = request.contents.len(),
            functions = request.functions.len(),
            builtins = request.builtins.len(),
            "Sending generateContent request"
        );

        let builder = self.client.post(&url).json(&build_body(&request));
        let builder = match &self.auth {
            Auth::ApiKey(key) => builder.header("x-goog-api-key", key),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Gemini API error");
            return Err(SlackAgentError::Model(format!("{}: {}", status, body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            SlackAgentError::Model(format!("Failed to parse response: {} - {}", e, body))
        })?;

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            let reason = parsed
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(SlackAgentError::Model(format!("Response blocked: {}", reason)));
        };

        tracing::info!(
            finish_reason = ?candidate.finish_reason,
            total_tokens = parsed
                .usage_metadata
                .as_ref()
                .map(|u| u.total_token_count)
                .unwrap_or(0),
            "Gemini response received"
        );

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        if parts.is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
            return Err(SlackAgentError::Model(format!(
                "Model returned no content (finish reason: {})",
                reason
            )));
        }

        Ok(ModelResponse {
            content: Content {
                role: ROLE_MODEL.to_string(),
                parts,
            },
            finish_reason: candidate.finish_reason,
            usage: parsed.usage_metadata,
        })
    }
}
