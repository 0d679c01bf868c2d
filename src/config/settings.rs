use crate::agent::AgentProfile;
use crate::error::{Result, SlackAgentError};
use crate::tools::resolve_data_store;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Settings {
    pub slack: SlackConfig,
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub signing_secret: String,
    /// Socket Mode is used when present, the Events API HTTP endpoint otherwise
    pub app_token: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub use_vertex_ai: bool,
    pub project: Option<String>,
    pub location: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Fully qualified data store resource name
    pub data_store: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub app_name: String,
    pub profile: AgentProfile,
    pub max_llm_calls: usize,
    pub run_timeout_secs: u64,
    pub session_busy_timeout_secs: u64,
}

pub fn load_settings() -> Result<Settings> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    Settings::from_lookup(|key| std::env::var(key).ok())
}

impl Settings {
    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| SlackAgentError::Config(format!("{} not set", key)))
        };

        let slack = SlackConfig {
            bot_token: require("SLACK_BOT_TOKEN")?,
            signing_secret: require("SLACK_SIGNING_SECRET")?,
            app_token: get("SLACK_APP_TOKEN"),
            port: parse_or(get("PORT"), "PORT", 3000)?,
        };

        let use_vertex_ai = parse_bool(get("GOOGLE_GENAI_USE_VERTEXAI"), true);
        let model = ModelConfig {
            use_vertex_ai,
            project: get("GOOGLE_CLOUD_PROJECT"),
            location: get("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|| "us-central1".to_string()),
            api_key: get("GOOGLE_API_KEY"),
            access_token: get("GOOGLE_CLOUD_ACCESS_TOKEN"),
            base_url: get("GEMINI_BASE_URL"),
            model: get("AGENT_MODEL").unwrap_or_else(|| crate::agent::MODEL_NAME.to_string()),
            timeout_secs: parse_or(get("MODEL_TIMEOUT_SECS"), "MODEL_TIMEOUT_SECS", 120)?,
        };

        if use_vertex_ai {
            if model.project.is_none() {
                return Err(SlackAgentError::Config(
                    "GOOGLE_CLOUD_PROJECT not set (required with GOOGLE_GENAI_USE_VERTEXAI)"
                        .to_string(),
                ));
            }
            if model.access_token.is_none() {
                return Err(SlackAgentError::Config(
                    "GOOGLE_CLOUD_ACCESS_TOKEN not set (required with GOOGLE_GENAI_USE_VERTEXAI)"
                        .to_string(),
                ));
            }
        } else if model.api_key.is_none() {
            return Err(SlackAgentError::Config(
                "GOOGLE_API_KEY not set (required when GOOGLE_GENAI_USE_VERTEXAI is false)"
                    .to_string(),
            ));
        }

        let search_location =
            get("VERTEX_AI_SEARCH_LOCATION").unwrap_or_else(|| model.location.clone());
        let data_store = match get("VERTEX_AI_SEARCH_DATA_STORE_ID") {
            Some(id) => Some(resolve_data_store(&id, model.project.as_deref(), &search_location)?),
            None => None,
        };
        let search = SearchConfig { data_store };

        let profile = match get("AGENT_PROFILE") {
            Some(raw) => AgentProfile::from_str(&raw)?,
            None if search.data_store.is_some() => AgentProfile::Enterprise,
            None => AgentProfile::Web,
        };

        let agent = AgentConfig {
            app_name: get("APP_NAME").unwrap_or_else(|| "slack_app".to_string()),
            profile,
            max_llm_calls: parse_or(get("MAX_LLM_CALLS"), "MAX_LLM_CALLS", 20)?,
            run_timeout_secs: parse_or(get("RUN_TIMEOUT_SECS"), "RUN_TIMEOUT_SECS", 300)?,
            session_busy_timeout_secs: parse_or(
                get("SESSION_BUSY_TIMEOUT_SECS"),
                "SESSION_BUSY_TIMEOUT_SECS",
                3,
            )?,
        };

        Ok(Settings {
            slack,
            model,
            search,
            agent,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| SlackAgentError::Config(format!("Invalid {}", key))),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}
