//! Agent hierarchy behind the Slack bot
//!
//! Two leaf agents each own one grounding tool (hosted search tools cannot be
//! mixed with function declarations in a single request), and the root
//! `slack_assistant` reaches them through `AgentTool` alongside the Slack
//! posting tool. `AgentProfile` picks which leaves the root gets.

use crate::agent::{Agent, AgentTool, App};
use crate::config::Settings;
use crate::error::{Result, SlackAgentError};
use crate::slack::SlackPoster;
use crate::tools::{SlackPostMessageTool, google_search, vertex_ai_search};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const MODEL_NAME: &str = "gemini-2.5-flash";

pub const ROOT_AGENT_NAME: &str = "slack_assistant";
pub const SEARCH_AGENT_NAME: &str = "search_agent";
pub const VERTEX_SEARCH_AGENT_NAME: &str = "vertex_ai_search_agent";

/// Which of the two assistant configurations to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentProfile {
    /// Internal knowledge via Vertex AI Search first, Google Search for external research
    Enterprise,
    /// Google Search only
    Web,
}

impl AgentProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentProfile::Enterprise => "enterprise",
            AgentProfile::Web => "web",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            AgentProfile::Enterprise => include_str!("../../prompts/slack-assistant.md"),
            AgentProfile::Web => include_str!("../../prompts/slack-assistant-web.md"),
        }
    }
}

impl fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentProfile {
    type Err = SlackAgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enterprise" | "vertex" => Ok(AgentProfile::Enterprise),
            "web" | "google" => Ok(AgentProfile::Web),
            other => Err(SlackAgentError::Config(format!(
                "Invalid AGENT_PROFILE `{}` (expected `enterprise` or `web`)",
                other
            ))),
        }
    }
}

pub fn search_agent(model: &str) -> Agent {
    Agent::builder(SEARCH_AGENT_NAME)
        .model(model)
        .description("An AI agent to search for content using Google Search.")
        .instruction("You are an expert at using Google Search to find relevant information")
        .tool(google_search())
        .build()
}

pub fn vertex_ai_search_agent(model: &str, data_store: &str) -> Agent {
    Agent::builder(VERTEX_SEARCH_AGENT_NAME)
        .model(model)
        .description("An agent that searches for content using Vertex AI Search.")
        .instruction(include_str!("../../prompts/vertex-search-agent.md"))
        .tool(vertex_ai_search(data_store))
        .build()
}

/// Root agent for the given profile
///
/// `Enterprise` needs a data store; `Web` ignores it.
pub fn slack_assistant(
    model: &str,
    profile: AgentProfile,
    data_store: Option<&str>,
    poster: Arc<dyn SlackPoster>,
) -> Result<Agent> {
    let builder = Agent::builder(ROOT_AGENT_NAME)
        .model(model)
        .description("Answers Slack questions, delegating research to search agents.")
        .instruction(profile.instruction())
        .tool(Arc::new(SlackPostMessageTool::new(poster)))
        .tool(Arc::new(AgentTool::new(search_agent(model))));

    let builder = match profile {
        AgentProfile::Enterprise => {
            let data_store = data_store.ok_or_else(|| {
                SlackAgentError::Config(
                    "AGENT_PROFILE=enterprise requires VERTEX_AI_SEARCH_DATA_STORE_ID".to_string(),
                )
            })?;
            builder.tool(Arc::new(AgentTool::new(vertex_ai_search_agent(model, data_store))))
        }
        AgentProfile::Web => builder,
    };

    Ok(builder.build())
}

pub fn build_app(settings: &Settings, poster: Arc<dyn SlackPoster>) -> Result<App> {
    let profile = settings.agent.profile;
    let root = slack_assistant(
        &settings.model.model,
        profile,
        settings.search.data_store.as_deref(),
        poster,
    )?;

    tracing::info!(
        app = %settings.agent.app_name,
        profile = %profile,
        model = %settings.model.model,
        data_store = ?settings.search.data_store,
        tools = ?root.tool_names(),
        "Assistant configured"
    );

    Ok(App::new(settings.agent.app_name.clone(), root))
}
