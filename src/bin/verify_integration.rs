//! Builds the enterprise assistant against mocked configuration and prints
//! its tool wiring. No network calls are made.

use slack_agent::agent::{AgentProfile, build_app};
use slack_agent::config::Settings;
use slack_agent::slack::SlackClient;
use slack_agent::tools::vertex_ai_search;
use std::process::ExitCode;
use std::sync::Arc;

const MOCKED: &[(&str, &str)] = &[
    ("VERTEX_AI_SEARCH_DATA_STORE_ID", "test-data-store-id"),
    ("GOOGLE_CLOUD_PROJECT", "test-project"),
    ("GOOGLE_CLOUD_LOCATION", "global"),
    ("GOOGLE_GENAI_USE_VERTEXAI", "true"),
    ("AGENT_PROFILE", "enterprise"),
];

const DUMMY_IF_ABSENT: &[(&str, &str)] = &[
    ("SLACK_BOT_TOKEN", "xoxb-dummy"),
    ("SLACK_SIGNING_SECRET", "dummy-signing-secret"),
    ("GOOGLE_CLOUD_ACCESS_TOKEN", "dummy-access-token"),
];

fn lookup(key: &str) -> Option<String> {
    if let Some((_, value)) = MOCKED.iter().find(|(k, _)| *k == key) {
        return Some(value.to_string());
    }
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            DUMMY_IF_ABSENT
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
}

fn verify() -> anyhow::Result<(String, Vec<String>)> {
    let settings = Settings::from_lookup(lookup)?;
    anyhow::ensure!(
        settings.agent.profile == AgentProfile::Enterprise,
        "expected the enterprise profile"
    );

    let data_store = settings
        .search
        .data_store
        .clone()
        .ok_or_else(|| anyhow::anyhow!("data store was not resolved"))?;
    let search_tool = vertex_ai_search(data_store);

    let slack_client = Arc::new(SlackClient::new(settings.slack.clone())?);
    let app = build_app(&settings, slack_client)?;
    Ok((search_tool.name().to_string(), app.root_agent.tool_names()))
}

fn main() -> ExitCode {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    match verify() {
        Ok((tool_name, tool_names)) => {
            println!("Successfully built agent and tool.");
            println!("Tool name: {}", tool_name);
            println!("Agent tools: {:?}", tool_names);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
