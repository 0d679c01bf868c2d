use crate::agent::BuiltinTool;
use crate::error::{Result, SlackAgentError};

/// Grounding with Google Search, executed by the model service
pub fn google_search() -> BuiltinTool {
    BuiltinTool::GoogleSearch
}

/// Grounding with a Vertex AI Search data store, executed by the model service
pub fn vertex_ai_search(data_store: impl Into<String>) -> BuiltinTool {
    BuiltinTool::VertexAiSearch {
        data_store: data_store.into(),
    }
}

/// Expand a bare data store id into its full resource name
///
/// Ids that are already resource names (`projects/...`) are returned as is.
/// Bare ids live in the `default_collection` of the given project and location.
pub fn resolve_data_store(id: &str, project: Option<&str>, location: &str) -> Result<String> {
    let id = id.trim();
    if id.starts_with("projects/") {
        return Ok(id.to_string());
    }

    let project = project.ok_or_else(|| {
        SlackAgentError::Config(
            "GOOGLE_CLOUD_PROJECT is required to resolve VERTEX_AI_SEARCH_DATA_STORE_ID"
                .to_string(),
        )
    })?;

    Ok(format!(
        "projects/{}/locations/{}/collections/default_collection/dataStores/{}",
        project, location, id
    ))
}
