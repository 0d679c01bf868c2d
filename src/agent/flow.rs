//! Single-step building blocks shared by the runner and agent tools

use crate::agent::model::{ModelRequest, ModelResponse};
use crate::agent::{Agent, Content, FunctionCall, Part, ROLE_USER, ToolContext};
use crate::error::Result;
use serde_json::{Value, json};

/// Ask the model for the agent's next message given the history so far
pub(crate) async fn call_model(
    agent: &Agent,
    contents: Vec<Content>,
    ctx: &ToolContext,
) -> Result<ModelResponse> {
    let request = ModelRequest {
        model: agent.model.clone(),
        system_instruction: (!agent.instruction.is_empty()).then(|| agent.instruction.clone()),
        contents,
        functions: agent.function_declarations(),
        builtins: agent.builtins(),
    };
    ctx.model.generate(request).await
}

/// Run every requested call and collect the responses into one user-role message.
/// Failures are reported to the model rather than aborting the invocation.
pub(crate) async fn execute_calls(
    agent: &Agent,
    calls: &[FunctionCall],
    ctx: &ToolContext,
) -> Content {
    let mut parts = Vec::with_capacity(calls.len());

    for call in calls {
        tracing::info!(agent = %agent.name, tool = %call.name, "Executing tool call");
        let response = match agent.find_function(&call.name) {
            Some(tool) => match tool.execute(call.args.clone(), ctx).await {
                Ok(value) => wrap_response(value),
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                    json!({ "error": e.to_string() })
                }
            },
            None => {
                tracing::warn!(agent = %agent.name, tool = %call.name, "Model called unknown tool");
                json!({ "error": format!("Unknown tool: {}", call.name) })
            }
        };
        parts.push(Part::function_response(call, response));
    }

    Content {
        role: ROLE_USER.to_string(),
        parts,
    }
}

/// Function responses must be JSON objects
fn wrap_response(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({ "result": value })
    }
}
