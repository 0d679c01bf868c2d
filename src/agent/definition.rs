use crate::agent::Tool;
use crate::agent::model::{BuiltinTool, FunctionDeclaration};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub enum ToolBinding {
    Function(Arc<dyn Tool>),
    Builtin(BuiltinTool),
}

impl ToolBinding {
    pub fn name(&self) -> &str {
        match self {
            ToolBinding::Function(tool) => tool.name(),
            ToolBinding::Builtin(builtin) => builtin.name(),
        }
    }
}

impl From<BuiltinTool> for ToolBinding {
    fn from(builtin: BuiltinTool) -> Self {
        ToolBinding::Builtin(builtin)
    }
}

impl<T: Tool + 'static> From<Arc<T>> for ToolBinding {
    fn from(tool: Arc<T>) -> Self {
        ToolBinding::Function(tool)
    }
}

/// An LLM-backed agent: model, prompt and the tools it may use
pub struct Agent {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    pub tools: Vec<ToolBinding>,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder {
            agent: Agent {
                name: name.into(),
                model: crate::agent::MODEL_NAME.to_string(),
                description: String::new(),
                instruction: String::new(),
                tools: Vec::new(),
            },
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn find_function(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find_map(|t| match t {
            ToolBinding::Function(tool) if tool.name() == name => Some(tool),
            _ => None,
        })
    }

    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools
            .iter()
            .filter_map(|t| match t {
                ToolBinding::Function(tool) => Some(FunctionDeclaration {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                }),
                ToolBinding::Builtin(_) => None,
            })
            .collect()
    }

    pub fn builtins(&self) -> Vec<BuiltinTool> {
        self.tools
            .iter()
            .filter_map(|t| match t {
                ToolBinding::Builtin(builtin) => Some(builtin.clone()),
                ToolBinding::Function(_) => None,
            })
            .collect()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tool_names())
            .finish()
    }
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = model.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.agent.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.agent.instruction = instruction.into();
        self
    }

    pub fn tool(mut self, tool: impl Into<ToolBinding>) -> Self {
        self.agent.tools.push(tool.into());
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

/// The unit the runner executes: a named application around a root agent
#[derive(Clone)]
pub struct App {
    pub name: String,
    pub root_agent: Arc<Agent>,
}

impl App {
    pub fn new(name: impl Into<String>, root_agent: Agent) -> Self {
        Self {
            name: name.into(),
            root_agent: Arc::new(root_agent),
        }
    }
}
