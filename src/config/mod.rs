mod settings;

pub use settings::{
    AgentConfig, ModelConfig, SearchConfig, Settings, SlackConfig, load_settings,
};
