mod search;
mod slack;

pub use search::{google_search, resolve_data_store, vertex_ai_search};
pub use slack::{POST_MESSAGE_TOOL, SlackPostMessageTool};
