mod client;
mod commands;
mod events;
mod markdown;
mod messages;
mod types;

pub use client::{SlackClient, SlackPoster};
pub use commands::{BotCommand, SlackCommandHandler};
pub use events::EventHandler;
pub use markdown::{markdown_to_slack, split_message};
pub use messages::{MessageProcessor, first_model_text};
pub use types::{ChannelId, MessageTs, SlackMessage, ThreadTs, UserId};
