pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod slack;
pub mod tools;

pub use error::{Result, SlackAgentError};
