//! Dispatch layer: commands and answers in, prompts and documents out.

pub mod command;
pub mod dispatcher;

pub use command::{Command, Inbound};
pub use dispatcher::Dispatcher;
